use crate::isa::Instruction;
use crate::span::Span;

/// Assembled program: entry address plus one word per instruction or data line, in source order.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Air {
    /// Program counter value after loading
    entry: u16,
    words: Vec<AirWord>,
}

/// A single encoded word and the source line it came from.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AirWord {
    pub address: u16,
    pub word: u16,
    pub span: Span,
}

impl Air {
    pub fn new(entry: u16, words: Vec<AirWord>) -> Self {
        Air { entry, words }
    }

    pub fn entry(&self) -> u16 {
        self.entry
    }

    /// `(address, word)` pairs, as consumed by the loader.
    pub fn words(&self) -> Vec<(u16, u16)> {
        self.words.iter().map(|w| (w.address, w.word)).collect()
    }

    /// Source line that produced the word at `address`, if any.
    pub fn span_of(&self, address: u16) -> Option<Span> {
        self.words
            .iter()
            .rev()
            .find(|w| w.address == address)
            .map(|w| w.span)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AirWord> {
        self.words.iter()
    }
}

impl AirWord {
    /// Best-effort disassembly. Data words may decode as instructions too.
    pub fn disassemble(&self) -> Option<Instruction> {
        Instruction::decode(self.word)
    }
}

impl<'a> IntoIterator for &'a Air {
    type Item = &'a AirWord;
    type IntoIter = std::slice::Iter<'a, AirWord>;

    fn into_iter(self) -> Self::IntoIter {
        self.words.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_word_wins_span_lookup() {
        // Same address written twice (via `ORG`), the loader keeps the last one
        let air = Air::new(
            0,
            vec![
                AirWord {
                    address: 3,
                    word: 1,
                    span: Span::new(0, 5),
                },
                AirWord {
                    address: 3,
                    word: 2,
                    span: Span::new(6, 11),
                },
            ],
        );
        assert_eq!(air.span_of(3), Some(Span::new(6, 11)));
        assert_eq!(air.span_of(4), None);
        assert_eq!(air.words(), vec![(3, 1), (3, 2)]);
    }

    #[test]
    fn data_words_may_disassemble() {
        let word = |word| AirWord {
            address: 0,
            word,
            span: Span::new(0, 0),
        };
        assert_eq!(word(0x7001).disassemble().unwrap().to_string(), "HLT");
        assert_eq!(word(0x0001).disassemble().unwrap().to_string(), "AND 001");
        assert_eq!(word(0x7003).disassemble(), None);
    }
}
