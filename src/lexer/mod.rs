use crate::error::{AsmError, AsmErrorKind, Outcome};
use crate::isa::Mnemonic;
use crate::lexer::cursor::Cursor;
use crate::span::Span;
use crate::symbol::DirKind;

pub mod cursor;

/// A positioned lexeme. Lexemes are upper-cased; the span points into the original source.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: Span,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TokenKind {
    Ident,
    /// Identifier immediately followed by `,`. The comma is not part of the lexeme.
    LabelDef,
    Mnemonic(Mnemonic),
    Dir(DirKind),
    /// Starts with a digit or sign. May contain hex letters, interpretation is left to the
    /// directive that consumes it.
    Number,
    Comment,
    Whitespace,
    Newline,
}

impl TokenKind {
    /// Tokens which carry no meaning for the assembler.
    pub fn is_trivia(&self) -> bool {
        matches!(self, TokenKind::Comment | TokenKind::Whitespace)
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Ident => f.write_str("identifier"),
            TokenKind::LabelDef => f.write_str("label definition"),
            TokenKind::Mnemonic(m) => write!(f, "mnemonic {m}"),
            TokenKind::Dir(dir) => write!(f, "directive {dir}"),
            TokenKind::Number => f.write_str("numeric literal"),
            TokenKind::Comment => f.write_str("comment"),
            TokenKind::Whitespace => f.write_str("whitespace"),
            TokenKind::Newline => f.write_str("end of line"),
        }
    }
}

/// Test if a character is considered to be whitespace (newlines are tokens of their own).
pub(crate) fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r')
}

/// Test if a character may continue an identifier or literal.
pub(crate) fn is_id(c: char) -> bool {
    c.is_ascii_alphanumeric()
}

/// Restartable token stream: clone it to lex the same source again.
///
/// Yields every token including trivia. Stops after the first error.
#[derive(Clone, Debug)]
pub struct Lexer<'a> {
    src: &'a str,
    cursor: Cursor<'a>,
    failed: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer {
            src,
            cursor: Cursor::new(src),
            failed: false,
        }
    }

    fn advance_token(&mut self) -> Option<Outcome<Token>> {
        let first_char = self.cursor.bump()?;
        let start = self.cursor.token_start();

        let kind = match first_char {
            '/' => {
                self.cursor.take_while(|c| c != '\n');
                TokenKind::Comment
            }
            '\n' => TokenKind::Newline,
            c if is_whitespace(c) => {
                self.cursor.take_while(is_whitespace);
                TokenKind::Whitespace
            }
            // Signed decimal, or any literal starting with a digit
            '+' | '-' => {
                self.cursor.take_while(is_id);
                TokenKind::Number
            }
            c if c.is_ascii_digit() => {
                self.cursor.take_while(is_id);
                TokenKind::Number
            }
            c if c.is_ascii_alphabetic() => {
                self.cursor.take_while(is_id);
                if self.cursor.first() == ',' {
                    let span = Span::new(start, start + self.cursor.pos_in_token());
                    self.cursor.bump();
                    self.cursor.reset_pos();
                    return Some(Ok(self.token(TokenKind::LabelDef, span)));
                }
                let span = Span::new(start, start + self.cursor.pos_in_token());
                self.classify(span)
            }
            c => {
                let span = Span::new(start, start + self.cursor.pos_in_token());
                self.cursor.reset_pos();
                self.failed = true;
                return Some(Err(AsmError::new(
                    AsmErrorKind::Lex {
                        reason: format!("unexpected character `{}`", c.escape_default()),
                    },
                    span,
                )));
            }
        };

        let span = Span::new(start, start + self.cursor.pos_in_token());
        self.cursor.reset_pos();
        Some(Ok(self.token(kind, span)))
    }

    fn classify(&self, span: Span) -> TokenKind {
        let word = self.src[span.as_range()].to_ascii_uppercase();
        if let Ok(mnemonic) = word.parse::<Mnemonic>() {
            TokenKind::Mnemonic(mnemonic)
        } else if let Ok(dir) = word.parse::<DirKind>() {
            TokenKind::Dir(dir)
        } else {
            TokenKind::Ident
        }
    }

    fn token(&self, kind: TokenKind, span: Span) -> Token {
        Token {
            kind,
            lexeme: self.src[span.as_range()].to_ascii_uppercase(),
            span,
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Outcome<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        self.advance_token()
    }
}

/// Lex a whole source eagerly, without trivia.
pub fn tokenize(src: &str) -> Outcome<Vec<Token>> {
    Lexer::new(src)
        .filter(|tok| !matches!(tok, Ok(tok) if tok.kind.is_trivia()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src)
            .unwrap()
            .into_iter()
            .map(|tok| tok.kind)
            .collect()
    }

    #[test]
    fn instruction_line() {
        assert_eq!(
            kinds("lop, add ptr i / loop body\n"),
            vec![
                TokenKind::LabelDef,
                TokenKind::Mnemonic(Mnemonic::Add),
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Newline,
            ]
        );
    }

    #[test]
    fn lexemes_are_normalised() {
        let toks = tokenize("ptr, hex 00ff").unwrap();
        assert_eq!(toks[0].lexeme, "PTR");
        assert_eq!(toks[1].kind, TokenKind::Dir(DirKind::Hex));
        assert_eq!(toks[2].lexeme, "00FF");
        assert_eq!(toks[2].kind, TokenKind::Number);
    }

    #[test]
    fn spans_are_half_open() {
        let toks = tokenize("  A,DEC -23").unwrap();
        assert_eq!(toks[0].span, Span::new(2, 3));
        assert_eq!(toks[1].span, Span::new(4, 7));
        assert_eq!(toks[2].span, Span::new(8, 11));
        assert_eq!(toks[2].lexeme, "-23");
    }

    #[test]
    fn comment_lines() {
        assert_eq!(
            kinds("/ just a comment\nHLT"),
            vec![TokenKind::Newline, TokenKind::Mnemonic(Mnemonic::Hlt)]
        );
    }

    #[test]
    fn unknown_character() {
        let err = tokenize("LDA A\nSTA $B").unwrap_err();
        assert!(matches!(err.kind, AsmErrorKind::Lex { .. }));
        assert_eq!(err.span, Span::new(10, 11));
    }

    #[test]
    fn stray_comma_is_rejected() {
        let err = tokenize("A , LDA B").unwrap_err();
        assert!(matches!(err.kind, AsmErrorKind::Lex { .. }));
        assert_eq!(err.span, Span::new(2, 3));
    }

    #[test]
    fn restartable() {
        let lexer = Lexer::new("ORG 10\nHLT\n");
        let first: Vec<_> = lexer.clone().collect();
        let second: Vec<_> = lexer.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn stops_after_error() {
        let mut lexer = Lexer::new("@ HLT");
        assert!(matches!(lexer.next(), Some(Err(_))));
        assert!(lexer.next().is_none());
    }
}
