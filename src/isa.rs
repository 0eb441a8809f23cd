use std::fmt;
use std::str::FromStr;

/// Addressable words.
pub const MEMORY_SIZE: usize = 4096;
/// Low 12 bits of a word: operand address, or one-hot selector for opcode 7.
pub const ADDRESS_MASK: u16 = 0x0FFF;
pub const INDIRECT_BIT: u16 = 0x8000;
/// Opcode field value that escapes into the register-reference/IO space.
pub const ESCAPE_OPCODE: u16 = 0b111;

const REGISTER_PREFIX: u16 = 0x7000;
const IO_PREFIX: u16 = 0xF000;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Class {
    /// Operates on or through an address operand, possibly indirect.
    Memory,
    /// Zero-operand, mutates only AC/E/PC/S.
    Register,
    /// Zero-operand, talks to the input/output flags and buffers.
    Io,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Mnemonic {
    And,
    Add,
    Lda,
    Sta,
    Bun,
    Bsa,
    Isz,
    Cla,
    Cle,
    Cma,
    Cme,
    Cir,
    Cil,
    Inc,
    Spa,
    Sna,
    Sza,
    Sze,
    Hlt,
    Inp,
    Out,
    Ski,
    Sko,
    Ion,
    Iof,
}

/// One row of the instruction table.
///
/// `code` is the 3-bit opcode for [`Class::Memory`] and the one-hot selector bit otherwise.
#[derive(Debug)]
pub struct Entry {
    pub name: &'static str,
    pub mnemonic: Mnemonic,
    pub class: Class,
    pub code: u16,
}

macro_rules! entry {
    ($name:literal, $mnemonic:ident, $class:ident, $code:expr) => {
        Entry {
            name: $name,
            mnemonic: Mnemonic::$mnemonic,
            class: Class::$class,
            code: $code,
        }
    };
}

/// Drives both assembly-time validation and encoding. Order matches [`Mnemonic`].
pub const MNEMONICS: [Entry; 25] = [
    entry!("AND", And, Memory, 0),
    entry!("ADD", Add, Memory, 1),
    entry!("LDA", Lda, Memory, 2),
    entry!("STA", Sta, Memory, 3),
    entry!("BUN", Bun, Memory, 4),
    entry!("BSA", Bsa, Memory, 5),
    entry!("ISZ", Isz, Memory, 6),
    entry!("CLA", Cla, Register, 0x800),
    entry!("CLE", Cle, Register, 0x400),
    entry!("CMA", Cma, Register, 0x200),
    entry!("CME", Cme, Register, 0x100),
    entry!("CIR", Cir, Register, 0x080),
    entry!("CIL", Cil, Register, 0x040),
    entry!("INC", Inc, Register, 0x020),
    entry!("SPA", Spa, Register, 0x010),
    entry!("SNA", Sna, Register, 0x008),
    entry!("SZA", Sza, Register, 0x004),
    entry!("SZE", Sze, Register, 0x002),
    entry!("HLT", Hlt, Register, 0x001),
    entry!("INP", Inp, Io, 0x800),
    entry!("OUT", Out, Io, 0x400),
    entry!("SKI", Ski, Io, 0x200),
    entry!("SKO", Sko, Io, 0x100),
    entry!("ION", Ion, Io, 0x080),
    entry!("IOF", Iof, Io, 0x040),
];

impl Mnemonic {
    pub fn entry(self) -> &'static Entry {
        &MNEMONICS[self as usize]
    }

    pub fn class(self) -> Class {
        self.entry().class
    }

    pub fn name(self) -> &'static str {
        self.entry().name
    }
}

impl FromStr for Mnemonic {
    type Err = ();

    /// Expects an upper-case lexeme.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MNEMONICS
            .iter()
            .find(|entry| entry.name == s)
            .map(|entry| entry.mnemonic)
            .ok_or(())
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EncodeError {
    /// Indirection requested on a register-reference or IO instruction.
    IllegalIndirection,
    /// Memory-reference operand does not fit in 12 bits.
    AddressOutOfRange(u16),
}

/// Produce the canonical word for an instruction.
///
/// `operand` is ignored for register-reference and IO instructions.
pub fn encode(mnemonic: Mnemonic, operand: u16, indirect: bool) -> Result<u16, EncodeError> {
    let entry = mnemonic.entry();
    match entry.class {
        Class::Memory => {
            if operand > ADDRESS_MASK {
                return Err(EncodeError::AddressOutOfRange(operand));
            }
            let i = if indirect { INDIRECT_BIT } else { 0 };
            Ok(i | entry.code << 12 | operand)
        }
        _ if indirect => Err(EncodeError::IllegalIndirection),
        Class::Register => Ok(REGISTER_PREFIX | entry.code),
        Class::Io => Ok(IO_PREFIX | entry.code),
    }
}

/// Position of a one-hot selector inside the register/IO tables (bit 11 is index 0).
///
/// `None` unless exactly one of the low 12 bits is set.
pub fn one_hot_index(bits: u16) -> Option<usize> {
    let bits = bits & ADDRESS_MASK;
    if bits.count_ones() != 1 {
        return None;
    }
    Some(11 - bits.trailing_zeros() as usize)
}

/// A decoded instruction word, used for disassembly and trace messages.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Instruction {
    Memory {
        mnemonic: Mnemonic,
        address: u16,
        indirect: bool,
    },
    Register(Mnemonic),
    Io(Mnemonic),
}

impl Instruction {
    /// `None` for opcode-7 words whose low bits are not a valid one-hot selector.
    pub fn decode(word: u16) -> Option<Self> {
        let indirect = word & INDIRECT_BIT != 0;
        let opcode = (word >> 12) & 0b111;
        let low = word & ADDRESS_MASK;
        if opcode != ESCAPE_OPCODE {
            return Some(Instruction::Memory {
                mnemonic: MNEMONICS[opcode as usize].mnemonic,
                address: low,
                indirect,
            });
        }
        let class = if indirect { Class::Io } else { Class::Register };
        let mnemonic = MNEMONICS
            .iter()
            .find(|entry| entry.class == class && entry.code == low)?
            .mnemonic;
        Some(match class {
            Class::Io => Instruction::Io(mnemonic),
            _ => Instruction::Register(mnemonic),
        })
    }

    pub fn mnemonic(&self) -> Mnemonic {
        match *self {
            Instruction::Memory { mnemonic, .. }
            | Instruction::Register(mnemonic)
            | Instruction::Io(mnemonic) => mnemonic,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Memory {
                mnemonic,
                address,
                indirect,
            } => {
                write!(f, "{} {:03X}", mnemonic, address)?;
                if *indirect {
                    f.write_str(" I")?;
                }
                Ok(())
            }
            Instruction::Register(mnemonic) | Instruction::Io(mnemonic) => {
                write!(f, "{}", mnemonic)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_enum_order() {
        for (i, entry) in MNEMONICS.iter().enumerate() {
            assert_eq!(entry.mnemonic as usize, i, "{} out of order", entry.name);
            assert_eq!(entry.name.parse::<Mnemonic>(), Ok(entry.mnemonic));
        }
    }

    #[test]
    fn encode_memory_reference() {
        assert_eq!(encode(Mnemonic::Add, 0x006, false), Ok(0x1006));
        assert_eq!(encode(Mnemonic::Add, 0x006, true), Ok(0x9006));
        assert_eq!(encode(Mnemonic::And, 0xFFF, false), Ok(0x0FFF));
        assert_eq!(encode(Mnemonic::Isz, 0x010, true), Ok(0xE010));
        assert_eq!(
            encode(Mnemonic::Lda, 0x1000, false),
            Err(EncodeError::AddressOutOfRange(0x1000))
        );
    }

    #[test]
    fn encode_register_and_io() {
        assert_eq!(encode(Mnemonic::Cla, 0, false), Ok(0x7800));
        assert_eq!(encode(Mnemonic::Hlt, 0, false), Ok(0x7001));
        assert_eq!(encode(Mnemonic::Inp, 0, false), Ok(0xF800));
        assert_eq!(encode(Mnemonic::Iof, 0, false), Ok(0xF040));
        assert_eq!(
            encode(Mnemonic::Cla, 0, true),
            Err(EncodeError::IllegalIndirection)
        );
        assert_eq!(
            encode(Mnemonic::Out, 0, true),
            Err(EncodeError::IllegalIndirection)
        );
    }

    #[test]
    fn opcode_seven_is_never_memory_reference() {
        assert!(MNEMONICS
            .iter()
            .filter(|entry| entry.class == Class::Memory)
            .all(|entry| entry.code < ESCAPE_OPCODE));
    }

    #[test]
    fn decode_every_entry() {
        for entry in &MNEMONICS {
            let word = encode(entry.mnemonic, 0x123, false).unwrap();
            let instr = Instruction::decode(word).unwrap();
            assert_eq!(instr.mnemonic(), entry.mnemonic);
        }
        assert_eq!(
            Instruction::decode(0x9006),
            Some(Instruction::Memory {
                mnemonic: Mnemonic::Add,
                address: 0x006,
                indirect: true
            })
        );
    }

    #[test]
    fn decode_rejects_bad_selectors() {
        assert_eq!(Instruction::decode(0x7000), None);
        assert_eq!(Instruction::decode(0x7C00), None);
        // Bit 5 selects nothing in IO space
        assert_eq!(Instruction::decode(0xF020), None);
    }

    #[test]
    fn one_hot() {
        assert_eq!(one_hot_index(0x800), Some(0));
        assert_eq!(one_hot_index(0x001), Some(11));
        assert_eq!(one_hot_index(0x7040), Some(5));
        assert_eq!(one_hot_index(0x000), None);
        assert_eq!(one_hot_index(0x003), None);
    }

    #[test]
    fn disassemble() {
        assert_eq!(Instruction::decode(0x9006).unwrap().to_string(), "ADD 006 I");
        assert_eq!(Instruction::decode(0x2150).unwrap().to_string(), "LDA 150");
        assert_eq!(Instruction::decode(0x7001).unwrap().to_string(), "HLT");
    }
}
