use std::fmt;
use std::str::FromStr;

use fxhash::FxBuildHasher;
use indexmap::IndexMap;

use crate::isa::ADDRESS_MASK;
use crate::span::Span;

type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Assembler directives.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DirKind {
    /// Move the location counter
    Org,
    /// Stop assembling
    End,
    /// Signed decimal data word
    Dec,
    /// Hexadecimal data word
    Hex,
}

impl FromStr for DirKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ORG" => Ok(DirKind::Org),
            "END" => Ok(DirKind::End),
            "DEC" => Ok(DirKind::Dec),
            "HEX" => Ok(DirKind::Hex),
            _ => Err(()),
        }
    }
}

impl fmt::Display for DirKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DirKind::Org => "ORG",
            DirKind::End => "END",
            DirKind::Dec => "DEC",
            DirKind::Hex => "HEX",
        })
    }
}

/// Where a label was bound, and to which address.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Symbol {
    pub address: u16,
    pub span: Span,
}

/// Case-insensitive label -> 12-bit address map, in definition order.
///
/// Filled by the first pass, only read afterwards.
#[derive(Debug, Default)]
pub struct SymbolTable {
    table: FxMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            table: IndexMap::with_hasher(FxBuildHasher::default()),
        }
    }

    /// Bind `label` to `address`. On a duplicate, returns the earlier binding untouched.
    pub fn insert(&mut self, label: &str, address: u16, span: Span) -> Result<(), Symbol> {
        let key = label.to_ascii_uppercase();
        if let Some(existing) = self.table.get(&key) {
            return Err(*existing);
        }
        self.table.insert(
            key,
            Symbol {
                address: address & ADDRESS_MASK,
                span,
            },
        );
        Ok(())
    }

    pub fn get(&self, label: &str) -> Option<Symbol> {
        self.table.get(&label.to_ascii_uppercase()).copied()
    }

    pub fn address(&self, label: &str) -> Option<u16> {
        self.get(label).map(|sym| sym.address)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Symbol)> {
        self.table.iter().map(|(name, sym)| (name.as_str(), sym))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive() {
        let mut sym = SymbolTable::new();
        sym.insert("Lop", 0x10, Span::new(0, 3)).unwrap();
        assert_eq!(sym.address("LOP"), Some(0x10));
        assert_eq!(sym.address("lop"), Some(0x10));
        assert_eq!(sym.address("TOP"), None);
    }

    #[test]
    fn duplicate_keeps_first() {
        let mut sym = SymbolTable::new();
        sym.insert("A", 5, Span::new(0, 1)).unwrap();
        let first = sym.insert("a", 9, Span::new(10, 11)).unwrap_err();
        assert_eq!(first.span, Span::new(0, 1));
        assert_eq!(sym.address("A"), Some(5));
        assert_eq!(sym.len(), 1);
    }

    #[test]
    fn keeps_definition_order() {
        let mut sym = SymbolTable::new();
        for (i, name) in ["C", "A", "B"].iter().enumerate() {
            sym.insert(name, i as u16, Span::default()).unwrap();
        }
        let names: Vec<_> = sym.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["C", "A", "B"]);
    }

    #[test]
    fn directives() {
        assert_eq!("ORG".parse(), Ok(DirKind::Org));
        assert_eq!("HEX".parse(), Ok(DirKind::Hex));
        assert_eq!("ORIG".parse::<DirKind>(), Err(()));
    }
}
