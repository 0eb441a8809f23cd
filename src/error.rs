use std::fmt;

use miette::{miette, LabeledSpan, Report, Severity};

use crate::span::Span;

/// Every assembler stage returns one of these. Chain stages with [`Result::and_then`].
pub type Outcome<T> = Result<T, AsmError>;

/// First failure of an assembler pass, with the offending source span.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AsmError {
    pub kind: AsmErrorKind,
    pub span: Span,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum AsmErrorKind {
    /// Illegal character in the source.
    Lex { reason: String },
    /// `span` is the second definition, `first` the original one.
    DuplicateLabel { label: String, first: Span },
    UndefinedLabel { label: String },
    UnknownMnemonic { mnemonic: String },
    OperandArity {
        mnemonic: String,
        expected: usize,
        found: usize,
    },
    IllegalIndirection { mnemonic: String },
    MalformedLiteral { reason: String },
    /// Token valid on its own but misplaced in the line.
    UnexpectedToken { expected: &'static str, found: String },
}

impl AsmError {
    pub fn new(kind: AsmErrorKind, span: Span) -> Self {
        AsmError { kind, span }
    }

    pub fn code(&self) -> &'static str {
        match self.kind {
            AsmErrorKind::Lex { .. } => "lex::unknown",
            AsmErrorKind::DuplicateLabel { .. } => "parse::duplicate_label",
            AsmErrorKind::UndefinedLabel { .. } => "parse::undefined_label",
            AsmErrorKind::UnknownMnemonic { .. } => "parse::unknown_mnemonic",
            AsmErrorKind::OperandArity { .. } => "parse::arity",
            AsmErrorKind::IllegalIndirection { .. } => "parse::indirection",
            AsmErrorKind::MalformedLiteral { .. } => "parse::bad_lit",
            AsmErrorKind::UnexpectedToken { .. } => "parse::unexpected_token",
        }
    }

    fn help(&self) -> &'static str {
        match self.kind {
            AsmErrorKind::Lex { .. } => {
                "only labels, mnemonics, directives, literals and `/` comments are allowed"
            }
            AsmErrorKind::DuplicateLabel { .. } => "labels may only be defined once per program",
            AsmErrorKind::UndefinedLabel { .. } => {
                "define the label with `NAME,` at the start of a line"
            }
            AsmErrorKind::UnknownMnemonic { .. } => {
                "check the instruction table of the basic computer"
            }
            AsmErrorKind::OperandArity { .. } => {
                "memory-reference instructions take one operand, all others take none"
            }
            AsmErrorKind::IllegalIndirection { .. } => {
                "only memory-reference instructions support the `I` marker"
            }
            AsmErrorKind::MalformedLiteral { .. } => {
                "`DEC` takes -32768 to 65535, `HEX` and `ORG` take hexadecimal digits"
            }
            AsmErrorKind::UnexpectedToken { .. } => {
                "lines look like `[LABEL,] MNEMONIC [OPERAND [I]]`"
            }
        }
    }

    fn label(&self) -> &'static str {
        match self.kind {
            AsmErrorKind::Lex { .. } => "unknown token",
            AsmErrorKind::DuplicateLabel { .. } => "duplicate label",
            AsmErrorKind::UndefinedLabel { .. } => "undefined label",
            AsmErrorKind::UnknownMnemonic { .. } => "unknown mnemonic",
            AsmErrorKind::OperandArity { .. } => "incorrect operands",
            AsmErrorKind::IllegalIndirection { .. } => "illegal indirection",
            AsmErrorKind::MalformedLiteral { .. } => "incorrect literal",
            AsmErrorKind::UnexpectedToken { .. } => "unexpected token",
        }
    }

    /// Render as a diagnostic over `src`, the text the spans point into.
    pub fn report(&self, src: &str) -> Report {
        let mut labels = vec![LabeledSpan::at(self.span, self.label())];
        if let AsmErrorKind::DuplicateLabel { first, .. } = &self.kind {
            labels.push(LabeledSpan::at(*first, "first defined here"));
        }
        miette!(
            severity = Severity::Error,
            code = self.code(),
            help = self.help(),
            labels = labels,
            "{}",
            self
        )
        .with_source_code(src.to_owned())
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            AsmErrorKind::Lex { reason } => write!(f, "Encountered an {reason}"),
            AsmErrorKind::DuplicateLabel { label, .. } => {
                write!(f, "Duplicate label `{label}`")
            }
            AsmErrorKind::UndefinedLabel { label } => write!(f, "Undefined label `{label}`"),
            AsmErrorKind::UnknownMnemonic { mnemonic } => {
                write!(f, "Unknown mnemonic `{mnemonic}`")
            }
            AsmErrorKind::OperandArity {
                mnemonic,
                expected,
                found,
            } => write!(
                f,
                "`{mnemonic}` expects {expected} operand{}, found {found}",
                if *expected == 1 { "" } else { "s" }
            ),
            AsmErrorKind::IllegalIndirection { mnemonic } => {
                write!(f, "`{mnemonic}` cannot use indirect addressing")
            }
            AsmErrorKind::MalformedLiteral { reason } => {
                write!(f, "Encountered an invalid literal: {reason}")
            }
            AsmErrorKind::UnexpectedToken { expected, found } => {
                write!(f, "Expected {expected}, found {found}")
            }
        }
    }
}

impl std::error::Error for AsmError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_report_names_both_spans() {
        let err = AsmError::new(
            AsmErrorKind::DuplicateLabel {
                label: "A".into(),
                first: Span::new(0, 1),
            },
            Span::new(8, 9),
        );
        let report = err.report("A, HLT\nA, HLT\n");
        let labels: Vec<_> = report.labels().unwrap().collect();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].offset(), 8);
        assert_eq!(labels[1].offset(), 0);
        assert_eq!(report.to_string(), "Duplicate label `A`");
    }

    #[test]
    fn arity_message() {
        let err = AsmError::new(
            AsmErrorKind::OperandArity {
                mnemonic: "ADD".into(),
                expected: 1,
                found: 0,
            },
            Span::new(0, 3),
        );
        assert_eq!(err.to_string(), "`ADD` expects 1 operand, found 0");
        assert_eq!(err.code(), "parse::arity");
    }
}
