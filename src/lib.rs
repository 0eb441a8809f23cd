// Assembling
mod lexer;
pub use lexer::{tokenize, Lexer, Token, TokenKind};
mod parser;
pub use parser::{assemble, AsmParser, FirstPass, DEFAULT_ORIGIN};
mod air;
pub use air::{Air, AirWord};
mod symbol;
pub use symbol::{DirKind, Symbol, SymbolTable};
pub mod isa;

mod error;
pub use error::{AsmError, AsmErrorKind, Outcome};
mod span;
pub use span::Span;

// Running
mod runtime;
pub use runtime::{Flags, Machine, MachineError, Memory, Registers, Snapshot, Status, Stop};
mod breakpoint;
pub use breakpoint::Breakpoints;
mod log;
pub use log::{Log, LogEntry};

// Host
#[macro_use]
pub mod output;
pub mod env;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 8;
