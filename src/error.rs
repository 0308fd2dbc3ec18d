//! Error taxonomy for the Zinc compiler
//!
//! Every stage has its own error type; this module ties them together
//! under `CompileError`. All errors are fatal: the driver prints one
//! diagnostic with the source position and exits non-zero.

use crate::lexer::LexError;
use crate::parser::ParseError;
use crate::resolve::ResolveError;
use crate::span::Position;
use thiserror::Error;

/// Top-level compiler error
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("{0}")]
    Lex(#[from] LexError),

    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("{0}")]
    Resolve(#[from] ResolveError),

    #[error("{0}")]
    Lower(#[from] LowerError),

    #[error("{0}")]
    Tool(#[from] ToolError),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl CompileError {
    /// Process exit code: compile errors are 1, a failed downstream tool
    /// propagates its own status.
    pub fn exit_code(&self) -> i32 {
        match self {
            CompileError::Tool(err) => err.status,
            _ => 1,
        }
    }
}

/// Lowering errors: a feature used in a context where the selected
/// backend cannot express it.
#[derive(Error, Debug, Clone)]
pub enum LowerError {
    #[error("'stop the loop' outside of a loop at {pos}")]
    BreakOutsideLoop { pos: Position },

    #[error("'skip to the next one' outside of a loop at {pos}")]
    ContinueOutsideLoop { pos: Position },

    #[error("raw C fragment at {pos} is only supported by the C backend")]
    RawCUnsupported { pos: Position },

    #[error("unknown structure '{name}' at {pos}")]
    UnknownStruct { name: String, pos: Position },

    #[error("unknown field '{field}' at {pos}")]
    UnknownField { field: String, pos: Position },
}

impl LowerError {
    pub fn position(&self) -> Position {
        match self {
            LowerError::BreakOutsideLoop { pos }
            | LowerError::ContinueOutsideLoop { pos }
            | LowerError::RawCUnsupported { pos }
            | LowerError::UnknownStruct { pos, .. }
            | LowerError::UnknownField { pos, .. } => *pos,
        }
    }
}

/// A downstream tool (C compiler, linker, or the produced binary)
/// failed; its stderr is surfaced unchanged.
#[derive(Error, Debug)]
#[error("{tool} failed with status {status}\n{stderr}")]
pub struct ToolError {
    pub tool: String,
    pub status: i32,
    pub stderr: String,
}
