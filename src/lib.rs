//! The Zinc Compiler
//!
//! Zinc is a small imperative language with an English-like surface
//! syntax and C-like semantics. This crate turns Zinc source into a
//! native executable through one of two back ends.
//!
//! # Architecture
//!
//! ```text
//! Source Code (.zn)
//!       │
//!       ▼
//! ┌─────────────┐
//! │    Lexer    │  → Tokens (phrase folding)
//! └─────────────┘
//!       │
//!       ▼
//! ┌─────────────┐
//! │   Parser    │  → AST (two-pass: signatures, then bodies)
//! └─────────────┘
//!       │
//!       ▼
//! ┌─────────────┐
//! │  Resolver   │  → Annotated AST + symbol tables
//! └─────────────┘
//!       │
//!       ├──────────────────────┐
//!       ▼                      ▼
//! ┌─────────────┐       ┌─────────────┐
//! │ C Lowering  │       │  Bytecode   │
//! └─────────────┘       └─────────────┘
//!       │                      │
//!       ▼                      ▼
//!    system cc            LLVM Codegen
//! ```

pub mod ast;
pub mod driver;
pub mod error;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod resolve;
pub mod span;
pub mod token;
pub mod transpile;

// Re-exports for convenience
pub use error::CompileError;
pub use lexer::Lexer;
pub use span::{Position, Span};
pub use token::{Token, TokenKind};

/// Compiler version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// File extension for Zinc source files
pub const FILE_EXTENSION: &str = "zn";

/// Compile a source string straight to a C translation unit.
pub fn compile_to_c(source: &str) -> Result<String, CompileError> {
    let (program, symbols) = driver::frontend(source)?;
    Ok(transpile::transpile(&program, &symbols)?)
}

/// Compile a source string to bytecode.
pub fn compile_to_bytecode(source: &str) -> Result<ir::Program, CompileError> {
    let (program, symbols) = driver::frontend(source)?;
    Ok(ir::lower(&program, &symbols)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_to_c_end_to_end() {
        let c = compile_to_c("to do the main thing:\n    say \"Hello, World!\"\nend\n").unwrap();
        assert!(c.contains("int main(void)"));
        assert!(c.contains("Hello, World!"));
    }

    #[test]
    fn test_compile_to_bytecode_end_to_end() {
        let program =
            compile_to_bytecode("to do the main thing:\n    say 42\nend\n").unwrap();
        assert!(program.function("main").is_some());
    }

    #[test]
    fn test_compile_error_on_bad_syntax() {
        assert!(compile_to_c("define oops\n").is_err());
    }
}
