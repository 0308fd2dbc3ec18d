//! Bytecode IR and native code generation
//!
//! The alternate back end: the resolved AST lowers to a flat, typed
//! bytecode (`bytecode`, `lower`), from which native code is emitted
//! through LLVM (`llvm`, behind the `llvm` cargo feature). The bytecode
//! disassembler backs `--disassemble` and works without LLVM.

mod bytecode;
mod lower;
#[cfg(feature = "llvm")]
mod llvm;

pub use bytecode::*;
pub use lower::*;
#[cfg(feature = "llvm")]
pub use llvm::*;
