//! Compilation driver
//!
//! Orchestrates the pipeline and the downstream tools. The default path
//! transpiles to C and hands the translation unit to the system `cc`;
//! the alternate path lowers to bytecode and emits native code through
//! LLVM. Exit codes: 0 on success, 1 on any compile error, a failed
//! downstream tool's own status, or the executed program's status under
//! `--run`.

use crate::ast;
use crate::error::{CompileError, ToolError};
use crate::ir;
use crate::lexer;
use crate::parser;
use crate::resolve::{self, Symbols};
use crate::transpile;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Resolved command-line options (see the CLI in `main.rs`)
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub emit_c: bool,
    pub emit_llvm: bool,
    pub emit_object: bool,
    pub keep_c: bool,
    pub run: bool,
    pub native: bool,
    pub disassemble: bool,
    pub opt_level: u8,
}

/// Lex, parse and resolve a source string.
pub fn frontend(source: &str) -> Result<(ast::Program, Symbols), CompileError> {
    let tokens = lexer::lex(source)?;
    let mut program = parser::parse(source, tokens)?;
    let symbols = resolve::resolve(&mut program)?;
    Ok((program, symbols))
}

/// Run a full compilation; returns the process exit code.
pub fn run(opts: &Options) -> Result<i32, CompileError> {
    let source = fs::read_to_string(&opts.input)?;
    let (program, symbols) = frontend(&source)?;

    if opts.disassemble {
        let bytecode = ir::lower(&program, &symbols)?;
        print!("{}", bytecode.disassemble());
        return Ok(0);
    }

    if opts.emit_c {
        let unit = transpile::transpile(&program, &symbols)?;
        match &opts.output {
            Some(path) => fs::write(path, unit)?,
            None => println!("{}", unit),
        }
        return Ok(0);
    }

    if opts.emit_llvm || opts.emit_object || opts.native {
        return native_path(opts, &program, &symbols);
    }

    c_path(opts, &program, &symbols)
}

fn output_path(opts: &Options) -> PathBuf {
    opts.output
        .clone()
        .unwrap_or_else(|| opts.input.with_extension(""))
}

/// Default path: emit C, invoke the system C compiler, optionally run.
fn c_path(
    opts: &Options,
    program: &ast::Program,
    symbols: &Symbols,
) -> Result<i32, CompileError> {
    let unit = transpile::transpile(program, symbols)?;
    let c_file = opts.input.with_extension("c");
    let exe = output_path(opts);
    fs::write(&c_file, unit)?;

    let result = Command::new("cc")
        .arg(&c_file)
        .arg("-o")
        .arg(&exe)
        .arg("-lm")
        .output();

    // The intermediate is removed on every exit path unless asked for.
    if !opts.keep_c {
        let _ = fs::remove_file(&c_file);
    }

    let output = result?;
    if !output.status.success() {
        return Err(ToolError {
            tool: "cc".to_string(),
            status: output.status.code().unwrap_or(1),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
        .into());
    }

    if opts.run {
        return run_binary(&exe);
    }
    Ok(0)
}

/// Execute the produced binary with inherited stdio.
fn run_binary(path: &Path) -> Result<i32, CompileError> {
    let path = if path.is_relative() && path.components().count() == 1 {
        PathBuf::from(".").join(path)
    } else {
        path.to_path_buf()
    };
    let status = Command::new(&path).status()?;
    Ok(status.code().unwrap_or(1))
}

#[cfg(feature = "llvm")]
fn native_path(
    opts: &Options,
    program: &ast::Program,
    symbols: &Symbols,
) -> Result<i32, CompileError> {
    use inkwell::context::Context;

    let bytecode = ir::lower(program, symbols)?;
    let opt_level = ir::OptLevel::from_flag(opts.opt_level);

    let llvm_err = |message: String| {
        CompileError::Tool(ToolError {
            tool: "llvm".to_string(),
            status: 1,
            stderr: message,
        })
    };

    if opts.emit_llvm || opts.emit_object {
        let context = Context::create();
        let mut codegen = ir::LlvmCodegen::new(&context, "zinc_program");
        codegen.compile_program(&bytecode);
        codegen.verify().map_err(llvm_err)?;
        codegen.optimize(opt_level);

        if opts.emit_llvm {
            match &opts.output {
                Some(path) => codegen.write_llvm_ir(path).map_err(llvm_err)?,
                None => println!("{}", codegen.get_llvm_ir()),
            }
        } else {
            let obj = opts
                .output
                .clone()
                .unwrap_or_else(|| opts.input.with_extension("o"));
            codegen.write_object_file(&obj).map_err(llvm_err)?;
        }
        return Ok(0);
    }

    let exe = output_path(opts);
    ir::compile_to_executable(&bytecode, &exe, opt_level).map_err(llvm_err)?;

    if opts.run {
        return run_binary(&exe);
    }
    Ok(0)
}

#[cfg(not(feature = "llvm"))]
fn native_path(
    _opts: &Options,
    program: &ast::Program,
    symbols: &Symbols,
) -> Result<i32, CompileError> {
    // Still run the lowering so its diagnostics fire before the
    // configuration error.
    let _ = ir::lower(program, symbols)?;
    Err(CompileError::Tool(ToolError {
        tool: "zincc".to_string(),
        status: 1,
        stderr: "this build has no LLVM backend; rebuild with `--features llvm`".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_defaults_to_basename() {
        let opts = Options {
            input: PathBuf::from("examples/hello.zn"),
            ..Options::default()
        };
        assert_eq!(output_path(&opts), PathBuf::from("examples/hello"));
    }

    #[test]
    fn test_output_path_respects_flag() {
        let opts = Options {
            input: PathBuf::from("hello.zn"),
            output: Some(PathBuf::from("greeting")),
            ..Options::default()
        };
        assert_eq!(output_path(&opts), PathBuf::from("greeting"));
    }

    #[test]
    fn test_frontend_pipeline() {
        let source = "to do the main thing:\n    say \"hi\"\nend\n";
        let (program, symbols) = frontend(source).unwrap();
        assert_eq!(program.functions.len(), 1);
        assert!(symbols.functions.contains_key("main"));
    }
}
