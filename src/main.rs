//! Zinc compiler CLI
//!
//! `zincc` compiles a `.zn` source file to a native executable, either
//! by transpiling to C and invoking the system C compiler (the default)
//! or through the bytecode/LLVM back end (`--native` and the emit
//! flags).

use clap::Parser;
use std::path::PathBuf;
use zinc::driver::{self, Options};

#[derive(Parser)]
#[command(name = "zincc")]
#[command(version = zinc::VERSION)]
#[command(about = "The Zinc compiler", long_about = None)]
struct Cli {
    /// Zinc source file (.zn)
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Output name (default: the source basename)
    #[arg(short, long, value_name = "NAME")]
    output: Option<PathBuf>,

    /// Write the generated C translation unit instead of compiling
    #[arg(long)]
    emit_c: bool,

    /// Write LLVM IR text (native back end)
    #[arg(long)]
    emit_llvm: bool,

    /// Write an object file without linking (native back end)
    #[arg(long)]
    emit_object: bool,

    /// Keep the intermediate C file after linking
    #[arg(long)]
    keep_c: bool,

    /// Run the produced binary and exit with its status
    #[arg(short, long)]
    run: bool,

    /// Build the executable through the native back end instead of C
    #[arg(long)]
    native: bool,

    /// Dump the bytecode intermediate representation
    #[arg(short, long)]
    disassemble: bool,

    /// Optimization level for the native back end (0-3)
    #[arg(short = 'O', long = "optimize", value_name = "LEVEL", default_value_t = 2)]
    opt_level: u8,
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    if cli.input.extension().and_then(|ext| ext.to_str()) != Some(zinc::FILE_EXTENSION) {
        eprintln!(
            "warning: source file does not have the .{} extension",
            zinc::FILE_EXTENSION
        );
    }

    let opts = Options {
        input: cli.input,
        output: cli.output,
        emit_c: cli.emit_c,
        emit_llvm: cli.emit_llvm,
        emit_object: cli.emit_object,
        keep_c: cli.keep_c,
        run: cli.run,
        native: cli.native,
        disassemble: cli.disassemble,
        opt_level: cli.opt_level.min(3),
    };

    match driver::run(&opts) {
        Ok(0) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(err) => {
            let code = err.exit_code();
            if code == 1 {
                Err(miette::miette!("{}", err))
            } else {
                eprintln!("error: {}", err);
                std::process::exit(code);
            }
        }
    }
}
