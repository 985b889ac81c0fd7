mod ast;
mod bytecode;
mod bytecode_interpreter;
mod compiler;
mod disassembler;
mod error_reporter;
mod line_reader;
mod parser;
mod repl;
mod scanner;
mod value;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser as CliParser;

use crate::bytecode_interpreter::Interpreter;
use crate::compiler::{Compiler, FunctionType};
use crate::error_reporter::ErrorReporter;
use crate::parser::Parser;

/// A bytecode interpreter for the scriptlang language.
#[derive(CliParser)]
#[command(name = "scriptlang", version)]
#[command(after_help = "Without a source file, scriptlang starts an \
                        interactive REPL.\n\nREPL commands:\n  .exit\tExits \
                        from REPL mode.\n  .help\tPrints all REPL commands.\n  \
                        .ast-dump\tToggle AST dump.\n  .bytecode-dump\tToggle \
                        bytecode dump.")]
struct Opts {
    /// Print the generated AST and bytecode instead of executing
    #[arg(long)]
    dump: bool,

    /// Source file to run
    file: Option<PathBuf>,
}

fn main() -> ExitCode {
    let opts = Opts::parse();

    match opts.file {
        Some(file) => match run_file(&file, opts.dump) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("{:#}", err);
                ExitCode::FAILURE
            }
        },
        None => {
            repl::run();
            ExitCode::from(1)
        }
    }
}

fn run_file(path: &Path, dump: bool) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;

    let mut interpreter = Interpreter::default();
    run_code(&mut interpreter, &source, dump, dump);
    Ok(())
}

/// Runs one source text through the pipeline: parse, dump/compile, execute.
/// Each stage is skipped when the previous one reported errors, and any dump
/// flag replaces execution.
pub fn run_code(interpreter: &mut Interpreter, source: &str, dump_ast: bool, dump_bytecode: bool) {
    let mut reporter = ErrorReporter::new(source);

    let program = Parser::new(source, &mut reporter).parse_source();
    if reporter.had_error() {
        for error in reporter.errors() {
            println!("{}", error);
        }
        return;
    }

    if dump_ast {
        print!("{}", ast::pretty_print(&program));
    }

    reporter.reset();

    let function =
        Compiler::new(FunctionType::Script, &mut reporter, dump_bytecode).compile(&program);
    if reporter.had_error() {
        for error in reporter.errors() {
            println!("{}", error);
        }
        return;
    }

    if !dump_ast && !dump_bytecode {
        if let Err(err) = interpreter.interpret(function) {
            println!("{}", err);
        }
    }
}
