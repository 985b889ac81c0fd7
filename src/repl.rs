use crate::bytecode_interpreter::Interpreter;
use crate::line_reader::{LineReadStatus, LineReader};

pub fn print_repl_commands() {
    println!(
        "\nREPL commands:\n\
         \t.exit\tExits from REPL mode.\n\
         \t.help\tPrints all REPL commands.\n\
         \t.ast-dump\tToggle AST dump.\n\
         \t.bytecode-dump\tToggle bytecode dump."
    );
}

pub fn run() {
    let mut line_reader = LineReader::new(".scriptlang-history.txt", "scriptlang >> ");

    // One interpreter for the whole session; globals persist between lines.
    let mut interpreter = Interpreter::default();
    let mut ast_dump = false;
    let mut bytecode_dump = false;

    loop {
        let readline = line_reader.readline();

        match readline {
            LineReadStatus::Line(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match line {
                    ".exit" => break,
                    ".help" => print_repl_commands(),
                    ".ast-dump" => {
                        ast_dump = !ast_dump;
                        println!(
                            "AST dump {}.",
                            if ast_dump { "activated" } else { "disabled" }
                        );
                    }
                    ".bytecode-dump" => {
                        bytecode_dump = !bytecode_dump;
                        println!(
                            "Bytecode dump {}.",
                            if bytecode_dump { "activated" } else { "disabled" }
                        );
                    }
                    _ => crate::run_code(&mut interpreter, line, ast_dump, bytecode_dump),
                }
            }
            LineReadStatus::Done => break,
        }
    }
}
