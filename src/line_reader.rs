use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

pub enum LineReadStatus {
    Line(String),
    Done,
}

/// Line editing with persistent history for the REPL.
pub struct LineReader {
    editor: DefaultEditor,
    history_file: String,
    prompt: String,
}

impl LineReader {
    pub fn new(history_file: &str, prompt: &str) -> LineReader {
        let mut editor = DefaultEditor::new().expect("failed to create line editor");
        let _ = editor.load_history(history_file);

        LineReader {
            editor,
            history_file: history_file.to_string(),
            prompt: prompt.to_string(),
        }
    }

    pub fn readline(&mut self) -> LineReadStatus {
        match self.editor.readline(&self.prompt) {
            Ok(line) => {
                let _ = self.editor.add_history_entry(line.as_str());
                let _ = self.editor.save_history(&self.history_file);
                LineReadStatus::Line(line)
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => LineReadStatus::Done,
            Err(_) => LineReadStatus::Done,
        }
    }
}
