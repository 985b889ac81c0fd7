use crate::scanner::SourceRange;

/// Collects compile-time diagnostics. Parsing and compilation keep going
/// after an error; the driver checks `had_error` between pipeline stages.
pub struct ErrorReporter {
    source: String,
    errors: Vec<String>,
    had_error: bool,
}

impl ErrorReporter {
    pub fn new(source: &str) -> ErrorReporter {
        ErrorReporter {
            source: source.to_string(),
            errors: Vec::new(),
            had_error: false,
        }
    }

    pub fn error(&mut self, location: SourceRange, message: &str) {
        self.had_error = true;
        let diagnostic = self.format_diagnostic(location, message);
        self.errors.push(diagnostic);
    }

    pub fn had_error(&self) -> bool {
        self.had_error
    }

    /// Clears the flag between pipeline stages; collected messages remain.
    pub fn reset(&mut self) {
        self.had_error = false;
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    fn format_diagnostic(&self, location: SourceRange, message: &str) -> String {
        let SourceRange { start, end } = location;

        let mut out = format!(
            "[Ln: {}, Col: {}] Error: {}\n",
            end.line, end.column, message
        );

        let spacing = end.line.to_string().len() + 4;
        let snippet = self
            .source
            .get(start.offset as usize..end.offset as usize)
            .unwrap_or("");

        for (index, line_text) in snippet.split('\n').enumerate() {
            out.push_str(&format!(
                "{:>width$} | {}\n",
                start.line + index as u32,
                line_text,
                width = spacing
            ));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::SourcePosition;

    fn position(offset: u32, line: u32, column: u32) -> SourcePosition {
        SourcePosition {
            offset,
            line,
            column,
        }
    }

    #[test]
    fn formats_the_covered_source_line() {
        let source = "let x = ;";
        let mut reporter = ErrorReporter::new(source);
        reporter.error(
            SourceRange {
                start: position(0, 1, 1),
                end: position(9, 1, 10),
            },
            "Expect an expression.",
        );

        assert!(reporter.had_error());
        let diagnostic = &reporter.errors()[0];
        assert!(diagnostic.starts_with("[Ln: 1, Col: 10] Error: Expect an expression.\n"));
        assert!(diagnostic.contains("    1 | let x = ;"));
    }

    #[test]
    fn covers_multiple_lines() {
        let source = "while x {\n  print x;\n";
        let mut reporter = ErrorReporter::new(source);
        reporter.error(
            SourceRange {
                start: position(0, 1, 1),
                end: position(source.len() as u32, 2, 11),
            },
            "Expect '}' after block.",
        );

        let diagnostic = &reporter.errors()[0];
        assert!(diagnostic.contains("    1 | while x {"));
        assert!(diagnostic.contains("    2 |   print x;"));
    }

    #[test]
    fn reset_clears_only_the_flag() {
        let mut reporter = ErrorReporter::new("x");
        reporter.error(SourceRange::default(), "boom");
        assert!(reporter.had_error());

        reporter.reset();
        assert!(!reporter.had_error());
        assert_eq!(reporter.errors().len(), 1);
    }
}
