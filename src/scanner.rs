use std::fmt;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct SourcePosition {
    pub offset: u32,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct SourceRange {
    pub start: SourcePosition,
    pub end: SourcePosition,
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(Offset: {})[Ln: {}, Col: {}]",
            self.offset, self.line, self.column
        )
    }
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} - {}>", self.start, self.end)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TokenType {
    Unknown,

    // Keywords
    LetKeyword,
    DefunKeyword,
    IfKeyword,
    ElseKeyword,
    WhileKeyword,
    ContinueKeyword,
    BreakKeyword,
    ReturnKeyword,
    PrintKeyword,
    OrKeyword,
    AndKeyword,
    NotKeyword,
    TrueKeyword,
    FalseKeyword,
    NilKeyword,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Exponent,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
    Equal,
    NotEqual,
    Assign,

    // Symbols
    Dot,
    Comma,
    Semicolon,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,

    // Literals
    Identifier,
    StringLiteral,
    NumberLiteral,

    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub ty: TokenType,
    pub lexeme: String,
    pub position: SourceRange,
}

impl Default for Token {
    fn default() -> Token {
        Token {
            ty: TokenType::Unknown,
            lexeme: String::new(),
            position: SourceRange::default(),
        }
    }
}

fn keyword_type(lexeme: &str) -> Option<TokenType> {
    match lexeme {
        "let" => Some(TokenType::LetKeyword),
        "defun" => Some(TokenType::DefunKeyword),
        "if" => Some(TokenType::IfKeyword),
        "else" => Some(TokenType::ElseKeyword),
        "while" => Some(TokenType::WhileKeyword),
        "continue" => Some(TokenType::ContinueKeyword),
        "break" => Some(TokenType::BreakKeyword),
        "return" => Some(TokenType::ReturnKeyword),
        "print" => Some(TokenType::PrintKeyword),
        "or" => Some(TokenType::OrKeyword),
        "and" => Some(TokenType::AndKeyword),
        "not" => Some(TokenType::NotKeyword),
        "true" => Some(TokenType::TrueKeyword),
        "false" => Some(TokenType::FalseKeyword),
        "nil" => Some(TokenType::NilKeyword),
        _ => None,
    }
}

/// Pull-based lexer. The parser asks for one token at a time with `next`
/// until `has_next` turns false after the single `Eof` token.
pub struct Scanner<'a> {
    source: &'a str,
    start: usize,
    curr: usize,
    line: u32,
    column: u32,
    has_next: bool,
    token_start: SourcePosition,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Scanner<'a> {
        Scanner {
            source,
            start: 0,
            curr: 0,
            line: 1,
            column: 1,
            has_next: true,
            token_start: SourcePosition::default(),
        }
    }

    pub fn next(&mut self) -> Token {
        self.skip_whitespace();

        self.start = self.curr;
        self.token_start = self.current_position();

        let c = self.advance();
        match c {
            '\0' => {
                self.has_next = false;
                self.make_token(TokenType::Eof)
            }
            '+' => self.make_token(TokenType::Plus),
            '-' => self.make_token(TokenType::Minus),
            '*' => {
                if self.matches('*') {
                    self.make_token(TokenType::Exponent)
                } else {
                    self.make_token(TokenType::Star)
                }
            }
            '/' => self.make_token(TokenType::Slash),
            '>' => {
                if self.matches('=') {
                    self.make_token(TokenType::GreaterEqual)
                } else {
                    self.make_token(TokenType::Greater)
                }
            }
            '<' => {
                if self.matches('=') {
                    self.make_token(TokenType::LessEqual)
                } else {
                    self.make_token(TokenType::Less)
                }
            }
            '=' => {
                if self.matches('=') {
                    self.make_token(TokenType::Equal)
                } else {
                    self.make_token(TokenType::Assign)
                }
            }
            '!' => {
                if self.matches('=') {
                    self.make_token(TokenType::NotEqual)
                } else {
                    self.make_token(TokenType::Unknown)
                }
            }
            '.' => self.make_token(TokenType::Dot),
            ',' => self.make_token(TokenType::Comma),
            ';' => self.make_token(TokenType::Semicolon),
            '(' => self.make_token(TokenType::LeftParen),
            ')' => self.make_token(TokenType::RightParen),
            '{' => self.make_token(TokenType::LeftBrace),
            '}' => self.make_token(TokenType::RightBrace),
            '"' => self.string_literal(),
            c if c.is_ascii_digit() => self.number_literal(),
            c if c.is_ascii_alphabetic() || c == '_' => self.identifier(),
            _ => self.make_token(TokenType::Unknown),
        }
    }

    pub fn has_next(&self) -> bool {
        self.has_next
    }

    fn string_literal(&mut self) -> Token {
        while !self.is_at_end() && self.peek(0) != '"' {
            self.advance();
        }

        if self.is_at_end() {
            // Unterminated; the parser turns this token into a diagnostic.
            return self.make_token(TokenType::Unknown);
        }

        self.advance();
        self.make_token(TokenType::StringLiteral)
    }

    fn number_literal(&mut self) -> Token {
        while self.peek(0).is_ascii_digit() {
            self.advance();
        }

        if self.peek(0) == '.' && self.peek(1).is_ascii_digit() {
            self.advance();
            while self.peek(0).is_ascii_digit() {
                self.advance();
            }
        }

        if self.matches('e') || self.matches('E') {
            if self.peek(0) == '-' || self.peek(0) == '+' {
                self.advance();
            }
            while self.peek(0).is_ascii_digit() {
                self.advance();
            }
        }

        self.make_token(TokenType::NumberLiteral)
    }

    fn identifier(&mut self) -> Token {
        while Scanner::is_valid_identifier_char(self.peek(0)) {
            self.advance();
        }

        let ty = keyword_type(&self.source[self.start..self.curr])
            .unwrap_or(TokenType::Identifier);
        self.make_token(ty)
    }

    fn is_valid_identifier_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '-' || c == '_'
    }

    fn skip_whitespace(&mut self) {
        loop {
            match self.peek(0) {
                '#' => {
                    while !self.is_at_end() && self.peek(0) != '\n' {
                        self.advance();
                    }
                }
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance();
                }
                _ => return,
            }
        }
    }

    fn advance(&mut self) -> char {
        let Some(c) = self.source[self.curr..].chars().next() else {
            return '\0';
        };

        self.curr += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }

        c
    }

    fn peek(&self, ahead: usize) -> char {
        self.source[self.curr..].chars().nth(ahead).unwrap_or('\0')
    }

    fn matches(&mut self, expected: char) -> bool {
        if self.peek(0) == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn is_at_end(&self) -> bool {
        self.curr >= self.source.len()
    }

    fn current_position(&self) -> SourcePosition {
        SourcePosition {
            offset: self.curr as u32,
            line: self.line,
            column: self.column,
        }
    }

    fn make_token(&self, ty: TokenType) -> Token {
        Token {
            ty,
            lexeme: self.source[self.start..self.curr].to_string(),
            position: SourceRange {
                start: self.token_start,
                end: self.current_position(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_all(source: &str) -> Vec<Token> {
        let mut scanner = Scanner::new(source);
        let mut tokens = Vec::new();
        while scanner.has_next() {
            tokens.push(scanner.next());
        }
        tokens
    }

    fn kinds(source: &str) -> Vec<TokenType> {
        scan_all(source).iter().map(|t| t.ty).collect()
    }

    #[test]
    fn scans_a_let_statement() {
        assert_eq!(
            kinds("let x = 1;"),
            vec![
                TokenType::LetKeyword,
                TokenType::Identifier,
                TokenType::Assign,
                TokenType::NumberLiteral,
                TokenType::Semicolon,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn keywords_require_an_exact_match() {
        assert_eq!(
            kinds("while whilst defun defund"),
            vec![
                TokenType::WhileKeyword,
                TokenType::Identifier,
                TokenType::DefunKeyword,
                TokenType::Identifier,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn joins_two_character_operators() {
        assert_eq!(
            kinds("== != >= <= ** = > <"),
            vec![
                TokenType::Equal,
                TokenType::NotEqual,
                TokenType::GreaterEqual,
                TokenType::LessEqual,
                TokenType::Exponent,
                TokenType::Assign,
                TokenType::Greater,
                TokenType::Less,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn lone_bang_is_unknown() {
        assert_eq!(kinds("!"), vec![TokenType::Unknown, TokenType::Eof]);
        assert_eq!(kinds("!="), vec![TokenType::NotEqual, TokenType::Eof]);
    }

    #[test]
    fn identifiers_may_contain_dashes() {
        let tokens = scan_all("foo-bar");
        assert_eq!(tokens[0].ty, TokenType::Identifier);
        assert_eq!(tokens[0].lexeme, "foo-bar");
        assert_eq!(tokens[1].ty, TokenType::Eof);
    }

    #[test]
    fn string_lexeme_includes_the_quotes() {
        let tokens = scan_all("\"hello\"");
        assert_eq!(tokens[0].ty, TokenType::StringLiteral);
        assert_eq!(tokens[0].lexeme, "\"hello\"");
    }

    #[test]
    fn unterminated_string_is_unknown() {
        let tokens = scan_all("\"oops");
        assert_eq!(tokens[0].ty, TokenType::Unknown);
    }

    #[test]
    fn numbers_with_fraction_and_exponent() {
        let tokens = scan_all("1 2.5 1.5e-3 2E+4");
        let lexemes: Vec<&str> = tokens
            .iter()
            .filter(|t| t.ty == TokenType::NumberLiteral)
            .map(|t| t.lexeme.as_str())
            .collect();
        assert_eq!(lexemes, vec!["1", "2.5", "1.5e-3", "2E+4"]);
    }

    #[test]
    fn skips_comments_and_tracks_lines() {
        let tokens = scan_all("# a comment\nprint 1;");
        assert_eq!(tokens[0].ty, TokenType::PrintKeyword);
        assert_eq!(tokens[0].position.start.line, 2);
        assert_eq!(tokens[0].position.start.column, 1);
    }

    #[test]
    fn token_spans_tile_the_source() {
        let source = "let answer = 6 * 7; # comment\nprint answer;";
        for token in scan_all(source) {
            let start = token.position.start.offset as usize;
            let end = token.position.end.offset as usize;
            assert_eq!(&source[start..end], token.lexeme);
        }
    }

    #[test]
    fn eof_ends_the_stream() {
        let mut scanner = Scanner::new("");
        assert!(scanner.has_next());
        assert_eq!(scanner.next().ty, TokenType::Eof);
        assert!(!scanner.has_next());
    }
}
