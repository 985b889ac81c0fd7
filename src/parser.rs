use std::mem;

use crate::ast::{Expr, Literal, Stmt};
use crate::error_reporter::ErrorReporter;
use crate::scanner::{Scanner, SourceRange, Token, TokenType};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment,
    LogicOr,
    LogicAnd,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Exponent,
    Call,
    Primary,
}

impl Precedence {
    /// The next-lower level; parsing the right operand here makes the
    /// operator right-associative.
    fn one_lower(self) -> Precedence {
        match self {
            Precedence::None | Precedence::Assignment => Precedence::None,
            Precedence::LogicOr => Precedence::Assignment,
            Precedence::LogicAnd => Precedence::LogicOr,
            Precedence::Equality => Precedence::LogicAnd,
            Precedence::Comparison => Precedence::Equality,
            Precedence::Term => Precedence::Comparison,
            Precedence::Factor => Precedence::Term,
            Precedence::Unary => Precedence::Factor,
            Precedence::Exponent => Precedence::Unary,
            Precedence::Call => Precedence::Exponent,
            Precedence::Primary => Precedence::Call,
        }
    }
}

#[derive(Debug, Copy, Clone)]
enum PrefixFn {
    Unary,
    Primary,
}

#[derive(Debug, Copy, Clone)]
enum InfixFn {
    Assignment,
    Binary,
    Call,
}

struct ParseRule {
    prec: Precedence,
    prefix: Option<PrefixFn>,
    infix: Option<InfixFn>,
}

impl ParseRule {
    fn none() -> ParseRule {
        ParseRule {
            prec: Precedence::None,
            prefix: None,
            infix: None,
        }
    }

    fn prefix(prec: Precedence, prefix: PrefixFn) -> ParseRule {
        ParseRule {
            prec,
            prefix: Some(prefix),
            infix: None,
        }
    }

    fn infix(prec: Precedence, infix: InfixFn) -> ParseRule {
        ParseRule {
            prec,
            prefix: None,
            infix: Some(infix),
        }
    }
}

/// Recursive-descent statement grammar on top of a Pratt expression parser.
/// Errors go to the reporter; on error the parser enters panic mode and
/// resynchronizes at the next declaration-starting keyword.
pub struct Parser<'s, 'r> {
    scanner: Scanner<'s>,
    reporter: &'r mut ErrorReporter,
    curr: Token,
    prev: Token,
    start: Token,
    panic_mode: bool,
}

impl<'s, 'r> Parser<'s, 'r> {
    pub fn new(source: &'s str, reporter: &'r mut ErrorReporter) -> Parser<'s, 'r> {
        let mut scanner = Scanner::new(source);
        let curr = scanner.next();
        Parser {
            scanner,
            reporter,
            curr,
            prev: Token::default(),
            start: Token::default(),
            panic_mode: false,
        }
    }

    pub fn parse_source(&mut self) -> Vec<Stmt> {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            self.start = self.curr.clone();

            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }

            if self.panic_mode {
                self.synchronize();
            }
        }

        statements
    }

    fn declaration(&mut self) -> Option<Stmt> {
        if self.matches(TokenType::LetKeyword) {
            self.variable_declaration()
        } else if self.matches(TokenType::DefunKeyword) {
            self.function_declaration()
        } else {
            self.statement()
        }
    }

    fn variable_declaration(&mut self) -> Option<Stmt> {
        let name = self.consume(
            TokenType::Identifier,
            "Expect variable name after 'let' keyword.",
        )?;

        self.consume(TokenType::Assign, "Expect '=' after variable name.");
        let initializer = self.expression()?;
        self.consume(TokenType::Semicolon, "Expect ';' at end of let statement.");

        Some(Stmt::VarDecl {
            name,
            initializer,
            location: self.current_source_range(),
        })
    }

    fn function_declaration(&mut self) -> Option<Stmt> {
        let name = self.consume(
            TokenType::Identifier,
            "Expect function name after 'defun' keyword.",
        )?;

        self.consume(TokenType::LeftParen, "Expect '(' after function name.");

        let mut params = Vec::new();
        if !self.matches(TokenType::RightParen) {
            loop {
                let param = self.consume(TokenType::Identifier, "Expect parameter name.")?;
                params.push(param);

                if !self.matches(TokenType::Comma) {
                    break;
                }
            }

            self.consume(TokenType::RightParen, "Expect ')' after parameters.");
        }

        self.consume(TokenType::LeftBrace, "Expect '{' before function body.");
        let body = self.block_statements();

        Some(Stmt::FunDecl {
            name,
            params,
            body,
            location: self.current_source_range(),
        })
    }

    fn statement(&mut self) -> Option<Stmt> {
        if self.matches(TokenType::IfKeyword) {
            self.if_statement()
        } else if self.matches(TokenType::WhileKeyword) {
            self.while_statement()
        } else if self.matches(TokenType::PrintKeyword) {
            self.print_statement()
        } else if self.matches(TokenType::ReturnKeyword) {
            self.return_statement()
        } else if self.matches(TokenType::ContinueKeyword) {
            self.continue_statement()
        } else if self.matches(TokenType::BreakKeyword) {
            self.break_statement()
        } else if self.matches(TokenType::LeftBrace) {
            self.block()
        } else {
            self.expression_statement()
        }
    }

    fn block_statements(&mut self) -> Vec<Stmt> {
        let mut statements = Vec::new();

        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
            if self.panic_mode {
                self.synchronize();
            }
        }

        self.consume(TokenType::RightBrace, "Expect '}' after block.");
        statements
    }

    fn block(&mut self) -> Option<Stmt> {
        let statements = self.block_statements();
        Some(Stmt::Block {
            statements,
            location: self.current_source_range(),
        })
    }

    fn if_statement(&mut self) -> Option<Stmt> {
        let condition = self.expression()?;

        self.consume(TokenType::LeftBrace, "Expect '{' before then branch.");
        let then_branch = Box::new(self.block()?);

        let else_branch = if self.matches(TokenType::ElseKeyword) {
            self.consume(TokenType::LeftBrace, "Expect '{' before else branch.");
            Some(Box::new(self.block()?))
        } else {
            None
        };

        Some(Stmt::If {
            condition,
            then_branch,
            else_branch,
            location: self.current_source_range(),
        })
    }

    fn while_statement(&mut self) -> Option<Stmt> {
        let condition = self.expression()?;

        self.consume(TokenType::LeftBrace, "Expect '{' before while body.");
        let body = Box::new(self.block()?);

        Some(Stmt::While {
            condition,
            body,
            location: self.current_source_range(),
        })
    }

    fn print_statement(&mut self) -> Option<Stmt> {
        let expression = self.expression()?;
        self.consume(TokenType::Semicolon, "Expect ';' at end of print statement.");

        Some(Stmt::Print {
            expression,
            location: self.current_source_range(),
        })
    }

    fn return_statement(&mut self) -> Option<Stmt> {
        let mut value = None;

        if !self.matches(TokenType::Semicolon) {
            value = self.expression();
            self.consume(
                TokenType::Semicolon,
                "Expect ';' at end of return statement.",
            );
        }

        Some(Stmt::Return {
            value,
            location: self.current_source_range(),
        })
    }

    fn continue_statement(&mut self) -> Option<Stmt> {
        self.consume(
            TokenType::Semicolon,
            "Expect ';' after continue statement.",
        );
        Some(Stmt::Continue {
            location: self.current_source_range(),
        })
    }

    fn break_statement(&mut self) -> Option<Stmt> {
        self.consume(TokenType::Semicolon, "Expect ';' after break statement.");
        Some(Stmt::Break {
            location: self.current_source_range(),
        })
    }

    fn expression_statement(&mut self) -> Option<Stmt> {
        let expression = self.expression()?;
        self.consume(TokenType::Semicolon, "Expect ';' after expression.");

        Some(Stmt::Expression {
            expression,
            location: self.current_source_range(),
        })
    }

    fn get_rule(ty: TokenType) -> ParseRule {
        match ty {
            TokenType::Assign => ParseRule::infix(Precedence::Assignment, InfixFn::Assignment),
            TokenType::OrKeyword => ParseRule::infix(Precedence::LogicOr, InfixFn::Binary),
            TokenType::AndKeyword => ParseRule::infix(Precedence::LogicAnd, InfixFn::Binary),
            TokenType::Equal | TokenType::NotEqual => {
                ParseRule::infix(Precedence::Equality, InfixFn::Binary)
            }
            TokenType::Less
            | TokenType::Greater
            | TokenType::LessEqual
            | TokenType::GreaterEqual => ParseRule::infix(Precedence::Comparison, InfixFn::Binary),
            TokenType::Plus | TokenType::Minus => ParseRule {
                prec: Precedence::Term,
                prefix: Some(PrefixFn::Unary),
                infix: Some(InfixFn::Binary),
            },
            TokenType::Star | TokenType::Slash => {
                ParseRule::infix(Precedence::Factor, InfixFn::Binary)
            }
            TokenType::Exponent => ParseRule::infix(Precedence::Exponent, InfixFn::Binary),
            TokenType::NotKeyword => ParseRule::prefix(Precedence::Unary, PrefixFn::Unary),
            TokenType::LeftParen => ParseRule {
                prec: Precedence::Call,
                prefix: Some(PrefixFn::Primary),
                infix: Some(InfixFn::Call),
            },
            TokenType::Identifier
            | TokenType::NumberLiteral
            | TokenType::StringLiteral
            | TokenType::TrueKeyword
            | TokenType::FalseKeyword
            | TokenType::NilKeyword => ParseRule::prefix(Precedence::Primary, PrefixFn::Primary),
            _ => ParseRule::none(),
        }
    }

    fn expression(&mut self) -> Option<Expr> {
        self.parse_precedence(Precedence::None)
    }

    fn parse_precedence(&mut self, prec: Precedence) -> Option<Expr> {
        self.advance();

        let mut left = match Parser::get_rule(self.prev.ty).prefix {
            Some(prefix) => self.apply_prefix(prefix)?,
            None => {
                self.error_at_unexpected_token();
                return None;
            }
        };

        while prec < Parser::get_rule(self.curr.ty).prec {
            self.advance();

            match Parser::get_rule(self.prev.ty).infix {
                Some(infix) => left = self.apply_infix(infix, left)?,
                None => break,
            }
        }

        Some(left)
    }

    fn apply_prefix(&mut self, prefix: PrefixFn) -> Option<Expr> {
        match prefix {
            PrefixFn::Unary => self.unary_expression(),
            PrefixFn::Primary => self.primary_expression(),
        }
    }

    fn apply_infix(&mut self, infix: InfixFn, left: Expr) -> Option<Expr> {
        match infix {
            InfixFn::Assignment => self.assignment_expression(left),
            InfixFn::Binary => self.binary_expression(left),
            InfixFn::Call => self.call_expression(left),
        }
    }

    fn assignment_expression(&mut self, left: Expr) -> Option<Expr> {
        let name = match left {
            Expr::Variable { name, .. } => name,
            _ => {
                self.error("Expect an lvalue.");
                return None;
            }
        };

        // One level below Assignment: `a = b = 1` nests to the right.
        let value = self.parse_precedence(Precedence::Assignment.one_lower())?;

        Some(Expr::Assign {
            name,
            value: Box::new(value),
            location: self.current_source_range(),
        })
    }

    fn binary_expression(&mut self, left: Expr) -> Option<Expr> {
        let op = self.prev.clone();
        let rule_prec = Parser::get_rule(op.ty).prec;

        // `**` is right-associative; every other binary operator parses its
        // right side at its own level and associates to the left.
        let prec = if op.ty == TokenType::Exponent {
            rule_prec.one_lower()
        } else {
            rule_prec
        };

        let right = self.parse_precedence(prec)?;

        Some(Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            location: self.current_source_range(),
        })
    }

    fn unary_expression(&mut self) -> Option<Expr> {
        let op = self.prev.clone();
        let right = self.parse_precedence(Precedence::Unary)?;

        Some(Expr::Unary {
            op,
            right: Box::new(right),
            location: self.current_source_range(),
        })
    }

    fn call_expression(&mut self, left: Expr) -> Option<Expr> {
        let mut arguments = Vec::new();

        if !self.matches(TokenType::RightParen) {
            loop {
                match self.expression() {
                    Some(expr) => arguments.push(expr),
                    None => {
                        self.error("Invalid argument.");
                        return None;
                    }
                }

                if !self.matches(TokenType::Comma) {
                    break;
                }
            }

            self.consume(TokenType::RightParen, "Expect ')' after arguments.");
        }

        Some(Expr::Call {
            callee: Box::new(left),
            arguments,
            location: self.current_source_range(),
        })
    }

    fn primary_expression(&mut self) -> Option<Expr> {
        let token = self.prev.clone();

        match token.ty {
            TokenType::LeftParen => {
                let expression = self.expression()?;
                self.consume(
                    TokenType::RightParen,
                    "Expect ')' after a grouping expression.",
                );
                Some(Expr::Grouping {
                    expression: Box::new(expression),
                    location: self.current_source_range(),
                })
            }
            TokenType::StringLiteral => {
                // The lexeme still carries its quotes.
                let text = token.lexeme[1..token.lexeme.len() - 1].to_string();
                Some(Expr::Literal {
                    value: Literal::String(text),
                    location: self.current_source_range(),
                })
            }
            TokenType::NumberLiteral => match token.lexeme.parse::<f64>() {
                Ok(number) => Some(Expr::Literal {
                    value: Literal::Number(number),
                    location: self.current_source_range(),
                }),
                Err(_) => {
                    self.error("Invalid number literal.");
                    None
                }
            },
            TokenType::TrueKeyword => Some(Expr::Literal {
                value: Literal::Bool(true),
                location: self.current_source_range(),
            }),
            TokenType::FalseKeyword => Some(Expr::Literal {
                value: Literal::Bool(false),
                location: self.current_source_range(),
            }),
            TokenType::NilKeyword => Some(Expr::Literal {
                value: Literal::Nil,
                location: self.current_source_range(),
            }),
            TokenType::Identifier => Some(Expr::Variable {
                name: token,
                location: self.current_source_range(),
            }),
            _ => {
                self.error("Expect a literal or grouping expression.");
                None
            }
        }
    }

    fn error_at_unexpected_token(&mut self) {
        if self.prev.ty == TokenType::Unknown {
            if self.prev.lexeme.starts_with('"') {
                self.error("Unterminated string literal.");
            } else {
                let message = format!("Unexpected character '{}'.", self.prev.lexeme);
                self.error(&message);
            }
        } else {
            self.error("Expect an expression.");
        }
    }

    fn error(&mut self, message: &str) {
        self.reporter.error(self.current_source_range(), message);
        self.panic_mode = true;
    }

    fn synchronize(&mut self) {
        while !self.is_at_end() {
            match self.curr.ty {
                TokenType::DefunKeyword
                | TokenType::LetKeyword
                | TokenType::IfKeyword
                | TokenType::WhileKeyword
                | TokenType::BreakKeyword
                | TokenType::ContinueKeyword
                | TokenType::ReturnKeyword => break,
                _ => self.advance(),
            }
        }

        self.panic_mode = false;
    }

    fn current_source_range(&self) -> SourceRange {
        SourceRange {
            start: self.start.position.start,
            end: self.curr.position.end,
        }
    }

    fn advance(&mut self) {
        if self.is_at_end() {
            return;
        }
        self.prev = mem::replace(&mut self.curr, self.scanner.next());
    }

    fn check(&self, ty: TokenType) -> bool {
        self.curr.ty == ty
    }

    fn matches(&mut self, ty: TokenType) -> bool {
        if self.check(ty) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, ty: TokenType, error_message: &str) -> Option<Token> {
        if self.matches(ty) {
            return Some(self.prev.clone());
        }

        self.error(error_message);
        None
    }

    fn is_at_end(&self) -> bool {
        !self.scanner.has_next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> (Vec<Stmt>, Vec<String>, bool) {
        let mut reporter = ErrorReporter::new(source);
        let program = Parser::new(source, &mut reporter).parse_source();
        (
            program,
            reporter.errors().to_vec(),
            reporter.had_error(),
        )
    }

    fn parse_ok(source: &str) -> Vec<Stmt> {
        let (program, errors, had_error) = parse(source);
        assert!(!had_error, "unexpected parse errors: {:?}", errors);
        program
    }

    fn single_expression(source: &str) -> Expr {
        let program = parse_ok(source);
        match program.into_iter().next() {
            Some(Stmt::Expression { expression, .. }) => expression,
            other => panic!("expected an expression statement, got {:?}", other),
        }
    }

    fn binary_parts(expr: &Expr) -> (&str, &Expr, &Expr) {
        match expr {
            Expr::Binary {
                op, left, right, ..
            } => (op.lexeme.as_str(), left, right),
            other => panic!("expected a binary expression, got {:?}", other),
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        // 1 + (2 * (3 ** 2))
        let expr = single_expression("1 + 2 * 3 ** 2;");

        let (op, _, right) = binary_parts(&expr);
        assert_eq!(op, "+");

        let (op, _, right) = binary_parts(right);
        assert_eq!(op, "*");

        let (op, _, _) = binary_parts(right);
        assert_eq!(op, "**");
    }

    #[test]
    fn exponent_is_right_associative() {
        // 2 ** (3 ** 2)
        let expr = single_expression("2 ** 3 ** 2;");

        let (op, left, right) = binary_parts(&expr);
        assert_eq!(op, "**");
        assert!(matches!(left, Expr::Literal { .. }));

        let (op, _, _) = binary_parts(right);
        assert_eq!(op, "**");
    }

    #[test]
    fn comparison_binds_tighter_than_logic() {
        // (a < 1) and (b > 2)
        let expr = single_expression("a < 1 and b > 2;");
        let (op, left, right) = binary_parts(&expr);
        assert_eq!(op, "and");
        assert_eq!(binary_parts(left).0, "<");
        assert_eq!(binary_parts(right).0, ">");
    }

    #[test]
    fn assignment_is_right_associative() {
        let expr = single_expression("a = b = 1;");

        match expr {
            Expr::Assign { name, value, .. } => {
                assert_eq!(name.lexeme, "a");
                assert!(matches!(*value, Expr::Assign { .. }));
            }
            other => panic!("expected an assignment, got {:?}", other),
        }
    }

    #[test]
    fn assignment_requires_an_lvalue() {
        let (_, errors, had_error) = parse("a + b = 1;");
        assert!(had_error);
        assert!(errors[0].contains("Expect an lvalue."));
    }

    #[test]
    fn missing_semicolon_reports_once_and_resyncs() {
        let (program, errors, had_error) = parse("let x = 1 let y = 2;");
        assert!(had_error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Expect ';' at end of let statement."));
        // The second declaration still parses after resynchronization.
        assert_eq!(program.len(), 2);
    }

    #[test]
    fn unary_operators_parse_at_unary_precedence() {
        let expr = single_expression("-1 + 2;");
        let (op, left, _) = binary_parts(&expr);
        assert_eq!(op, "+");
        assert!(matches!(left, Expr::Unary { .. }));

        let expr = single_expression("not true;");
        assert!(matches!(expr, Expr::Unary { .. }));
    }

    #[test]
    fn call_arguments_are_ordered() {
        let expr = single_expression("f(1, x, \"s\");");
        match expr {
            Expr::Call {
                callee, arguments, ..
            } => {
                assert!(matches!(*callee, Expr::Variable { .. }));
                assert_eq!(arguments.len(), 3);
                assert!(matches!(
                    arguments[2],
                    Expr::Literal {
                        value: Literal::String(_),
                        ..
                    }
                ));
            }
            other => panic!("expected a call, got {:?}", other),
        }
    }

    #[test]
    fn function_declaration_collects_parameters() {
        let program = parse_ok("defun add(a, b) { return a + b; }");
        match &program[0] {
            Stmt::FunDecl {
                name, params, body, ..
            } => {
                assert_eq!(name.lexeme, "add");
                let names: Vec<&str> = params.iter().map(|p| p.lexeme.as_str()).collect();
                assert_eq!(names, vec!["a", "b"]);
                assert_eq!(body.len(), 1);
                assert!(matches!(body[0], Stmt::Return { value: Some(_), .. }));
            }
            other => panic!("expected a function declaration, got {:?}", other),
        }
    }

    #[test]
    fn bare_return_parses_without_a_value() {
        let program = parse_ok("defun f() { return; }");
        match &program[0] {
            Stmt::FunDecl { body, .. } => {
                assert!(matches!(body[0], Stmt::Return { value: None, .. }));
            }
            other => panic!("expected a function declaration, got {:?}", other),
        }
    }

    #[test]
    fn if_with_else_parses_both_blocks() {
        let program = parse_ok("if x { print 1; } else { print 2; }");
        assert!(matches!(
            program[0],
            Stmt::If {
                else_branch: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn while_break_continue_parse() {
        let program = parse_ok("while true { break; continue; }");
        match &program[0] {
            Stmt::While { body, .. } => match body.as_ref() {
                Stmt::Block { statements, .. } => {
                    assert!(matches!(statements[0], Stmt::Break { .. }));
                    assert!(matches!(statements[1], Stmt::Continue { .. }));
                }
                other => panic!("expected a block body, got {:?}", other),
            },
            other => panic!("expected a while statement, got {:?}", other),
        }
    }

    #[test]
    fn string_literal_drops_its_quotes() {
        let expr = single_expression("\"hi\";");
        assert!(matches!(
            expr,
            Expr::Literal {
                value: Literal::String(ref s),
                ..
            } if s == "hi"
        ));
    }

    #[test]
    fn unexpected_character_gets_a_specific_diagnostic() {
        let (_, errors, had_error) = parse("let x = @;");
        assert!(had_error);
        assert!(errors[0].contains("Unexpected character '@'."));
    }

    #[test]
    fn unterminated_string_gets_a_specific_diagnostic() {
        let (_, errors, had_error) = parse("print \"oops;");
        assert!(had_error);
        assert!(errors[0].contains("Unterminated string literal."));
    }

    #[test]
    fn empty_source_parses_to_nothing() {
        let program = parse_ok("");
        assert!(program.is_empty());
    }
}
