use crate::ast::{Expr, Literal, Stmt};
use crate::bytecode::Op;
use crate::disassembler;
use crate::error_reporter::ErrorReporter;
use crate::scanner::{SourceRange, Token, TokenType};
use crate::value::{ObjectFunction, Value};

const MAX_LOCALS: usize = 256;
const MAX_CONSTANTS: usize = 256;

#[derive(Debug)]
struct Local {
    name: Token,
    // -1 marks "declared but not yet initialized" until the initializer
    // has been compiled.
    depth: i32,
}

#[derive(Debug)]
struct Loop {
    scope_depth: i32,
    start: usize,
    // Operand offsets of every `break` jump, patched in end_loop.
    break_jumps: Vec<usize>,
}

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum FunctionType {
    Function,
    Script,
}

/// Walks the AST once and emits bytecode into the function being built.
/// Function bodies are compiled by a fresh sub-compiler in `Function` mode.
pub struct Compiler<'r> {
    function_type: FunctionType,
    reporter: &'r mut ErrorReporter,
    debug_mode: bool,

    node_location: SourceRange,
    function: ObjectFunction,

    loops: Vec<Loop>,
    scope_depth: i32,
    locals: Vec<Local>,
}

impl<'r> Compiler<'r> {
    pub fn new(
        function_type: FunctionType,
        reporter: &'r mut ErrorReporter,
        debug_mode: bool,
    ) -> Compiler<'r> {
        Compiler {
            function_type,
            reporter,
            debug_mode,
            node_location: SourceRange::default(),
            function: ObjectFunction::default(),
            loops: Vec::new(),
            scope_depth: 0,
            // Slot 0 is reserved for the function value itself.
            locals: vec![Local {
                name: Token::default(),
                depth: 0,
            }],
        }
    }

    pub fn compile(mut self, program: &[Stmt]) -> ObjectFunction {
        for stmt in program {
            self.compile_statement(stmt);
        }

        self.emit_op(Op::Nil);
        self.emit_op(Op::Return);

        if self.debug_mode {
            let name = if self.function.name.is_empty() {
                "<script>"
            } else {
                self.function.name.as_str()
            };
            print!(
                "{}",
                disassembler::disassemble_chunk(name, &self.function.chunk)
            );
        }

        self.function
    }

    fn compile_statement(&mut self, stmt: &Stmt) {
        self.node_location = stmt.location();

        match stmt {
            Stmt::VarDecl {
                name, initializer, ..
            } => {
                self.declare_variable(name);
                self.compile_expression(initializer);
                self.define_variable(name);
            }
            Stmt::FunDecl {
                name, params, body, ..
            } => self.compile_function_declaration(name, params, body),
            Stmt::Block { statements, .. } => {
                self.begin_scope();
                for stmt in statements {
                    self.compile_statement(stmt);
                }
                self.end_scope();
            }
            Stmt::While {
                condition, body, ..
            } => {
                self.begin_loop();
                let loop_start = self.loops.last().map(|l| l.start).unwrap_or(0);

                self.compile_expression(condition);

                let exit_jump = self.emit_jump(Op::JumpIfFalse);
                self.emit_op(Op::Pop);

                self.compile_statement(body);

                self.emit_loop(loop_start);

                self.patch_jump(exit_jump);
                self.emit_op(Op::Pop);

                // Breaks land here, past the Pop that discards the loop
                // condition on the normal exit path; a break has nothing
                // left on the stack to discard.
                self.end_loop();
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                self.compile_expression(condition);

                // JumpIfFalse leaves the condition on the stack; each branch
                // starts with its own Pop.
                let then_jump = self.emit_jump(Op::JumpIfFalse);
                self.emit_op(Op::Pop);

                self.compile_statement(then_branch);

                let else_jump = self.emit_jump(Op::Jump);

                self.patch_jump(then_jump);
                self.emit_op(Op::Pop);

                if let Some(else_branch) = else_branch {
                    self.compile_statement(else_branch);
                }

                self.patch_jump(else_jump);
            }
            Stmt::Expression { expression, .. } => {
                self.compile_expression(expression);
                self.emit_op(Op::Pop);
            }
            Stmt::Continue { .. } => {
                if self.loops.is_empty() {
                    self.emit_error("Can't use 'continue' outside a loop.");
                    return;
                }

                let loop_start = self.loops.last().map(|l| l.start).unwrap_or(0);
                self.pop_locals_down_to_loop_depth();
                self.emit_loop(loop_start);
            }
            Stmt::Break { .. } => {
                if self.loops.is_empty() {
                    self.emit_error("Can't use 'break' outside a loop.");
                    return;
                }

                self.pop_locals_down_to_loop_depth();

                let jump = self.emit_jump(Op::Jump);
                if let Some(active) = self.loops.last_mut() {
                    active.break_jumps.push(jump);
                }
            }
            Stmt::Return { value, .. } => {
                if self.function_type == FunctionType::Script {
                    self.emit_error("Can't return from top-level.");
                    return;
                }

                match value {
                    Some(value) => self.compile_expression(value),
                    None => self.emit_op(Op::Nil),
                }
                self.emit_op(Op::Return);
            }
            Stmt::Print { expression, .. } => {
                self.compile_expression(expression);
                self.emit_op(Op::Print);
            }
        }
    }

    fn compile_function_declaration(&mut self, name: &Token, params: &[Token], body: &[Stmt]) {
        if self.function_type == FunctionType::Function {
            self.emit_error("Can't declare a function inside another function.");
            return;
        }

        let mut function = {
            let mut sub = Compiler::new(
                FunctionType::Function,
                &mut *self.reporter,
                self.debug_mode,
            );
            sub.function.name = name.lexeme.clone();
            sub.node_location = self.node_location;

            sub.begin_scope();
            for param in params {
                sub.declare_variable(param);
                sub.define_variable(param);
            }

            sub.compile(body)
        };
        function.arity = params.len();

        let index = self.make_constant(Value::Function(function));
        self.emit_op(Op::PushConstant);
        self.emit_byte(index);

        self.define_variable(name);
    }

    fn compile_expression(&mut self, expr: &Expr) {
        self.node_location = expr.location();

        match expr {
            Expr::Assign { name, value, .. } => {
                self.compile_expression(value);

                let slot = self.resolve_variable_name(name);
                if slot == -1 {
                    let index = self.make_constant(Value::String(name.lexeme.clone()));
                    self.emit_op(Op::SetGlobal);
                    self.emit_byte(index);
                } else {
                    self.emit_op(Op::SetLocal);
                    self.emit_byte(slot as u8);
                }
            }
            Expr::Binary {
                op, left, right, ..
            } => self.compile_binary_expression(op, left, right),
            Expr::Unary { op, right, .. } => {
                self.compile_expression(right);

                match op.ty {
                    TokenType::Minus => self.emit_op(Op::Negate),
                    TokenType::NotKeyword => self.emit_op(Op::Not),
                    TokenType::Plus => {}
                    _ => {
                        let message = format!("Invalid unary operator '{}'.", op.lexeme);
                        self.emit_error(&message);
                    }
                }
            }
            Expr::Call {
                callee, arguments, ..
            } => {
                self.compile_expression(callee);

                for argument in arguments {
                    self.compile_expression(argument);
                }

                if arguments.len() > u8::MAX as usize {
                    self.emit_error("Can't have more than 255 arguments.");
                    return;
                }

                self.emit_op(Op::Call);
                self.emit_byte(arguments.len() as u8);
            }
            Expr::Grouping { expression, .. } => self.compile_expression(expression),
            Expr::Variable { name, .. } => {
                let slot = self.resolve_variable_name(name);
                if slot == -1 {
                    let index = self.make_constant(Value::String(name.lexeme.clone()));
                    self.emit_op(Op::GetGlobal);
                    self.emit_byte(index);
                } else {
                    self.emit_op(Op::GetLocal);
                    self.emit_byte(slot as u8);
                }
            }
            Expr::Literal { value, .. } => match value {
                Literal::Nil => self.emit_op(Op::Nil),
                Literal::Bool(true) => self.emit_op(Op::True),
                Literal::Bool(false) => self.emit_op(Op::False),
                Literal::Number(number) => {
                    let index = self.make_constant(Value::Number(*number));
                    self.emit_op(Op::PushConstant);
                    self.emit_byte(index);
                }
                Literal::String(text) => {
                    let index = self.make_constant(Value::String(text.clone()));
                    self.emit_op(Op::PushConstant);
                    self.emit_byte(index);
                }
            },
        }
    }

    fn compile_binary_expression(&mut self, op: &Token, left: &Expr, right: &Expr) {
        // `and`/`or` short-circuit, so their right operand compiles behind
        // a jump instead of unconditionally.
        if op.ty == TokenType::AndKeyword {
            self.compile_expression(left);

            let end_jump = self.emit_jump(Op::JumpIfFalse);
            self.emit_op(Op::Pop);

            self.compile_expression(right);
            self.patch_jump(end_jump);

            return;
        }

        if op.ty == TokenType::OrKeyword {
            self.compile_expression(left);

            let else_jump = self.emit_jump(Op::JumpIfFalse);
            let end_jump = self.emit_jump(Op::Jump);

            self.patch_jump(else_jump);
            self.emit_op(Op::Pop);
            self.compile_expression(right);

            self.patch_jump(end_jump);

            return;
        }

        self.compile_expression(left);
        self.compile_expression(right);

        match op.ty {
            TokenType::Plus => self.emit_op(Op::Add),
            TokenType::Minus => self.emit_op(Op::Sub),
            TokenType::Star => self.emit_op(Op::Mult),
            TokenType::Slash => self.emit_op(Op::Div),
            TokenType::Exponent => self.emit_op(Op::Pow),
            TokenType::Less => self.emit_op(Op::Less),
            TokenType::Greater => self.emit_op(Op::Greater),
            TokenType::LessEqual => {
                self.emit_op(Op::Greater);
                self.emit_op(Op::Not);
            }
            TokenType::GreaterEqual => {
                self.emit_op(Op::Less);
                self.emit_op(Op::Not);
            }
            TokenType::Equal => self.emit_op(Op::Equal),
            TokenType::NotEqual => {
                self.emit_op(Op::Equal);
                self.emit_op(Op::Not);
            }
            _ => {
                let message = format!("Unknown operator '{}'.", op.lexeme);
                self.emit_error(&message);
            }
        }
    }

    fn declare_variable(&mut self, name: &Token) {
        if self.scope_depth == 0 {
            return;
        }

        if self.locals.len() >= MAX_LOCALS {
            self.emit_error("Each scope can have a maximum of 256 locals.");
            return;
        }

        let mut already_declared = false;
        for local in self.locals.iter().rev() {
            if local.depth != -1 && local.depth < self.scope_depth {
                break;
            }
            if local.name.lexeme == name.lexeme {
                already_declared = true;
                break;
            }
        }
        if already_declared {
            self.emit_error("Variable already declared.");
        }

        self.locals.push(Local {
            name: name.clone(),
            depth: -1,
        });
    }

    fn define_variable(&mut self, name: &Token) {
        if self.scope_depth > 0 {
            self.mark_variable_as_defined();
            return;
        }

        let index = self.make_constant(Value::String(name.lexeme.clone()));
        self.emit_op(Op::DefineGlobal);
        self.emit_byte(index);
    }

    fn mark_variable_as_defined(&mut self) {
        let depth = self.scope_depth;
        if let Some(local) = self.locals.last_mut() {
            local.depth = depth;
        }
    }

    fn resolve_variable_name(&mut self, name: &Token) -> i32 {
        let mut uninitialized = false;
        let mut slot = -1;

        for (index, local) in self.locals.iter().enumerate().rev() {
            if local.name.lexeme == name.lexeme {
                uninitialized = local.depth == -1;
                slot = index as i32;
                break;
            }
        }

        if uninitialized {
            self.emit_error("Can't use a variable in its own initializer.");
        }

        slot
    }

    fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.scope_depth -= 1;

        while self
            .locals
            .last()
            .map_or(false, |local| local.depth > self.scope_depth)
        {
            self.emit_op(Op::Pop);
            self.locals.pop();
        }
    }

    fn begin_loop(&mut self) {
        self.loops.push(Loop {
            scope_depth: self.scope_depth,
            start: self.function.chunk.size(),
            break_jumps: Vec::new(),
        });
    }

    fn end_loop(&mut self) {
        let Some(finished) = self.loops.pop() else {
            return;
        };

        // Each break lands at the current end of the chunk.
        for offset in finished.break_jumps {
            self.patch_jump(offset);
        }
    }

    /// Pops the values of locals that live deeper than the innermost loop
    /// without forgetting them; the jump leaves their scopes bodily.
    fn pop_locals_down_to_loop_depth(&mut self) {
        let loop_depth = self.loops.last().map(|l| l.scope_depth).unwrap_or(0);
        let pops = self
            .locals
            .iter()
            .rev()
            .take_while(|local| local.depth > loop_depth)
            .count();

        for _ in 0..pops {
            self.emit_op(Op::Pop);
        }
    }

    fn emit_loop(&mut self, start: usize) {
        self.emit_op(Op::Loop);

        // The operand is subtracted from ip after the full three-byte
        // instruction has been read.
        let offset = self.function.chunk.size() - start + 2;
        if offset > u16::MAX as usize {
            self.emit_error("Loop body too large.");
            return;
        }

        self.emit_byte(((offset >> 8) & 0xff) as u8);
        self.emit_byte((offset & 0xff) as u8);
    }

    fn emit_jump(&mut self, op: Op) -> usize {
        self.emit_op(op);

        self.emit_byte(0xff);
        self.emit_byte(0xff);

        self.function.chunk.size() - 2
    }

    fn patch_jump(&mut self, offset: usize) {
        let jump = self.function.chunk.size() - offset - 2;

        if jump > u16::MAX as usize {
            self.emit_error("Too long jump.");
            return;
        }

        self.function.chunk.code[offset] = ((jump >> 8) & 0xff) as u8;
        self.function.chunk.code[offset + 1] = (jump & 0xff) as u8;
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        if self.function.chunk.constants.len() >= MAX_CONSTANTS {
            self.emit_error("Too many constants in one chunk.");
            return 0;
        }

        self.function.chunk.add_constant(value)
    }

    fn emit_op(&mut self, op: Op) {
        let line = self.node_location.start.line;
        self.function.chunk.write_op(op, line);
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.node_location.start.line;
        self.function.chunk.write_byte(byte, line);
    }

    fn emit_error(&mut self, message: &str) {
        self.reporter.error(self.node_location, message);
    }
}
