use std::collections::HashMap;
use std::fmt;

use crate::bytecode::Op;
use crate::value::{ObjectFunction, Value};

pub const CALL_FRAMES: usize = 64;
pub const STACK_SIZE: usize = CALL_FRAMES * 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpreterError {
    Runtime(String),
}

impl fmt::Display for InterpreterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpreterError::Runtime(message) => write!(f, "{}", message),
        }
    }
}

/// Per-invocation record: the executing function (functions are value
/// objects, copied into the frame at call time), its instruction pointer and
/// the stack index of slot 0 (the function value itself; arguments follow).
struct CallFrame {
    function: ObjectFunction,
    ip: usize,
    slots: usize,
}

pub struct Interpreter {
    frames: Vec<CallFrame>,
    stack: Vec<Value>,
    globals: HashMap<String, Value>,
    // Everything `print` wrote, in order; tests assert on this.
    pub output: Vec<String>,
}

impl Default for Interpreter {
    fn default() -> Interpreter {
        Interpreter {
            frames: Vec::with_capacity(CALL_FRAMES),
            stack: Vec::with_capacity(STACK_SIZE),
            globals: HashMap::new(),
            output: Vec::new(),
        }
    }
}

impl Interpreter {
    /// Executes a compiled script. Globals survive across calls on the same
    /// interpreter, which is what keeps REPL sessions stateful.
    pub fn interpret(&mut self, function: ObjectFunction) -> Result<(), InterpreterError> {
        self.stack.push(Value::Function(function.clone()));
        self.call_function(function, 0)?;
        self.run()
    }

    fn run(&mut self) -> Result<(), InterpreterError> {
        while !self.is_done() {
            self.step()?;
        }
        Ok(())
    }

    fn is_done(&self) -> bool {
        match self.frames.last() {
            Some(frame) => frame.ip >= frame.function.chunk.size(),
            None => true,
        }
    }

    fn step(&mut self) -> Result<(), InterpreterError> {
        let byte = self.read_byte();
        let Some(op) = Op::from_byte(byte) else {
            return Err(self.runtime_error("Unknown operation."));
        };

        match op {
            Op::PushConstant => {
                let constant = self.read_constant();
                self.stack.push(constant);
            }
            Op::Pop => {
                self.pop();
            }
            Op::Add => {
                let b = self.pop();
                let a = self.pop();

                match (a, b) {
                    (Value::Number(a), Value::Number(b)) => {
                        self.stack.push(Value::Number(a + b));
                    }
                    (Value::String(a), Value::String(b)) => {
                        self.stack.push(Value::String(a + &b));
                    }
                    _ => {
                        return Err(self.runtime_error("Expect two numbers or two strings."));
                    }
                }
            }
            Op::Sub => self.numeric_binop(|a, b| Value::Number(a - b))?,
            Op::Div => self.numeric_binop(|a, b| Value::Number(a / b))?,
            Op::Mult => self.numeric_binop(|a, b| Value::Number(a * b))?,
            Op::Pow => self.numeric_binop(|a, b| Value::Number(a.powf(b)))?,
            Op::Less => self.numeric_binop(|a, b| Value::Bool(a < b))?,
            Op::Greater => self.numeric_binop(|a, b| Value::Bool(a > b))?,
            Op::Equal => {
                let b = self.pop();
                let a = self.pop();
                self.stack.push(Value::Bool(a == b));
            }
            Op::Not => {
                let value = self.pop();
                self.stack.push(Value::Bool(value.is_falsey()));
            }
            Op::Negate => {
                if !matches!(self.peek(0), Value::Number(_)) {
                    return Err(self.runtime_error("Expect a number."));
                }
                if let Value::Number(number) = self.pop() {
                    self.stack.push(Value::Number(-number));
                }
            }
            Op::Print => {
                let value = self.pop();
                let text = value.to_string();
                println!("{}", text);
                self.output.push(text);
            }
            Op::JumpIfFalse => {
                // Leaves the condition on the stack; the compiler pairs every
                // branch with an explicit Pop.
                let offset = self.read_short() as usize;
                if self.peek(0).is_falsey() {
                    self.frame_mut().ip += offset;
                }
            }
            Op::Jump => {
                let offset = self.read_short() as usize;
                self.frame_mut().ip += offset;
            }
            Op::Loop => {
                let offset = self.read_short() as usize;
                self.frame_mut().ip -= offset;
            }
            Op::DefineGlobal => {
                let name = self.read_string_constant()?;

                if self.globals.contains_key(&name) {
                    let message = format!("Global variable '{}' already defined.", name);
                    return Err(self.runtime_error(&message));
                }

                let value = self.pop();
                self.globals.insert(name, value);
            }
            Op::GetGlobal => {
                let name = self.read_string_constant()?;

                match self.globals.get(&name) {
                    Some(value) => {
                        let value = value.clone();
                        self.stack.push(value);
                    }
                    None => {
                        let message = format!("Undefined global variable '{}'.", name);
                        return Err(self.runtime_error(&message));
                    }
                }
            }
            Op::SetGlobal => {
                let name = self.read_string_constant()?;

                if !self.globals.contains_key(&name) {
                    let message = format!("Undefined global variable '{}'.", name);
                    return Err(self.runtime_error(&message));
                }

                // Assignment is an expression; the value stays on the stack.
                let value = self.peek(0).clone();
                self.globals.insert(name, value);
            }
            Op::GetLocal => {
                let slot = self.read_byte() as usize;
                let index = self.frame().slots + slot;
                let value = self.stack[index].clone();
                self.stack.push(value);
            }
            Op::SetLocal => {
                let slot = self.read_byte() as usize;
                let index = self.frame().slots + slot;
                self.stack[index] = self.peek(0).clone();
            }
            Op::Call => {
                let argc = self.read_byte() as usize;

                match self.peek(argc).clone() {
                    Value::Function(function) => {
                        self.call_function(function, argc)?;
                    }
                    _ => {
                        return Err(self.runtime_error("Can only call functions."));
                    }
                }
            }
            Op::Return => {
                let return_value = self.pop();
                let finished = match self.frames.pop() {
                    Some(frame) => frame,
                    None => return Ok(()),
                };

                if self.frames.is_empty() {
                    // The script function below the result is discarded with
                    // everything else; execution is over.
                    self.stack.clear();
                    return Ok(());
                }

                self.stack.truncate(finished.slots);
                self.stack.push(return_value);
            }
            Op::True => self.stack.push(Value::Bool(true)),
            Op::False => self.stack.push(Value::Bool(false)),
            Op::Nil => self.stack.push(Value::Nil),
        }

        Ok(())
    }

    fn call_function(
        &mut self,
        function: ObjectFunction,
        argc: usize,
    ) -> Result<(), InterpreterError> {
        if self.frames.len() == CALL_FRAMES {
            return Err(self.runtime_error("Stack overflow."));
        }

        if argc != function.arity {
            let message = format!("Expect {} arguments, got {}.", function.arity, argc);
            return Err(self.runtime_error(&message));
        }

        let slots = self.stack.len() - argc - 1;
        self.frames.push(CallFrame {
            function,
            ip: 0,
            slots,
        });

        Ok(())
    }

    /// Formats the error with the offending source line and a backtrace of
    /// the active frames (newest first), then resets the machine. Globals
    /// are kept.
    fn runtime_error(&mut self, message: &str) -> InterpreterError {
        let line = self
            .frames
            .last()
            .map(|frame| frame.function.chunk.get_line(frame.ip.saturating_sub(1)))
            .unwrap_or(0);

        let mut text = format!("Runtime error [Ln: {}] {}", line, message);
        for frame in self.frames.iter().rev() {
            text.push_str(&format!("\n    in {}", frame.function));
        }

        self.reset_stack();
        InterpreterError::Runtime(text)
    }

    fn reset_stack(&mut self) {
        self.frames.clear();
        self.stack.clear();
    }

    fn numeric_binop(
        &mut self,
        op: impl FnOnce(f64, f64) -> Value,
    ) -> Result<(), InterpreterError> {
        let b = self.pop();
        let a = self.pop();

        match (a, b) {
            (Value::Number(a), Value::Number(b)) => {
                self.stack.push(op(a, b));
                Ok(())
            }
            _ => Err(self.runtime_error("Expect two numbers.")),
        }
    }

    fn frame(&self) -> &CallFrame {
        self.frames.last().expect("no active call frame")
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("no active call frame")
    }

    fn read_byte(&mut self) -> u8 {
        let frame = self.frame_mut();
        let byte = frame.function.chunk.code[frame.ip];
        frame.ip += 1;
        byte
    }

    fn read_short(&mut self) -> u16 {
        let high = self.read_byte();
        let low = self.read_byte();
        u16::from_be_bytes([high, low])
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_byte();
        self.frame().function.chunk.get_constant(index).clone()
    }

    fn read_string_constant(&mut self) -> Result<String, InterpreterError> {
        match self.read_constant() {
            Value::String(name) => Ok(name),
            _ => Err(self.runtime_error("Expect a name constant.")),
        }
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("attempted to pop an empty stack")
    }

    fn peek(&self, distance: usize) -> &Value {
        &self.stack[self.stack.len() - 1 - distance]
    }
}
