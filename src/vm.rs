use std::{
    collections::HashMap,
    io::{self, Write},
};

use log::trace;
use thiserror::Error;

use crate::{
    bytecode::ByteCode,
    value::{Closure, Value},
};

/// Deepest call nesting before `StackOverflow`.
pub const MAX_FRAMES: usize = 200;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("attempt to perform `{op}` on {left} and {right}")]
    BinaryType {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("attempt to perform `{op}` on {operand}")]
    UnaryType {
        op: &'static str,
        operand: &'static str,
    },
    #[error("attempt to call a {0} value")]
    NotCallable(&'static str),
    #[error("function `{name}` expects {expected} argument(s), got {got}")]
    ArityMismatch { name: String, expected: u8, got: u8 },
    #[error("undefined global `{0}`")]
    UndefinedGlobal(String),
    #[error("stack overflow")]
    StackOverflow,
    #[error("print failed: {0}")]
    Io(#[from] io::Error),
    #[error("internal error: {0}")]
    Internal(&'static str),
}

struct CallFrame {
    ip: usize,
    // stack index of the callee; arguments and locals follow it
    base: usize,
    closure: Closure,
}

/// The virtual machine. `print` writes to `W`, stdout by default.
pub struct ExeState<W = io::Stdout> {
    globals: HashMap<String, Value>,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    output: W,
}

impl ExeState {
    pub fn new() -> Self {
        Self::with_output(io::stdout())
    }
}

impl Default for ExeState {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> ExeState<W> {
    pub fn with_output(output: W) -> Self {
        Self {
            globals: HashMap::new(),
            stack: Vec::new(),
            frames: Vec::new(),
            output,
        }
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Runs `entry` to completion and returns the value it leaves on the
    /// stack. Globals persist between calls.
    pub fn execute(&mut self, entry: &Closure) -> Result<Value, RuntimeError> {
        self.stack.clear();
        self.frames.clear();
        self.stack.push(Value::Function(entry.clone()));
        self.call(0)?;
        self.run()
    }

    fn run(&mut self) -> Result<Value, RuntimeError> {
        loop {
            let byte = self.read_byte()?;
            let code =
                ByteCode::try_from(byte).map_err(|_| RuntimeError::Internal("unknown opcode"))?;
            trace!("{:>5} {code:?}", self.stack.len());

            match code {
                ByteCode::Return => {
                    let result = self.pop()?;
                    let frame = self.frames.pop().ok_or(RuntimeError::Internal("no frame"))?;
                    self.stack.truncate(frame.base);
                    self.stack.push(result.clone());
                    if self.frames.is_empty() {
                        return Ok(result);
                    }
                }
                ByteCode::LoadConstant => {
                    let k = self.read_byte()?;
                    let v = self.constant(k)?;
                    self.stack.push(v);
                }
                ByteCode::LoadNil => self.stack.push(Value::Nil),
                ByteCode::Add => self.binary(Value::add)?,
                ByteCode::Subtract => self.binary(Value::sub)?,
                ByteCode::Multiply => self.binary(Value::mul)?,
                ByteCode::Divide => self.binary(Value::div)?,
                ByteCode::Equal => self.binary(Value::equal)?,
                ByteCode::Greater => self.binary(Value::greater)?,
                ByteCode::Less => self.binary(Value::less)?,
                ByteCode::Negate => {
                    let v = self.pop()?.neg()?;
                    self.stack.push(v);
                }
                ByteCode::Not => {
                    let v = self.pop()?.not()?;
                    self.stack.push(v);
                }
                ByteCode::GetGlobal => {
                    let name = self.global_name()?;
                    match self.globals.get(&name) {
                        Some(v) => self.stack.push(v.clone()),
                        None => return Err(RuntimeError::UndefinedGlobal(name)),
                    }
                }
                ByteCode::SetGlobal => {
                    let name = self.global_name()?;
                    let v = self.pop()?;
                    self.globals.insert(name, v);
                }
                ByteCode::GetLocal => {
                    let i = self.local_index()?;
                    let v = self
                        .stack
                        .get(i)
                        .cloned()
                        .ok_or(RuntimeError::Internal("local slot out of range"))?;
                    self.stack.push(v);
                }
                ByteCode::SetLocal => {
                    let i = self.local_index()?;
                    let v = self.peek()?.clone();
                    let slot = self
                        .stack
                        .get_mut(i)
                        .ok_or(RuntimeError::Internal("local slot out of range"))?;
                    *slot = v;
                }
                ByteCode::Jump => {
                    let offset = self.read_offset()?;
                    self.jump(offset)?;
                }
                ByteCode::JumpIfFalse => {
                    let offset = self.read_offset()?;
                    if self.peek()?.is_falsey() {
                        self.jump(offset)?;
                    }
                }
                ByteCode::And => {
                    let offset = self.read_offset()?;
                    if self.peek()?.is_falsey() {
                        self.jump(offset)?;
                    } else {
                        self.pop()?;
                    }
                }
                ByteCode::Or => {
                    let offset = self.read_offset()?;
                    if self.peek()?.is_falsey() {
                        self.pop()?;
                    } else {
                        self.jump(offset)?;
                    }
                }
                ByteCode::Closure => {
                    let k = self.read_byte()?;
                    match self.constant(k)? {
                        f @ Value::Function(_) => self.stack.push(f),
                        _ => return Err(RuntimeError::Internal("closure of a non-function")),
                    }
                }
                ByteCode::Call => {
                    let argc = self.read_byte()?;
                    self.call(argc)?;
                }
                ByteCode::Print => {
                    let v = self.pop()?;
                    writeln!(self.output, "{v}")?;
                }
                ByteCode::Pop => {
                    self.pop()?;
                }
            }
        }
    }

    // the callee sits below its `argc` arguments
    fn call(&mut self, argc: u8) -> Result<(), RuntimeError> {
        let base = self
            .stack
            .len()
            .checked_sub(argc as usize + 1)
            .ok_or(RuntimeError::Internal("stack underflow"))?;
        let closure = match &self.stack[base] {
            Value::Function(c) => c.clone(),
            v => return Err(RuntimeError::NotCallable(v.type_name())),
        };
        if closure.proto.arity != argc {
            return Err(RuntimeError::ArityMismatch {
                name: closure.proto.name.clone(),
                expected: closure.proto.arity,
                got: argc,
            });
        }
        if self.frames.len() >= MAX_FRAMES {
            return Err(RuntimeError::StackOverflow);
        }
        trace!("call `{}` at base {base}", closure.proto.name);
        self.frames.push(CallFrame {
            ip: 0,
            base,
            closure,
        });
        Ok(())
    }

    fn binary(
        &mut self,
        op: fn(&Value, &Value) -> Result<Value, RuntimeError>,
    ) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;
        self.stack.push(op(&left, &right)?);
        Ok(())
    }

    fn frame(&self) -> Result<&CallFrame, RuntimeError> {
        self.frames.last().ok_or(RuntimeError::Internal("no frame"))
    }

    fn frame_mut(&mut self) -> Result<&mut CallFrame, RuntimeError> {
        self.frames.last_mut().ok_or(RuntimeError::Internal("no frame"))
    }

    fn read_byte(&mut self) -> Result<u8, RuntimeError> {
        let frame = self.frame_mut()?;
        let byte = frame
            .closure
            .proto
            .code
            .get(frame.ip)
            .copied()
            .ok_or(RuntimeError::Internal("ip out of range"))?;
        frame.ip += 1;
        Ok(byte)
    }

    fn read_offset(&mut self) -> Result<i16, RuntimeError> {
        let hi = self.read_byte()?;
        let lo = self.read_byte()?;
        Ok(i16::from_be_bytes([hi, lo]))
    }

    fn jump(&mut self, offset: i16) -> Result<(), RuntimeError> {
        let frame = self.frame_mut()?;
        frame.ip = frame
            .ip
            .checked_add_signed(offset as isize)
            .ok_or(RuntimeError::Internal("jump out of range"))?;
        Ok(())
    }

    fn constant(&self, k: u8) -> Result<Value, RuntimeError> {
        self.frame()?
            .closure
            .proto
            .constants
            .get(k as usize)
            .cloned()
            .ok_or(RuntimeError::Internal("constant out of range"))
    }

    fn global_name(&mut self) -> Result<String, RuntimeError> {
        let k = self.read_byte()?;
        match self.constant(k)? {
            Value::String(name) => Ok(name),
            _ => Err(RuntimeError::Internal("global name is not a string")),
        }
    }

    fn local_index(&mut self) -> Result<usize, RuntimeError> {
        let slot = self.read_byte()?;
        Ok(self.frame()?.base + slot as usize)
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack
            .pop()
            .ok_or(RuntimeError::Internal("stack underflow"))
    }

    fn peek(&self) -> Result<&Value, RuntimeError> {
        self.stack
            .last()
            .ok_or(RuntimeError::Internal("stack underflow"))
    }
}
