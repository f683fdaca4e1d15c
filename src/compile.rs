use log::{debug, trace};
use thiserror::Error;

use crate::{
    ast::{BinOp, Block, Chunk, Exp, Return, Stat, UnOp},
    bytecode::{ByteCode, FuncProto},
    value::{Closure, Value},
};

/// Locals per function; slot 0 of a frame holds the callee itself.
pub const MAX_LOCALS: usize = 255;

#[derive(Debug, Error, PartialEq)]
pub enum CompileError {
    #[error("local `{0}` is already declared in this function")]
    DuplicateLocal(String),
    #[error("too many local variables in function `{0}`")]
    TooManyLocals(String),
    #[error("too many constants in function `{0}`")]
    TooManyConstants(String),
    #[error("too many arguments in call in function `{0}`")]
    TooManyArguments(String),
    #[error("jump too large in function `{0}`")]
    JumpTooLarge(String),
}

struct Local {
    name: String,
    depth: usize,
    slot: u8,
}

/// Compile state of one function under construction.
struct FuncState {
    proto: FuncProto,
    locals: Vec<Local>,
    depth: usize,
}

impl FuncState {
    fn new(name: &str) -> Self {
        Self {
            proto: FuncProto::new(name),
            locals: Vec::new(),
            depth: 0,
        }
    }
}

/// Compiles a chunk into the closure of its `main` function.
pub fn compile(chunk: &Chunk) -> Result<Closure, CompileError> {
    let mut compiler = Compiler {
        func: FuncState::new("main"),
    };
    compiler.body(&[], &chunk.block, true)?;
    debug!("compiled\n{}", compiler.func.proto.disassemble());
    Ok(Closure::new(compiler.func.proto))
}

struct Compiler {
    // the function being compiled; enclosing ones are held by the
    // callers of `function` until the nested one is finished
    func: FuncState,
}

impl Compiler {
    // Function bodies never pop their locals: `Return` truncates the
    // stack back to the frame base. For the main chunk a trailing
    // expression statement becomes the result.
    fn body(&mut self, params: &[String], block: &Block, keep_last: bool) -> Result<(), CompileError> {
        self.begin_scope();
        for p in params {
            self.declare_local(p)?;
        }

        let (stats, last) = match block.stats.split_last() {
            Some((Stat::Exp(e), rest)) if keep_last && block.ret.is_none() => (rest, Some(e)),
            _ => (block.stats.as_slice(), None),
        };
        for stat in stats {
            self.stat(stat)?;
        }
        match (&block.ret, last) {
            (Some(ret), _) => self.ret(ret)?,
            (None, Some(e)) => {
                self.exp(e)?;
                self.emit(ByteCode::Return);
            }
            (None, None) => {
                self.emit(ByteCode::LoadNil);
                self.emit(ByteCode::Return);
            }
        }
        Ok(())
    }

    fn block(&mut self, block: &Block) -> Result<(), CompileError> {
        self.begin_scope();
        for stat in &block.stats {
            self.stat(stat)?;
        }
        if let Some(ret) = &block.ret {
            self.ret(ret)?;
        }
        self.end_scope();
        Ok(())
    }

    fn stat(&mut self, stat: &Stat) -> Result<(), CompileError> {
        trace!("stat: {stat:?}");
        match stat {
            Stat::Block(block) => self.block(block)?,
            Stat::Print(e) => {
                self.exp(e)?;
                self.emit(ByteCode::Print);
            }
            Stat::Local { name, value } => {
                // initializer first: `local x = x` reads the outer `x`
                self.exp(value)?;
                let slot = self.declare_local(name)?;
                self.emit_arg(ByteCode::SetLocal, slot);
            }
            Stat::Assign { name, value } => {
                self.exp(value)?;
                match self.resolve_local(name) {
                    Some(slot) => {
                        self.emit_arg(ByteCode::SetLocal, slot);
                        self.emit(ByteCode::Pop);
                    }
                    None => {
                        let k = self.add_const(Value::String(name.clone()))?;
                        self.emit_arg(ByteCode::SetGlobal, k);
                    }
                }
            }
            Stat::Function { name, params, body } => self.function(name, params, body)?,
            Stat::If { cond, then, els } => {
                self.exp(cond)?;
                let else_jump = self.emit_jump(ByteCode::JumpIfFalse);
                self.emit(ByteCode::Pop);
                self.block(then)?;
                let end_jump = self.emit_jump(ByteCode::Jump);
                self.patch_jump(else_jump)?;
                self.emit(ByteCode::Pop);
                if let Some(els) = els {
                    self.block(els)?;
                }
                self.patch_jump(end_jump)?;
            }
            Stat::Exp(e) => {
                self.exp(e)?;
                self.emit(ByteCode::Pop);
            }
        }
        Ok(())
    }

    fn function(&mut self, name: &str, params: &[String], body: &Block) -> Result<(), CompileError> {
        let enclosing = std::mem::replace(&mut self.func, FuncState::new(name));
        let compiled = self.body(params, body, false);
        let inner = std::mem::replace(&mut self.func, enclosing);
        compiled?;
        debug!("compiled\n{}", inner.proto.disassemble());
        let mut proto = inner.proto;
        proto.arity = params.len() as u8;

        let k = self.add_const(Value::Function(Closure::new(proto)))?;
        self.emit_arg(ByteCode::Closure, k);
        let n = self.add_const(Value::String(name.to_string()))?;
        self.emit_arg(ByteCode::SetGlobal, n);
        Ok(())
    }

    fn ret(&mut self, ret: &Return) -> Result<(), CompileError> {
        match &ret.value {
            Some(e) => self.exp(e)?,
            None => self.emit(ByteCode::LoadNil),
        }
        self.emit(ByteCode::Return);
        Ok(())
    }

    fn exp(&mut self, exp: &Exp) -> Result<(), CompileError> {
        match exp {
            Exp::Nil => self.emit(ByteCode::LoadNil),
            Exp::Bool(b) => self.load_const(Value::Boolean(*b))?,
            Exp::Number(n) => self.load_const(Value::Number(*n))?,
            Exp::String(s) => self.load_const(Value::String(s.clone()))?,
            Exp::Name(name) => match self.resolve_local(name) {
                Some(slot) => self.emit_arg(ByteCode::GetLocal, slot),
                None => {
                    let k = self.add_const(Value::String(name.clone()))?;
                    self.emit_arg(ByteCode::GetGlobal, k);
                }
            },
            Exp::Binary(op, left, right) => {
                self.exp(left)?;
                self.exp(right)?;
                self.binop(*op);
            }
            Exp::Unary(op, e) => {
                self.exp(e)?;
                self.emit(match op {
                    UnOp::Not => ByteCode::Not,
                    UnOp::Neg => ByteCode::Negate,
                });
            }
            Exp::And(left, right) => self.logic(ByteCode::And, left, right)?,
            Exp::Or(left, right) => self.logic(ByteCode::Or, left, right)?,
            Exp::Call(callee, args) => {
                self.exp(callee)?;
                for arg in args {
                    self.exp(arg)?;
                }
                let argc = u8::try_from(args.len())
                    .map_err(|_| CompileError::TooManyArguments(self.func.proto.name.clone()))?;
                self.emit_arg(ByteCode::Call, argc);
            }
        }
        Ok(())
    }

    // `~=`, `>=` and `<=` are the negations of `==`, `<` and `>`
    fn binop(&mut self, op: BinOp) {
        let (code, negate) = match op {
            BinOp::Add => (ByteCode::Add, false),
            BinOp::Sub => (ByteCode::Subtract, false),
            BinOp::Mul => (ByteCode::Multiply, false),
            BinOp::Div => (ByteCode::Divide, false),
            BinOp::Equal => (ByteCode::Equal, false),
            BinOp::NotEq => (ByteCode::Equal, true),
            BinOp::Greater => (ByteCode::Greater, false),
            BinOp::GreEq => (ByteCode::Less, true),
            BinOp::Less => (ByteCode::Less, false),
            BinOp::LesEq => (ByteCode::Greater, true),
        };
        self.emit(code);
        if negate {
            self.emit(ByteCode::Not);
        }
    }

    // The jump keeps the left value when it decides the result,
    // otherwise the VM pops it and the right side runs.
    fn logic(&mut self, code: ByteCode, left: &Exp, right: &Exp) -> Result<(), CompileError> {
        self.exp(left)?;
        let jump = self.emit_jump(code);
        self.exp(right)?;
        self.patch_jump(jump)
    }

    fn begin_scope(&mut self) {
        self.func.depth += 1;
    }

    fn end_scope(&mut self) {
        let f = &mut self.func;
        f.depth -= 1;
        let mut pops = 0;
        while f.locals.last().is_some_and(|l| l.depth > f.depth) {
            f.locals.pop();
            pops += 1;
        }
        for _ in 0..pops {
            self.emit(ByteCode::Pop);
        }
    }

    fn declare_local(&mut self, name: &str) -> Result<u8, CompileError> {
        let f = &mut self.func;
        if f.locals.iter().any(|l| l.name == name) {
            return Err(CompileError::DuplicateLocal(name.to_string()));
        }
        if f.locals.len() >= MAX_LOCALS {
            return Err(CompileError::TooManyLocals(f.proto.name.clone()));
        }
        let slot = f.locals.len() as u8 + 1;
        f.locals.push(Local {
            name: name.to_string(),
            depth: f.depth,
            slot,
        });
        Ok(slot)
    }

    fn resolve_local(&self, name: &str) -> Option<u8> {
        self.func
            .locals
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.slot)
    }

    fn add_const(&mut self, c: Value) -> Result<u8, CompileError> {
        let f = &mut self.func;
        f.proto
            .add_const(c)
            .ok_or_else(|| CompileError::TooManyConstants(f.proto.name.clone()))
    }

    fn load_const(&mut self, c: Value) -> Result<(), CompileError> {
        let k = self.add_const(c)?;
        self.emit_arg(ByteCode::LoadConstant, k);
        Ok(())
    }

    fn emit(&mut self, code: ByteCode) {
        self.func.proto.write(code);
    }

    fn emit_arg(&mut self, code: ByteCode, arg: u8) {
        let proto = &mut self.func.proto;
        proto.write(code);
        proto.write_byte(arg);
    }

    // returns the position of the placeholder operand
    fn emit_jump(&mut self, code: ByteCode) -> usize {
        let proto = &mut self.func.proto;
        proto.write(code);
        proto.write_byte(0xff);
        proto.write_byte(0xff);
        proto.code.len() - 2
    }

    fn patch_jump(&mut self, at: usize) -> Result<(), CompileError> {
        let proto = &mut self.func.proto;
        let jump = i16::try_from(proto.code.len() - at - 2)
            .map_err(|_| CompileError::JumpTooLarge(proto.name.clone()))?;
        let [hi, lo] = jump.to_be_bytes();
        proto.code[at] = hi;
        proto.code[at + 1] = lo;
        Ok(())
    }
}
