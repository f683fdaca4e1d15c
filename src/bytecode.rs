use std::fmt::Write;

use crate::value::Value;

/// One-byte opcodes. Operand bytes follow the opcode in the code stream:
/// constant index, local slot or argument count take one byte, jump
/// offsets take two (big-endian, signed, relative to the next instruction).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ByteCode {
    Return,
    LoadConstant,
    LoadNil,
    Add,
    Subtract,
    Multiply,
    Divide,
    Negate,
    Not,
    Equal,
    Greater,
    Less,
    GetGlobal,
    SetGlobal,
    GetLocal,
    SetLocal,
    Jump,
    JumpIfFalse,
    And,
    Or,
    Closure,
    Call,
    Print,
    Pop,
}

const ALL: [ByteCode; 24] = [
    ByteCode::Return,
    ByteCode::LoadConstant,
    ByteCode::LoadNil,
    ByteCode::Add,
    ByteCode::Subtract,
    ByteCode::Multiply,
    ByteCode::Divide,
    ByteCode::Negate,
    ByteCode::Not,
    ByteCode::Equal,
    ByteCode::Greater,
    ByteCode::Less,
    ByteCode::GetGlobal,
    ByteCode::SetGlobal,
    ByteCode::GetLocal,
    ByteCode::SetLocal,
    ByteCode::Jump,
    ByteCode::JumpIfFalse,
    ByteCode::And,
    ByteCode::Or,
    ByteCode::Closure,
    ByteCode::Call,
    ByteCode::Print,
    ByteCode::Pop,
];

impl TryFrom<u8> for ByteCode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        ALL.get(byte as usize).copied().ok_or(byte)
    }
}

impl ByteCode {
    /// Number of operand bytes following the opcode.
    pub fn operand_len(self) -> usize {
        match self {
            Self::LoadConstant
            | Self::GetGlobal
            | Self::SetGlobal
            | Self::Closure
            | Self::GetLocal
            | Self::SetLocal
            | Self::Call => 1,
            Self::Jump | Self::JumpIfFalse | Self::And | Self::Or => 2,
            _ => 0,
        }
    }
}

/// A compiled function: constants and code, read-only once finished.
#[derive(Debug, Default)]
pub struct FuncProto {
    pub name: String,
    pub arity: u8,
    pub constants: Vec<Value>,
    pub code: Vec<u8>,
}

impl FuncProto {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Adds a constant, reusing an equal existing entry.
    ///
    /// Returns `None` once the pool would exceed 256 entries.
    pub fn add_const(&mut self, c: Value) -> Option<u8> {
        if let Some(i) = self.constants.iter().position(|v| v == &c) {
            return Some(i as u8);
        }
        let i = self.constants.len();
        let i = u8::try_from(i).ok()?;
        self.constants.push(c);
        Some(i)
    }

    pub fn write(&mut self, code: ByteCode) {
        self.code.push(code as u8);
    }

    pub fn write_byte(&mut self, byte: u8) {
        self.code.push(byte);
    }

    /// Reads the signed jump offset stored at `at`.
    pub fn read_offset(&self, at: usize) -> i16 {
        i16::from_be_bytes([self.code[at], self.code[at + 1]])
    }

    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "== {} ==", self.name);

        let mut ip = 0;
        while ip < self.code.len() {
            let Ok(code) = ByteCode::try_from(self.code[ip]) else {
                let _ = writeln!(out, "{ip:04x} <unknown {}>", self.code[ip]);
                ip += 1;
                continue;
            };
            if ip + code.operand_len() >= self.code.len() {
                let _ = writeln!(out, "{ip:04x} {code:?} <truncated>");
                break;
            }
            let name = format!("{code:?}");
            let _ = match code {
                ByteCode::LoadConstant
                | ByteCode::GetGlobal
                | ByteCode::SetGlobal
                | ByteCode::Closure => {
                    let idx = self.code[ip + 1];
                    match self.constants.get(idx as usize) {
                        Some(c) => writeln!(out, "{ip:04x} {name:<16} {idx:4} '{c}'"),
                        None => writeln!(out, "{ip:04x} {name:<16} {idx:4} <missing>"),
                    }
                }
                ByteCode::GetLocal | ByteCode::SetLocal | ByteCode::Call => {
                    writeln!(out, "{ip:04x} {name:<16} {:4}", self.code[ip + 1])
                }
                ByteCode::Jump | ByteCode::JumpIfFalse | ByteCode::And | ByteCode::Or => {
                    let to = ip as isize + 3 + self.read_offset(ip + 1) as isize;
                    writeln!(out, "{ip:04x} {name:<16} {ip:04x} -> {to:04x}")
                }
                _ => writeln!(out, "{ip:04x} {name}"),
            };
            ip += 1 + code.operand_len();
        }

        for c in &self.constants {
            if let Value::Function(f) = c {
                out.push('\n');
                out.push_str(&f.proto.disassemble());
            }
        }
        out
    }
}
