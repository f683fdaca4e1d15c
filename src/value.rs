use std::{fmt, rc::Rc};

use crate::{bytecode::FuncProto, vm::RuntimeError};

/// A function value. Holds no upvalues: nested functions only see globals.
#[derive(Clone)]
pub struct Closure {
    pub proto: Rc<FuncProto>,
}

impl Closure {
    pub fn new(proto: FuncProto) -> Self {
        Self {
            proto: Rc::new(proto),
        }
    }
}

#[derive(Clone)]
pub enum Value {
    Nil,
    Boolean(bool),
    Number(f64),
    String(String),
    Function(Closure),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Function(_) => "function",
        }
    }

    /// Only `nil` and `false` are falsey; `0` is truthy.
    pub fn is_falsey(&self) -> bool {
        matches!(self, Self::Nil | Self::Boolean(false))
    }

    pub fn add(&self, other: &Value) -> Result<Value, RuntimeError> {
        let (a, b) = self.numbers("+", other)?;
        Ok(Self::Number(a + b))
    }

    pub fn sub(&self, other: &Value) -> Result<Value, RuntimeError> {
        let (a, b) = self.numbers("-", other)?;
        Ok(Self::Number(a - b))
    }

    pub fn mul(&self, other: &Value) -> Result<Value, RuntimeError> {
        let (a, b) = self.numbers("*", other)?;
        Ok(Self::Number(a * b))
    }

    pub fn div(&self, other: &Value) -> Result<Value, RuntimeError> {
        let (a, b) = self.numbers("/", other)?;
        Ok(Self::Number(a / b))
    }

    pub fn less(&self, other: &Value) -> Result<Value, RuntimeError> {
        let (a, b) = self.numbers("<", other)?;
        Ok(Self::Boolean(a < b))
    }

    pub fn greater(&self, other: &Value) -> Result<Value, RuntimeError> {
        let (a, b) = self.numbers(">", other)?;
        Ok(Self::Boolean(a > b))
    }

    /// Compares values of the same type; functions compare by identity.
    /// Mixing types is an error rather than `false`.
    pub fn equal(&self, other: &Value) -> Result<Value, RuntimeError> {
        if std::mem::discriminant(self) != std::mem::discriminant(other) {
            return Err(self.binary_error("==", other));
        }
        Ok(Self::Boolean(self == other))
    }

    pub fn not(&self) -> Result<Value, RuntimeError> {
        match self {
            Self::Nil => Ok(Self::Boolean(true)),
            Self::Boolean(b) => Ok(Self::Boolean(!b)),
            _ => Err(RuntimeError::UnaryType {
                op: "not",
                operand: self.type_name(),
            }),
        }
    }

    pub fn neg(&self) -> Result<Value, RuntimeError> {
        match self {
            Self::Number(n) => Ok(Self::Number(-n)),
            _ => Err(RuntimeError::UnaryType {
                op: "-",
                operand: self.type_name(),
            }),
        }
    }

    fn numbers(&self, op: &'static str, other: &Value) -> Result<(f64, f64), RuntimeError> {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => Ok((*a, *b)),
            _ => Err(self.binary_error(op, other)),
        }
    }

    fn binary_error(&self, op: &'static str, other: &Value) -> RuntimeError {
        RuntimeError::BinaryType {
            op,
            left: self.type_name(),
            right: other.type_name(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(&a.proto, &b.proto),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => write!(f, "nil"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Function(c) => write!(f, "function: {}", c.proto.name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => write!(f, "nil"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n:?}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Function(c) => write!(f, "function: {}", c.proto.name),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}
