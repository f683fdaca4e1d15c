//! Syntax tree produced by the parser and consumed by the compiler.

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub block: Block,
}

/// Statements in order plus the block's (single) trailing return.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub stats: Vec<Stat>,
    pub ret: Option<Return>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Return {
    pub value: Option<Exp>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stat {
    Block(Block),
    Print(Exp),
    Local {
        name: String,
        value: Exp,
    },
    Assign {
        name: String,
        value: Exp,
    },
    Function {
        name: String,
        params: Vec<String>,
        body: Block,
    },
    If {
        cond: Exp,
        then: Block,
        els: Option<Block>,
    },
    Exp(Exp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Equal,
    NotEq,
    Greater,
    GreEq,
    Less,
    LesEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Exp {
    Nil,
    Bool(bool),
    Number(f64),
    String(String),
    Name(String),
    Binary(BinOp, Box<Exp>, Box<Exp>),
    Unary(UnOp, Box<Exp>),
    // kept apart from `Binary`: the right side is evaluated lazily
    And(Box<Exp>, Box<Exp>),
    Or(Box<Exp>, Box<Exp>),
    Call(Box<Exp>, Vec<Exp>),
}

impl Exp {
    pub fn binary(op: BinOp, left: Exp, right: Exp) -> Self {
        Self::Binary(op, Box::new(left), Box::new(right))
    }
}
