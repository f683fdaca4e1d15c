use log::{trace, warn};
use thiserror::Error;

use crate::{
    ast::{BinOp, Block, Chunk, Exp, Return, Stat, UnOp},
    lex::{Token, TokenKind},
};

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("{line}:{column}: expected {expected}, found `{found}`")]
    Expected {
        expected: String,
        found: String,
        line: u32,
        column: u32,
    },
    #[error("{line}:{column}: expected expression, found `{found}`")]
    ExpectedExpression {
        found: String,
        line: u32,
        column: u32,
    },
    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: String },
    #[error("{line}:{column}: invalid number `{text}`")]
    InvalidNumber { text: String, line: u32, column: u32 },
    #[error("{line}:{column}: `{what}` is not supported")]
    Unsupported { what: String, line: u32, column: u32 },
    #[error("{line}:{column}: nesting is too deep")]
    TooDeep { line: u32, column: u32 },
}

/// Expressions, blocks and calls may nest this deep before parsing fails.
pub const MAX_DEPTH: usize = 200;

/// Binding power of infix operators, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Assign,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
}

#[derive(Debug, Clone, Copy)]
enum Infix {
    Call,
    And,
    Or,
    Binary(BinOp),
}

fn infix_rule(kind: TokenKind) -> Option<(Precedence, Infix)> {
    let rule = match kind {
        TokenKind::ParL => (Precedence::Call, Infix::Call),
        TokenKind::Or => (Precedence::Or, Infix::Or),
        TokenKind::And => (Precedence::And, Infix::And),
        TokenKind::Equal => (Precedence::Equality, Infix::Binary(BinOp::Equal)),
        TokenKind::NotEq => (Precedence::Equality, Infix::Binary(BinOp::NotEq)),
        TokenKind::Less => (Precedence::Comparison, Infix::Binary(BinOp::Less)),
        TokenKind::LesEq => (Precedence::Comparison, Infix::Binary(BinOp::LesEq)),
        TokenKind::Greater => (Precedence::Comparison, Infix::Binary(BinOp::Greater)),
        TokenKind::GreEq => (Precedence::Comparison, Infix::Binary(BinOp::GreEq)),
        TokenKind::Add => (Precedence::Term, Infix::Binary(BinOp::Add)),
        TokenKind::Sub => (Precedence::Term, Infix::Binary(BinOp::Sub)),
        TokenKind::Mul => (Precedence::Factor, Infix::Binary(BinOp::Mul)),
        TokenKind::Div => (Precedence::Factor, Infix::Binary(BinOp::Div)),
        _ => return None,
    };
    Some(rule)
}

pub fn parse(tokens: Vec<Token>) -> Result<Chunk, ParseError> {
    trace!("parsing {} tokens", tokens.len());
    Parser::new(tokens).chunk()
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    pub fn chunk(mut self) -> Result<Chunk, ParseError> {
        let block = self.block()?;
        if let Some(t) = self.peek() {
            return Err(expected("end of input", t));
        }
        Ok(Chunk { block })
    }

    // block ::= {stat} [retstat]
    fn block(&mut self) -> Result<Block, ParseError> {
        let mut block = Block::default();
        let mut dead = 0;
        loop {
            match self.peek_kind() {
                None | Some(TokenKind::End | TokenKind::Else | TokenKind::Elseif) => break,
                Some(TokenKind::SemiColon) => {
                    self.advance();
                }
                Some(TokenKind::Return) => {
                    let ret = self.ret_stat()?;
                    if block.ret.is_none() {
                        block.ret = Some(ret);
                    } else {
                        dead += 1;
                    }
                }
                Some(_) => {
                    let stat = self.stat()?;
                    if block.ret.is_none() {
                        block.stats.push(stat);
                    } else {
                        dead += 1;
                    }
                }
            }
        }
        if dead > 0 {
            warn!("dropping {dead} unreachable statement(s) after `return`");
        }
        Ok(block)
    }

    fn ret_stat(&mut self) -> Result<Return, ParseError> {
        self.expect(TokenKind::Return)?;
        let value = match self.peek_kind() {
            None
            | Some(
                TokenKind::End | TokenKind::Else | TokenKind::Elseif | TokenKind::SemiColon,
            ) => None,
            Some(_) => Some(self.exp()?),
        };
        Ok(Return { value })
    }

    fn stat(&mut self) -> Result<Stat, ParseError> {
        let Some(t) = self.peek().cloned() else {
            return Err(eof("statement"));
        };
        match t.kind {
            TokenKind::Do => {
                self.advance();
                self.enter(&t)?;
                let block = self.block()?;
                self.expect(TokenKind::End)?;
                self.depth -= 1;
                Ok(Stat::Block(block))
            }
            TokenKind::Local => {
                self.advance();
                let name = self.expect(TokenKind::Name)?.source;
                self.expect(TokenKind::Assign)?;
                let value = self.exp()?;
                Ok(Stat::Local { name, value })
            }
            TokenKind::If => {
                self.advance();
                self.if_stat(&t)
            }
            TokenKind::Function => {
                self.enter(&t)?;
                let stat = self.function_stat()?;
                self.depth -= 1;
                Ok(stat)
            }
            TokenKind::Print => {
                self.advance();
                self.expect(TokenKind::ParL)?;
                let value = self.exp()?;
                self.expect(TokenKind::ParR)?;
                Ok(Stat::Print(value))
            }
            TokenKind::Name if self.peek_nth(1) == Some(TokenKind::Assign) => {
                let name = self.expect(TokenKind::Name)?.source;
                self.expect(TokenKind::Assign)?;
                let value = self.exp()?;
                Ok(Stat::Assign { name, value })
            }
            TokenKind::Goto | TokenKind::Break => Err(ParseError::Unsupported {
                what: t.source,
                line: t.line,
                column: t.column,
            }),
            _ => Ok(Stat::Exp(self.exp()?)),
        }
    }

    // the leading `if` or `elseif` is already consumed
    fn if_stat(&mut self, at: &Token) -> Result<Stat, ParseError> {
        self.enter(at)?;
        let cond = self.exp_prec(Precedence::Assign)?;
        self.expect(TokenKind::Then)?;
        let then = self.block()?;
        let els = match self.peek_kind() {
            Some(TokenKind::Elseif) => {
                let at = self.advance().ok_or_else(|| eof("`elseif`"))?;
                let nested = self.if_stat(&at)?;
                Some(Block {
                    stats: vec![nested],
                    ret: None,
                })
            }
            Some(TokenKind::Else) => {
                self.advance();
                let block = self.block()?;
                self.expect(TokenKind::End)?;
                Some(block)
            }
            _ => {
                self.expect(TokenKind::End)?;
                None
            }
        };
        self.depth -= 1;
        Ok(Stat::If { cond, then, els })
    }

    fn function_stat(&mut self) -> Result<Stat, ParseError> {
        self.expect(TokenKind::Function)?;
        let name = self.expect(TokenKind::Name)?.source;
        self.expect(TokenKind::ParL)?;
        let mut params = Vec::new();
        if self.peek_kind() != Some(TokenKind::ParR) {
            loop {
                params.push(self.expect(TokenKind::Name)?.source);
                if self.peek_kind() != Some(TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }
        self.expect(TokenKind::ParR)?;
        let body = self.block()?;
        self.expect(TokenKind::End)?;
        Ok(Stat::Function { name, params, body })
    }

    fn exp(&mut self) -> Result<Exp, ParseError> {
        self.exp_prec(Precedence::Assign)
    }

    // The right operand of an infix operator is parsed at the operator's
    // own level, so `2 * 3 / 4` groups as `2 * (3 / 4)`.
    fn exp_prec(&mut self, min: Precedence) -> Result<Exp, ParseError> {
        let t = self.advance().ok_or_else(|| eof("expression"))?;
        self.enter(&t)?;
        let mut exp = self.prefix(t)?;
        let mut nested = 1;
        while let Some(t) = self.peek().cloned() {
            let Some((prec, rule)) = infix_rule(t.kind) else {
                break;
            };
            if prec < min {
                break;
            }
            // `f()()()` nests without recursing; right operands are
            // counted by their own `exp_prec`
            if let Infix::Call = rule {
                self.enter(&t)?;
                nested += 1;
            }
            self.advance();
            exp = self.infix(rule, prec, exp)?;
        }
        self.depth -= nested;
        Ok(exp)
    }

    fn prefix(&mut self, t: Token) -> Result<Exp, ParseError> {
        let exp = match t.kind {
            TokenKind::Nil => Exp::Nil,
            TokenKind::True => Exp::Bool(true),
            TokenKind::False => Exp::Bool(false),
            TokenKind::Number => match t.source.parse::<f64>() {
                Ok(n) => Exp::Number(n),
                Err(_) => {
                    return Err(ParseError::InvalidNumber {
                        text: t.source,
                        line: t.line,
                        column: t.column,
                    })
                }
            },
            TokenKind::String => Exp::String(t.source),
            TokenKind::Name => Exp::Name(t.source),
            TokenKind::Not => Exp::Unary(UnOp::Not, Box::new(self.exp_prec(Precedence::Unary)?)),
            TokenKind::Sub => Exp::Unary(UnOp::Neg, Box::new(self.exp_prec(Precedence::Unary)?)),
            TokenKind::ParL => {
                let exp = self.exp()?;
                self.expect(TokenKind::ParR)?;
                exp
            }
            _ => {
                return Err(ParseError::ExpectedExpression {
                    found: t.source,
                    line: t.line,
                    column: t.column,
                })
            }
        };
        Ok(exp)
    }

    fn infix(&mut self, rule: Infix, prec: Precedence, left: Exp) -> Result<Exp, ParseError> {
        let left = Box::new(left);
        let exp = match rule {
            Infix::Call => Exp::Call(left, self.args()?),
            Infix::And => Exp::And(left, Box::new(self.exp_prec(prec)?)),
            Infix::Or => Exp::Or(left, Box::new(self.exp_prec(prec)?)),
            Infix::Binary(op) => Exp::Binary(op, left, Box::new(self.exp_prec(prec)?)),
        };
        Ok(exp)
    }

    // the `(` is already consumed
    fn args(&mut self) -> Result<Vec<Exp>, ParseError> {
        let mut args = Vec::new();
        if self.peek_kind() != Some(TokenKind::ParR) {
            loop {
                args.push(self.exp()?);
                if self.peek_kind() != Some(TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }
        self.expect(TokenKind::ParR)?;
        Ok(args)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        match self.peek() {
            Some(t) if t.kind == kind => {}
            Some(t) => return Err(expected(&kind.to_string(), t)),
            None => return Err(eof(&kind.to_string())),
        }
        self.advance().ok_or_else(|| eof(&kind.to_string()))
    }

    fn enter(&mut self, at: &Token) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::TooDeep {
                line: at.line,
                column: at.column,
            });
        }
        Ok(())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn peek_nth(&self, n: usize) -> Option<TokenKind> {
        self.tokens.get(self.pos + n).map(|t| t.kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }
}

fn expected(what: &str, found: &Token) -> ParseError {
    ParseError::Expected {
        expected: what.to_string(),
        found: found.source.clone(),
        line: found.line,
        column: found.column,
    }
}

fn eof(what: &str) -> ParseError {
    ParseError::UnexpectedEof {
        expected: what.to_string(),
    }
}
