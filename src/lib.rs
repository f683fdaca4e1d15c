pub mod ast;
pub mod bytecode;
pub mod compile;
pub mod lex;
pub mod parse;
pub mod value;
pub mod vm;

use std::io::Write;

use log::trace;
use thiserror::Error;

use crate::{
    ast::Chunk,
    compile::CompileError,
    lex::LexError,
    parse::ParseError,
    value::{Closure, Value},
    vm::{ExeState, RuntimeError},
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

pub fn parse(source: &str) -> Result<Chunk, Error> {
    trace!("lexing {source:?}");
    let tokens = lex::lex(source)?;
    trace!("parsing {} tokens", tokens.len());
    Ok(parse::parse(tokens)?)
}

/// Compiles `source` into the closure of its main chunk.
pub fn compile(source: &str) -> Result<Closure, Error> {
    let chunk = parse(source)?;
    trace!("compiling {chunk:?}");
    Ok(compile::compile(&chunk)?)
}

/// Compiles and runs `source` on `vm`, so globals and the print sink are
/// the caller's.
pub fn interpret<W: Write>(source: &str, vm: &mut ExeState<W>) -> Result<Value, Error> {
    let main = compile(source)?;
    trace!("executing `{}`", main.proto.name);
    Ok(vm.execute(&main)?)
}

/// Runs `source` on a fresh VM printing to stdout.
pub fn run(source: &str) -> Result<Value, Error> {
    interpret(source, &mut ExeState::new())
}
