//! Shared helpers for the integration tests.

#![allow(dead_code)]

pub use mint::value::Value;
pub use mint::vm::{ExeState, RuntimeError};
pub use mint::Error;

/// Runs `source` on a fresh VM, returning the result and everything printed.
pub fn exec(source: &str) -> (Result<Value, Error>, String) {
    let mut vm = ExeState::with_output(Vec::new());
    let result = mint::interpret(source, &mut vm);
    if result.is_ok() {
        assert_eq!(vm.stack_len(), 1, "residual stack after {source:?}");
    }
    let out = String::from_utf8(vm.output().clone()).expect("print output is utf-8");
    (result, out)
}

pub fn eval(source: &str) -> Result<Value, Error> {
    exec(source).0
}

pub fn num(n: f64) -> Value {
    Value::Number(n)
}

macro_rules! assert_eval {
    ($input:expr, $expected:expr) => {
        let result = common::eval($input);
        assert!(
            result.is_ok(),
            "Failed to evaluate '{}': {:?}",
            $input,
            result.as_ref().err()
        );
        assert_eq!(
            result.unwrap(),
            $expected,
            "Evaluation of '{}' did not match expected",
            $input
        );
    };
}

macro_rules! assert_eval_err {
    ($input:expr, $pattern:pat) => {
        let result = common::eval($input);
        assert!(
            matches!(result, Err($pattern)),
            "Expected {} for '{}' but got {:?}",
            stringify!($pattern),
            $input,
            result
        );
    };
}

pub(crate) use assert_eval;
pub(crate) use assert_eval_err;
