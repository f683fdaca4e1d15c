//! Property-based tests for arithmetic evaluation.
//!
//! Random expression trees are rendered fully parenthesized, run through the
//! whole pipeline and compared against the same tree folded in Rust.

mod common;

use common::{eval, num, Value};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Arith {
    Num(u16),
    Neg(Box<Arith>),
    Bin(char, Box<Arith>, Box<Arith>),
}

impl Arith {
    fn source(&self) -> String {
        match self {
            Arith::Num(n) => n.to_string(),
            Arith::Neg(e) => format!("-({})", e.source()),
            Arith::Bin(op, l, r) => format!("({} {op} {})", l.source(), r.source()),
        }
    }

    fn fold(&self) -> f64 {
        match self {
            Arith::Num(n) => *n as f64,
            Arith::Neg(e) => -e.fold(),
            Arith::Bin('+', l, r) => l.fold() + r.fold(),
            Arith::Bin('-', l, r) => l.fold() - r.fold(),
            Arith::Bin(_, l, r) => l.fold() * r.fold(),
        }
    }
}

fn arb_arith() -> impl Strategy<Value = Arith> {
    let leaf = (0u16..1000).prop_map(Arith::Num);
    leaf.prop_recursive(4, 32, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(|e| Arith::Neg(Box::new(e))),
            (prop::sample::select(vec!['+', '-', '*']), inner.clone(), inner)
                .prop_map(|(op, l, r)| Arith::Bin(op, Box::new(l), Box::new(r))),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn parenthesized_tree_matches_fold(e in arb_arith()) {
        let source = e.source();
        prop_assert_eq!(eval(&source).unwrap(), num(e.fold()), "source: {}", source);
    }

    /// `*` and `/` bind tighter than `+` and `-`.
    #[test]
    fn multiplication_binds_tighter(a in 0u16..1000, b in 0u16..1000, c in 1u16..1000) {
        let (a, b, c) = (a as f64, b as f64, c as f64);
        prop_assert_eq!(eval(&format!("{a} + {b} * {c}")).unwrap(), num(a + b * c));
        prop_assert_eq!(eval(&format!("{a} * {b} - {c}")).unwrap(), num(a * b - c));
        prop_assert_eq!(eval(&format!("{a} - {b} / {c}")).unwrap(), num(a - b / c));
    }

    #[test]
    fn comparisons_agree_with_f64(a in -500i32..500, b in -500i32..500) {
        let (x, y) = (a as f64, b as f64);
        let cases = [
            ("<", x < y),
            (">", x > y),
            ("<=", x <= y),
            (">=", x >= y),
            ("==", x == y),
            ("~=", x != y),
        ];
        for (op, expected) in cases {
            let source = format!("({a}) {op} ({b})");
            prop_assert_eq!(eval(&source).unwrap(), Value::Boolean(expected), "source: {}", source);
        }
    }

    #[test]
    fn numbers_print_like_rust(n in -100000i32..100000, frac in 0u8..100) {
        let value = n as f64 + frac as f64 / 100.0;
        let (result, out) = common::exec(&format!("print({value})"));
        prop_assert!(result.is_ok());
        prop_assert_eq!(out, format!("{value}\n"));
    }
}
