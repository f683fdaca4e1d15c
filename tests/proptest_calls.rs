//! Property-based tests for call frames and stack discipline.
//!
//! Every successful run must leave exactly the result on the stack (checked
//! by `common::exec`), and values the caller pushed before a call must be
//! intact after it returns.

mod common;

use common::{exec, num, ExeState, RuntimeError, Error};
use proptest::prelude::*;

/// `f0(a) = a`, `fi(a) = f{i-1}(a + locals_i) + 1`, each `fi` holding
/// `locals_i` extra locals, some of them in a nested block.
fn call_chain(locals: &[u8]) -> String {
    let mut source = String::from("function f0(a) return a end\n");
    for (i, &n) in locals.iter().enumerate() {
        let i = i + 1;
        source.push_str(&format!("function f{i}(a)\n"));
        let split = n / 2;
        for v in 0..split {
            source.push_str(&format!("  local v{v} = {v}\n"));
        }
        source.push_str("  do\n");
        for v in split..n {
            source.push_str(&format!("    local v{v} = {v}\n"));
        }
        source.push_str("  end\n");
        source.push_str(&format!("  return f{}(a + {n}) + 1\nend\n", i - 1));
    }
    source
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn nested_calls_keep_caller_values(
        locals in prop::collection::vec(0u8..6, 1..20),
        x in 0u16..1000,
    ) {
        let depth = locals.len();
        let mut source = call_chain(&locals);
        source.push_str(&format!("local x = {x}\nreturn 1000 + x * f{depth}(x)"));

        let sum: u32 = locals.iter().map(|&n| n as u32).sum();
        let x = x as f64;
        let expected = 1000.0 + x * (x + sum as f64 + depth as f64);
        let (result, _) = exec(&source);
        prop_assert_eq!(result.unwrap(), num(expected));
    }

    #[test]
    fn recursion_depth_under_limit(n in 0u16..150) {
        let source = format!(
            "function count(n) if n > 0 then return count(n - 1) + 1 end return 0 end
             return count({n})"
        );
        let (result, _) = exec(&source);
        prop_assert_eq!(result.unwrap(), num(n as f64));
    }

    #[test]
    fn recursion_past_limit_overflows(n in 250u16..400) {
        let source = format!(
            "function count(n) if n > 0 then return count(n - 1) + 1 end return 0 end
             return count({n})"
        );
        let (result, _) = exec(&source);
        prop_assert!(matches!(result, Err(Error::Runtime(RuntimeError::StackOverflow))));
    }

    #[test]
    fn vm_is_reusable_after_errors(n in 250u16..300) {
        let mut vm = ExeState::with_output(Vec::new());
        let deep = format!(
            "function count(n) if n > 0 then return count(n - 1) + 1 end return 0 end
             return count({n})"
        );
        prop_assert!(mint::interpret(&deep, &mut vm).is_err());
        prop_assert_eq!(mint::interpret("return count(10)", &mut vm).unwrap(), num(10.0));
        prop_assert_eq!(vm.stack_len(), 1);
    }
}
