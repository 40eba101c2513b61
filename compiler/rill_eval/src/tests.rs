//! End-to-end evaluation scenarios.

use crate::{compile_and_eval, EvalError};
use pretty_assertions::assert_eq;

fn eval_expr(expr: &str) -> (String, String) {
    let source = format!("module []\nmain = {expr}\n");
    let (_, result) = compile_and_eval(&source);
    match result {
        Ok(evaluated) => (evaluated.rendered, evaluated.type_rendered),
        Err(error) => panic!("evaluation of `{expr}` failed: {error}"),
    }
}

fn eval_module(source: &str) -> Result<crate::Evaluated, EvalError> {
    let (_, result) = compile_and_eval(source);
    result
}

#[test]
fn addition() {
    let (value, ty) = eval_expr("1 + 2");
    assert_eq!(value, "3");
    assert_eq!(ty, "Num(*)");
}

#[test]
fn if_with_comparison() {
    let (value, ty) = eval_expr("if 1 == 1 42 else 99");
    assert_eq!(value, "42");
    assert_eq!(ty, "Num(*)");
}

#[test]
fn immediate_lambda_call() {
    let (value, ty) = eval_expr("(|x, y| x + y)(3, 4)");
    assert_eq!(value, "7");
    assert_eq!(ty, "Num(*)");
}

#[test]
fn record_field_access() {
    let (value, ty) = eval_expr("{x: 10, y: 20}.y");
    assert_eq!(value, "20");
    assert_eq!(ty, "Num(*)");
}

#[test]
fn closure_capture() {
    let (value, _) = eval_expr("((|a| |b| a * b)(5))(10)");
    assert_eq!(value, "50");
}

#[test]
fn heterogeneous_list_crashes_when_run() {
    let result = eval_module("module []\nmain = [1, \"hello\"]\n");
    assert!(matches!(result, Err(EvalError::Crash(_))));
}

#[test]
fn arithmetic_precedence() {
    let (value, _) = eval_expr("2 + 3 * 4");
    assert_eq!(value, "14");
}

#[test]
fn unary_minus() {
    let (value, _) = eval_expr("-(3 + 4)");
    assert_eq!(value, "-7");
}

#[test]
fn integer_division_by_zero() {
    let result = eval_module("module []\nmain = 1 // 0\n");
    assert_eq!(result.err(), Some(EvalError::DivisionByZero));
}

#[test]
fn truncating_division_and_remainder() {
    let (value, _) = eval_expr("7 // 2");
    assert_eq!(value, "3");
    let (value, _) = eval_expr("7 % 2");
    assert_eq!(value, "1");
}

#[test]
fn fractional_division_defaults_to_dec() {
    let (value, ty) = eval_expr("1.0 / 4.0");
    assert_eq!(value, "0.25");
    assert_eq!(ty, "Frac(*)");
}

#[test]
fn dec_multiplication() {
    let (value, _) = eval_expr("2.5 * 4.0");
    assert_eq!(value, "10");
}

#[test]
fn booleans_and_short_circuit() {
    let (value, _) = eval_expr("True and False");
    assert_eq!(value, "False");
    let (value, _) = eval_expr("False or True");
    assert_eq!(value, "True");
    // The right side of a short-circuited `and` never runs.
    let (value, _) = eval_expr("False and (1 // 0 == 0)");
    assert_eq!(value, "False");
}

#[test]
fn string_literal_and_interpolation() {
    let (value, ty) = eval_expr("\"hello\"");
    assert_eq!(value, "\"hello\"");
    assert_eq!(ty, "Str");

    let result = eval_module("module []\nname = \"world\"\nmain = \"hello ${name}!\"\n");
    let Ok(evaluated) = result else { panic!("interpolation failed") };
    assert_eq!(evaluated.rendered, "\"hello world!\"");
}

#[test]
fn string_equality_is_by_content() {
    let (value, _) = eval_expr("\"ab\" == \"ab\"");
    assert_eq!(value, "True");
    let (value, _) = eval_expr("\"ab\" == \"cd\"");
    assert_eq!(value, "False");
}

#[test]
fn tuples_and_access() {
    let (value, _) = eval_expr("(1, 2, 3).2");
    assert_eq!(value, "3");
    let (value, _) = eval_expr("(1, \"two\")");
    assert_eq!(value, "(1, \"two\")");
}

#[test]
fn nested_records() {
    let (value, _) = eval_expr("{a: {b: 5}}.a.b");
    assert_eq!(value, "5");
}

#[test]
fn blocks_bind_sequentially() {
    let source = "module []\nmain = {\n    a = 2\n    b = a + 3\n    a * b\n}\n";
    let Ok(evaluated) = eval_module(source) else { panic!("block failed") };
    assert_eq!(evaluated.rendered, "10");
}

#[test]
fn top_level_defs_reference_each_other() {
    let source = "module []\ndouble = |x| x + x\nmain = double(21)\n";
    let Ok(evaluated) = eval_module(source) else { panic!("call failed") };
    assert_eq!(evaluated.rendered, "42");
}

#[test]
fn recursion_through_top_level() {
    let source = "module []\n\
                  fact = |n| if n == 0 1 else n * fact(n - 1)\n\
                  main = fact(10)\n";
    let Ok(evaluated) = eval_module(source) else { panic!("recursion failed") };
    assert_eq!(evaluated.rendered, "3628800");
}

#[test]
fn match_on_integers() {
    let source = "module []\n\
                  describe = |n| match n {\n    0 => \"zero\",\n    1 | 2 => \"small\",\n    _ => \"big\"\n}\n\
                  main = (describe(0), describe(2), describe(9))\n";
    let Ok(evaluated) = eval_module(source) else { panic!("match failed") };
    assert_eq!(evaluated.rendered, "(\"zero\", \"small\", \"big\")");
}

#[test]
fn match_on_tags_with_payload() {
    let source = "module []\n\
                  area = |shape| match shape {\n    Circle(r) => r * r * 3,\n    Square(s) => s * s\n}\n\
                  main = area(Square(5)) + area(Circle(2))\n";
    let Ok(evaluated) = eval_module(source) else { panic!("tag match failed") };
    assert_eq!(evaluated.rendered, "37");
}

#[test]
fn record_destructure_in_parameter() {
    let source = "module []\nget = |{x, y}| x + y\nmain = get({x: 4, y: 6})\n";
    let Ok(evaluated) = eval_module(source) else { panic!("destructure failed") };
    assert_eq!(evaluated.rendered, "10");
}

#[test]
fn tuple_destructure_in_let() {
    let source = "module []\nmain = {\n    (a, b) = (3, 4)\n    a * b\n}\n";
    let Ok(evaluated) = eval_module(source) else { panic!("destructure failed") };
    assert_eq!(evaluated.rendered, "12");
}

#[test]
fn crash_reports_its_message() {
    let result = eval_module("module []\nmain = crash \"boom\"\n");
    assert_eq!(result.err(), Some(EvalError::Crash("boom".to_owned())));
}

#[test]
fn crash_leaves_module_state_usable() {
    let source = "module []\nboom = |x| crash \"nope\"\nmain = 1\n";
    // `main` is the last def; `boom` is a closure value that never runs.
    let Ok(evaluated) = eval_module(source) else { panic!("module failed") };
    assert_eq!(evaluated.rendered, "1");
}

#[test]
fn expect_failure_crashes() {
    let source = "module []\nmain = {\n    expect 1 == 2\n    0\n}\n";
    assert!(matches!(eval_module(source), Err(EvalError::Crash(_))));
}

#[test]
fn pizza_pipeline() {
    let source = "module []\ninc = |x| x + 1\ndouble = |x| x + x\nmain = 5 |> inc |> double\n";
    let Ok(evaluated) = eval_module(source) else { panic!("pipeline failed") };
    assert_eq!(evaluated.rendered, "12");
}

#[test]
fn evaluation_is_deterministic() {
    let source = "module []\nmain = (|a| |b| a * b)(6)(7)\n";
    let Ok(first) = eval_module(source) else { panic!("eval failed") };
    let Ok(second) = eval_module(source) else { panic!("eval failed") };
    assert_eq!(first.bytes, second.bytes);
    assert_eq!(first.rendered, "42");
}

#[test]
fn annotated_u8_arithmetic_wraps_at_its_precision() {
    let source = "module []\nx : U8\nx = 200\nmain = x + x\n";
    let Ok(evaluated) = eval_module(source) else { panic!("u8 math failed") };
    // 400 truncated to 8 bits.
    assert_eq!(evaluated.rendered, "144");
}

#[test]
fn deep_expression_nesting_does_not_recurse_host_stack() {
    // 40k nested additions would blow a recursive evaluator's stack.
    let mut expr = String::from("1");
    for _ in 0..40_000 {
        expr.push_str(" + 1");
    }
    let source = format!("module []\nmain = {expr}\n");
    let Ok(evaluated) = eval_module(&source) else { panic!("deep nesting failed") };
    assert_eq!(evaluated.rendered, "40001");
}

#[test]
fn runaway_recursion_is_a_stack_overflow() {
    let source = "module []\nloop_forever = |n| loop_forever(n + 1)\nmain = loop_forever(0)\n";
    assert_eq!(eval_module(source).err(), Some(EvalError::StackOverflow));
}
