use crate::{canonicalize, CanonOutput};
use pretty_assertions::assert_eq;
use rill_ir::cir::{Binop, Expr, Pattern, RuntimeErrorKind, Stmt};
use rill_ir::{Diagnostic, ModuleEnv};

fn canon(source: &str) -> (CanonOutput, ModuleEnv) {
    let mut env = ModuleEnv::new(source);
    let tokens = rill_lexer::lex(&mut env);
    let parsed = rill_parse::parse_module(&tokens, &mut env);
    let output = canonicalize(&parsed.header, &parsed.stmts, &parsed.store, &mut env);
    (output, env)
}

fn def_body<'a>(output: &'a CanonOutput, index: usize) -> &'a Expr {
    let def = output.cir.def(output.defs[index]);
    output.cir.expr(def.expr)
}

#[test]
fn simple_def_resolves() {
    let (output, env) = canon("module [x]\nx = 1 + 2\n");
    assert_eq!(output.defs.len(), 1);
    let Expr::Binop { op, .. } = def_body(&output, 0) else {
        panic!("expected binop, got {:?}", def_body(&output, 0));
    };
    assert_eq!(*op, Binop::Add);
    assert!(env.diagnostics.is_empty());
}

#[test]
fn reference_between_top_level_defs() {
    // `double` is defined after `quad` in the file: top-level defs are
    // mutually visible.
    let (output, env) = canon("module []\nquad = |x| double(double(x))\ndouble = |x| x + x\n");
    assert!(env.diagnostics.is_empty());
    assert_eq!(output.defs.len(), 2);
}

#[test]
fn unresolved_ident_becomes_runtime_error() {
    let (output, env) = canon("module []\nx = missing\n");
    assert!(matches!(
        def_body(&output, 0),
        Expr::RuntimeError {
            kind: RuntimeErrorKind::IdentNotInScope
        }
    ));
    let count = env
        .diagnostics
        .iter()
        .filter(|d| matches!(d, Diagnostic::IdentNotInScope { .. }))
        .count();
    assert_eq!(count, 1);
}

#[test]
fn duplicate_in_same_scope_diagnosed() {
    let (_, env) = canon("module []\nx = 1\nx = 2\n");
    assert!(env
        .diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::IdentAlreadyInScope { .. })));
}

#[test]
fn shadowing_in_nested_scope_warns() {
    let (_, env) = canon("module []\nx = 1\nf = |x| x\n");
    assert!(env
        .diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::ShadowingWarning { .. })));
}

#[test]
fn pizza_desugars_to_call() {
    let (output, env) = canon("module []\nf = |x| x\ny = 1 |> f\n");
    let Expr::Call { args, .. } = def_body(&output, 1) else {
        panic!("expected call, got {:?}", def_body(&output, 1));
    };
    assert_eq!(output.cir.expr_span(*args).len(), 1);
    assert!(env.diagnostics.is_empty());
}

#[test]
fn pizza_prepends_to_existing_call() {
    let (output, _) = canon("module []\nadd = |a, b| a + b\ny = 1 |> add(2)\n");
    let Expr::Call { args, .. } = def_body(&output, 1) else {
        panic!("expected call");
    };
    assert_eq!(output.cir.expr_span(*args).len(), 2);
}

#[test]
fn and_or_become_short_circuit_forms() {
    let (output, _) = canon("module []\nx = a_val and b_val or c_val\n");
    // `or` is loosest: Or(And(a, b), c).
    let Expr::Or { lhs, .. } = def_body(&output, 0) else {
        panic!("expected or, got {:?}", def_body(&output, 0));
    };
    assert!(matches!(output.cir.expr(*lhs), Expr::And { .. }));
}

#[test]
fn interpolation_expands_to_segments() {
    let (output, env) = canon("module []\ngreet = |name| \"Hi ${name}!\"\n");
    let Expr::Lambda { body, .. } = def_body(&output, 0) else {
        panic!("expected lambda");
    };
    let Expr::Str { segments } = output.cir.expr(*body) else {
        panic!("expected str, got {:?}", output.cir.expr(*body));
    };
    let segments = output.cir.expr_span(*segments);
    assert_eq!(segments.len(), 3);
    assert!(matches!(output.cir.expr(segments[0]), Expr::StrSegment(_)));
    assert!(matches!(output.cir.expr(segments[1]), Expr::LookupLocal { .. }));
    assert!(env.diagnostics.is_empty());
}

#[test]
fn nested_lambda_captures_outer_param() {
    let (output, env) = canon("module []\nmul = |a| |b| a * b\n");
    assert!(env.diagnostics.is_empty());
    let Expr::Lambda { body, captures, .. } = def_body(&output, 0) else {
        panic!("expected lambda");
    };
    // The outer lambda captures nothing.
    assert_eq!(output.cir.captures(*captures).len(), 0);
    // The inner lambda captures `a`.
    let Expr::Lambda { captures: inner, .. } = output.cir.expr(*body) else {
        panic!("expected inner lambda");
    };
    let inner = output.cir.captures(*inner);
    assert_eq!(inner.len(), 1);
    assert_eq!(env.idents.text(inner[0].ident), "a");
}

#[test]
fn top_level_lookups_are_not_captured() {
    let (output, _) = canon("module []\nbase = 10\nadd_base = |x| x + base\n");
    let Expr::Lambda { captures, .. } = def_body(&output, 1) else {
        panic!("expected lambda");
    };
    assert_eq!(output.cir.captures(*captures).len(), 0);
}

#[test]
fn destructured_params_are_not_captures() {
    // The sub-patterns of a record destructure in parameter position are
    // plain bindings, never captures.
    let (output, env) = canon("module []\nget_x = |{x, y}| x + y\n");
    assert!(env.diagnostics.is_empty());
    let Expr::Lambda { captures, .. } = def_body(&output, 0) else {
        panic!("expected lambda");
    };
    assert_eq!(output.cir.captures(*captures).len(), 0);
}

#[test]
fn block_defs_are_sequential_and_scoped() {
    let (output, env) = canon("module []\nmain = {\n    y = 2\n    z = y + 1\n    z\n}\n");
    assert!(env.diagnostics.is_empty());
    let Expr::Block { stmts, result } = def_body(&output, 0) else {
        panic!("expected block");
    };
    assert_eq!(output.cir.stmt_span(*stmts).len(), 2);
    assert!(matches!(output.cir.expr(*result), Expr::LookupLocal { .. }));
}

#[test]
fn bare_top_level_expression_is_invalid() {
    let (_, env) = canon("module []\n1 + 1\n");
    assert!(env
        .diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::InvalidTopLevelStatement { .. })));
}

#[test]
fn exposed_but_not_implemented() {
    let (_, env) = canon("module [missing!]\n");
    assert!(env
        .diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::ExposedButNotImplemented { .. })));
}

#[test]
fn redundant_exposed() {
    let (_, env) = canon("module [x, x]\nx = 1\n");
    assert!(env
        .diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::RedundantExposed { .. })));
}

#[test]
fn type_redeclared() {
    let (_, env) = canon("module []\nColor : [Red]\nColor : [Blue]\n");
    assert!(env
        .diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::TypeRedeclared { .. })));
}

#[test]
fn undeclared_type_in_annotation() {
    let (_, env) = canon("module []\nx : Nonsense\nx = 1\n");
    assert!(env
        .diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::UndeclaredType { .. })));
}

#[test]
fn annotation_attaches_to_def() {
    let (output, env) = canon("module []\nid : a -> a\nid = |x| x\n");
    assert!(env.diagnostics.is_empty());
    let def = output.cir.def(output.defs[0]);
    assert!(def.annotation.is_some());
}

#[test]
fn match_branch_patterns_bind_in_branch_scope() {
    let (output, env) = canon(
        "module []\nf = |v| match v {\n    Pair(a, b) => a + b,\n    _ => 0\n}\n",
    );
    assert!(env.diagnostics.is_empty());
    let Expr::Lambda { body, .. } = def_body(&output, 0) else {
        panic!("expected lambda");
    };
    let Expr::Match { branches, .. } = output.cir.expr(*body) else {
        panic!("expected match, got {:?}", output.cir.expr(*body));
    };
    let branches = output.cir.branches(*branches);
    assert_eq!(branches.len(), 2);
    let pattern = output.cir.pattern_span(branches[0].patterns)[0];
    assert!(matches!(output.cir.pattern(pattern), Pattern::Tag { .. }));
}

#[test]
fn expect_statement_lowered() {
    let (output, _) = canon("module []\nexpect 1 == 1\n");
    assert_eq!(output.expects.len(), 1);
    assert!(matches!(
        output.cir.stmt(output.expects[0]),
        Stmt::Expect { .. }
    ));
}

#[test]
fn malformed_expr_lowers_without_new_diagnostics() {
    let (output, env) = canon("module []\nx = )\n");
    let parse_count = env
        .diagnostics
        .iter()
        .filter(|d| matches!(d, Diagnostic::Parse { .. }))
        .count();
    // Canonicalization adds no second report for the same malformation.
    assert_eq!(parse_count, 1);
    assert!(matches!(
        def_body(&output, 0),
        Expr::RuntimeError {
            kind: RuntimeErrorKind::MalformedSyntax
        }
    ));
}
