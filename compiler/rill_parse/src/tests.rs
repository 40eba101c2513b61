use crate::{parse_module, ParseOutput};
use pretty_assertions::assert_eq;
use rill_ir::ast::{AstBinOp, ExprKind, Header, MalformedReason, PatternKind, StmtKind};
use rill_ir::{Diagnostic, ModuleEnv};

fn parse(source: &str) -> (ParseOutput, ModuleEnv) {
    let mut env = ModuleEnv::new(source);
    let tokens = rill_lexer::lex(&mut env);
    let output = parse_module(&tokens, &mut env);
    (output, env)
}

/// Number of parse diagnostics (tokenize diagnostics excluded).
fn parse_diag_count(env: &ModuleEnv) -> usize {
    env.diagnostics
        .iter()
        .filter(|d| matches!(d, Diagnostic::Parse { .. }))
        .count()
}

fn count_malformed(output: &ParseOutput) -> usize {
    let store = &output.store;
    let mut count = 0;
    for i in 0..store.expr_count() {
        if matches!(
            store.expr_kind(rill_ir::ast::ExprIdx::new(i as u32)),
            ExprKind::Malformed(_)
        ) {
            count += 1;
        }
    }
    count
}

#[test]
fn module_header_with_exposes() {
    let (output, env) = parse("module [main!, helper]\n\nmain! = 42\n");
    let Header::Module { exposes } = output.header else {
        panic!("expected module header, got {:?}", output.header);
    };
    let names = output.store.name_span(exposes);
    assert_eq!(names.len(), 2);
    assert_eq!(env.idents.text(names[0].0), "main!");
    assert_eq!(output.stmts.len(), 1);
    assert_eq!(parse_diag_count(&env), 0);
}

#[test]
fn app_header_with_platform() {
    let (output, env) = parse(r#"app [main!] { pf: platform "../platform/main.rill" }"#);
    let Header::App { provides, packages } = output.header else {
        panic!("expected app header, got {:?}", output.header);
    };
    assert_eq!(output.store.name_span(provides).len(), 1);
    let fields = output.store.package_fields(packages);
    assert_eq!(fields.len(), 1);
    assert!(fields[0].is_platform);
    assert_eq!(env.strings.text(fields[0].path), "../platform/main.rill");
}

#[test]
fn missing_header_is_diagnosed_but_body_parses() {
    let (output, env) = parse("x = 1\n");
    assert!(matches!(
        output.header,
        Header::Malformed(MalformedReason::MissingHeader)
    ));
    assert_eq!(output.stmts.len(), 1);
    assert_eq!(parse_diag_count(&env), 1);
}

#[test]
fn type_module_header_synthesized_from_filename() {
    let mut env = ModuleEnv::new("Color : [Red, Green, Blue]\n");
    env.module_name = Some("Color".to_owned());
    let tokens = rill_lexer::lex(&mut env);
    let output = parse_module(&tokens, &mut env);
    let Header::TypeModule { name } = output.header else {
        panic!("expected type module header, got {:?}", output.header);
    };
    assert_eq!(env.idents.text(name), "Color");
    assert_eq!(parse_diag_count(&env), 0);
}

#[test]
fn precedence_mul_over_add() {
    let (output, _) = parse("module []\nx = 1 + 2 * 3\n");
    let StmtKind::Decl { body, .. } = output.store.stmt_kind(output.stmts[0]) else {
        panic!("expected decl");
    };
    let ExprKind::BinOp { op, rhs, .. } = output.store.expr_kind(*body) else {
        panic!("expected binop");
    };
    assert_eq!(*op, AstBinOp::Add);
    assert!(matches!(
        output.store.expr_kind(*rhs),
        ExprKind::BinOp { op: AstBinOp::Mul, .. }
    ));
}

#[test]
fn comparison_binds_looser_than_arithmetic() {
    let (output, _) = parse("module []\nx = 1 + 1 == 2\n");
    let StmtKind::Decl { body, .. } = output.store.stmt_kind(output.stmts[0]) else {
        panic!("expected decl");
    };
    assert!(matches!(
        output.store.expr_kind(*body),
        ExprKind::BinOp { op: AstBinOp::Eq, .. }
    ));
}

#[test]
fn pizza_binds_loosest() {
    let (output, _) = parse("module []\nx = a |> f or b\n");
    let StmtKind::Decl { body, .. } = output.store.stmt_kind(output.stmts[0]) else {
        panic!("expected decl");
    };
    assert!(matches!(
        output.store.expr_kind(*body),
        ExprKind::BinOp { op: AstBinOp::Pizza, .. }
    ));
}

#[test]
fn lambda_call_and_field_access() {
    let (output, _) = parse("module []\nx = (|a, b| a + b)(3, 4)\n");
    let StmtKind::Decl { body, .. } = output.store.stmt_kind(output.stmts[0]) else {
        panic!("expected decl");
    };
    let ExprKind::Apply { func, args } = output.store.expr_kind(*body) else {
        panic!("expected apply, got {:?}", output.store.expr_kind(*body));
    };
    assert!(matches!(output.store.expr_kind(*func), ExprKind::Lambda { .. }));
    assert_eq!(output.store.expr_span(*args).len(), 2);
}

#[test]
fn record_literal_and_access() {
    let (output, _) = parse("module []\nx = {a: 10, b: 20}.b\n");
    let StmtKind::Decl { body, .. } = output.store.stmt_kind(output.stmts[0]) else {
        panic!("expected decl");
    };
    let ExprKind::FieldAccess { receiver, .. } = output.store.expr_kind(*body) else {
        panic!("expected field access, got {:?}", output.store.expr_kind(*body));
    };
    let ExprKind::Record { fields } = output.store.expr_kind(*receiver) else {
        panic!("expected record");
    };
    assert_eq!(output.store.record_fields(*fields).len(), 2);
}

#[test]
fn block_with_statements() {
    let (output, _) = parse("module []\nmain = {\n    y = 2\n    y + 1\n}\n");
    let StmtKind::Decl { body, .. } = output.store.stmt_kind(output.stmts[0]) else {
        panic!("expected decl");
    };
    let ExprKind::Block { stmts } = output.store.expr_kind(*body) else {
        panic!("expected block, got {:?}", output.store.expr_kind(*body));
    };
    assert_eq!(output.store.stmt_span(*stmts).len(), 2);
}

#[test]
fn if_chain_flattened() {
    let (output, _) = parse("module []\nx = if a 1 else if b 2 else 3\n");
    let StmtKind::Decl { body, .. } = output.store.stmt_kind(output.stmts[0]) else {
        panic!("expected decl");
    };
    let ExprKind::If { branches, .. } = output.store.expr_kind(*body) else {
        panic!("expected if");
    };
    assert_eq!(output.store.if_branches(*branches).len(), 2);
}

#[test]
fn if_without_else_is_malformed() {
    let (output, env) = parse("module []\nx = if a 1\n");
    assert!(count_malformed(&output) >= 1);
    assert!(env.diagnostics.iter().any(|d| matches!(
        d,
        Diagnostic::Parse {
            reason: MalformedReason::NoElse,
            ..
        }
    )));
}

#[test]
fn match_with_alternatives() {
    let (output, _) = parse("module []\nx = match v {\n    1 | 2 => 10,\n    _ => 20\n}\n");
    let StmtKind::Decl { body, .. } = output.store.stmt_kind(output.stmts[0]) else {
        panic!("expected decl");
    };
    let ExprKind::Match { arms, .. } = output.store.expr_kind(*body) else {
        panic!("expected match, got {:?}", output.store.expr_kind(*body));
    };
    let arms = output.store.match_arms(*arms);
    assert_eq!(arms.len(), 2);
    assert_eq!(output.store.pattern_span(arms[0].patterns).len(), 2);
}

#[test]
fn string_interpolation_embeds_expressions() {
    let (output, _) = parse("module []\ngreet = |name| \"Hello, ${name}!\"\n");
    let StmtKind::Decl { body, .. } = output.store.stmt_kind(output.stmts[0]) else {
        panic!("expected decl");
    };
    let ExprKind::Lambda { body: lambda_body, .. } = output.store.expr_kind(*body) else {
        panic!("expected lambda");
    };
    let ExprKind::Str { segments } = output.store.expr_kind(*lambda_body) else {
        panic!("expected string");
    };
    let segments = output.store.expr_span(*segments);
    assert_eq!(segments.len(), 3);
    assert!(matches!(output.store.expr_kind(segments[0]), ExprKind::StrPart(_)));
    assert!(matches!(output.store.expr_kind(segments[1]), ExprKind::Var(_)));
    assert!(matches!(output.store.expr_kind(segments[2]), ExprKind::StrPart(_)));
}

#[test]
fn list_pattern_with_rest() {
    let (output, _) = parse("module []\nx = match v {\n    [first, .. as rest] => first\n}\n");
    let StmtKind::Decl { body, .. } = output.store.stmt_kind(output.stmts[0]) else {
        panic!("expected decl");
    };
    let ExprKind::Match { arms, .. } = output.store.expr_kind(*body) else {
        panic!("expected match");
    };
    let arm = &output.store.match_arms(*arms)[0];
    let pattern = output.store.pattern_span(arm.patterns)[0];
    let PatternKind::List { before, rest, .. } = output.store.pattern_kind(pattern) else {
        panic!("expected list pattern");
    };
    assert_eq!(output.store.pattern_span(*before).len(), 1);
    assert!(rest.is_some());
}

#[test]
fn destructure_decl() {
    let (output, _) = parse("module []\nmain = {\n    (a, b) = pair\n    a\n}\n");
    let StmtKind::Decl { body, .. } = output.store.stmt_kind(output.stmts[0]) else {
        panic!("expected decl");
    };
    let ExprKind::Block { stmts } = output.store.expr_kind(*body) else {
        panic!("expected block");
    };
    let inner = output.store.stmt_span(*stmts)[0];
    let StmtKind::Decl { pattern, .. } = output.store.stmt_kind(inner) else {
        panic!("expected inner decl, got {:?}", output.store.stmt_kind(inner));
    };
    assert!(matches!(
        output.store.pattern_kind(*pattern),
        PatternKind::Tuple { .. }
    ));
}

#[test]
fn type_decl_and_annotation() {
    let (output, _) = parse("module []\nColor : [Red, Green]\nPair a : (a, a)\nid : a -> a\nid = |x| x\n");
    assert_eq!(output.stmts.len(), 4);
    assert!(matches!(
        output.store.stmt_kind(output.stmts[0]),
        StmtKind::TypeDecl { .. }
    ));
    assert!(matches!(
        output.store.stmt_kind(output.stmts[1]),
        StmtKind::TypeDecl { .. }
    ));
    assert!(matches!(
        output.store.stmt_kind(output.stmts[2]),
        StmtKind::TypeAnno { .. }
    ));
    assert!(matches!(
        output.store.stmt_kind(output.stmts[3]),
        StmtKind::Decl { .. }
    ));
}

#[test]
fn import_with_alias_and_exposing() {
    let (output, env) = parse("module []\nimport pf.Json.Decode as Jd exposing [decode, Decoder]\n");
    let StmtKind::Import(import) = output.store.stmt_kind(output.stmts[0]) else {
        panic!("expected import, got {:?}", output.store.stmt_kind(output.stmts[0]));
    };
    let import = output.store.import(*import);
    assert_eq!(env.idents.text(import.module), "Json.Decode");
    assert!(import.shorthand.is_some());
    assert!(import.alias.is_some());
    assert_eq!(output.store.name_span(import.exposing).len(), 2);
}

#[test]
fn malformed_nodes_match_parse_diagnostics() {
    // `*` with no left operand, and an unclosed list.
    let (output, env) = parse("module []\nx = * 3\ny = [1, 2\n");
    assert!(count_malformed(&output) > 0);
    // Malformed nodes correspond 1:1 to parser-emitted diagnostics
    // (including the unknown-operator report).
    let parser_diags = parse_diag_count(&env)
        + env
            .diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::UnknownOperator { .. }))
            .count();
    assert_eq!(count_malformed(&output), parser_diags);
}

#[test]
fn misplaced_operator_is_unknown_operator() {
    let (_, env) = parse("module []\nx = 1 ** 2\n");
    assert!(env
        .diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::UnknownOperator { .. })));
}

#[test]
fn parser_is_total_on_garbage() {
    let (output, env) = parse("module []\n)))] = = = |||\n");
    // Never panics, always produces statements or recovers.
    assert!(parse_diag_count(&env) > 0);
    drop(output);
}

#[test]
fn expect_statement() {
    let (output, _) = parse("module []\nexpect 1 == 1\n");
    assert!(matches!(
        output.store.stmt_kind(output.stmts[0]),
        StmtKind::Expect { .. }
    ));
}

#[test]
fn crash_expression() {
    let (output, _) = parse("module []\nboom = crash \"unreachable\"\n");
    let StmtKind::Decl { body, .. } = output.store.stmt_kind(output.stmts[0]) else {
        panic!("expected decl");
    };
    assert!(matches!(output.store.expr_kind(*body), ExprKind::Crash { .. }));
}
