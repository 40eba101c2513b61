//! Unification-rule and whole-pipeline inference tests.

use crate::types::{Content, FlatType, IntPrecision, IntReq, Num, NumCompact, Rank, Var};
use crate::unify::{unify, MismatchKind};
use crate::{check_module, render_var, TypeStore};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rill_ir::{Diagnostic, ModuleEnv};

fn num(store: &mut TypeStore, num: Num) -> Var {
    store.fresh_with(Content::Structure(FlatType::Num(num)), Rank::TOP)
}

#[test]
fn unify_flex_adopts_structure() {
    let mut store = TypeStore::new();
    let idents = rill_ir::IdentStore::new();
    let flex = store.fresh(Rank::TOP);
    let str_var = store.fresh_with(Content::Structure(FlatType::Str), Rank::TOP);
    assert!(unify(&mut store, &idents, flex, str_var).is_ok());
    assert!(matches!(store.content(flex), Content::Structure(FlatType::Str)));
}

#[test]
fn unify_is_idempotent() {
    let mut store = TypeStore::new();
    let idents = rill_ir::IdentStore::new();
    let var = store.fresh_with(Content::Structure(FlatType::Str), Rank::TOP);
    assert!(unify(&mut store, &idents, var, var).is_ok());
    assert!(matches!(store.content(var), Content::Structure(FlatType::Str)));
}

#[test]
fn rigid_unifies_only_with_itself() {
    let mut store = TypeStore::new();
    let mut idents = rill_ir::IdentStore::new();
    let a = idents.intern("a");
    let b = idents.intern("b");

    let rigid_a1 = store.fresh_with(Content::RigidVar(a), Rank::TOP);
    let rigid_a2 = store.fresh_with(Content::RigidVar(a), Rank::TOP);
    assert!(unify(&mut store, &idents, rigid_a1, rigid_a2).is_ok());

    let rigid_a3 = store.fresh_with(Content::RigidVar(a), Rank::TOP);
    let rigid_b = store.fresh_with(Content::RigidVar(b), Rank::TOP);
    let result = unify(&mut store, &idents, rigid_a3, rigid_b);
    let Err(mismatch) = result else {
        panic!("expected rigid mismatch");
    };
    assert_eq!(mismatch.kind, MismatchKind::Rigid);
    // Both sides are poisoned to suppress cascades.
    assert!(matches!(store.content(rigid_a3), Content::Err));
    assert!(matches!(store.content(rigid_b), Content::Err));
}

#[test]
fn num_unbound_joins_to_int_by_evidence() {
    let mut store = TypeStore::new();
    let idents = rill_ir::IdentStore::new();
    let unbound = num(&mut store, Num::NumUnbound(IntReq::default()));
    let int = num(&mut store, Num::IntUnbound(IntReq::default()));
    assert!(unify(&mut store, &idents, unbound, int).is_ok());
    assert!(matches!(
        store.content(unbound),
        Content::Structure(FlatType::Num(Num::IntUnbound(_)))
    ));
}

#[test]
fn int_unbound_plus_precision_compacts() {
    let mut store = TypeStore::new();
    let idents = rill_ir::IdentStore::new();
    let unbound = num(&mut store, Num::IntUnbound(IntReq::default()));
    let precision = num(&mut store, Num::IntPrecision(IntPrecision::U8));
    assert!(unify(&mut store, &idents, unbound, precision).is_ok());
    assert!(matches!(
        store.content(unbound),
        Content::Structure(FlatType::Num(Num::Compact(NumCompact::Int(IntPrecision::U8))))
    ));
}

#[test]
fn conflicting_precisions_fail() {
    let mut store = TypeStore::new();
    let idents = rill_ir::IdentStore::new();
    let a = num(&mut store, Num::IntPrecision(IntPrecision::U8));
    let b = num(&mut store, Num::IntPrecision(IntPrecision::I64));
    let Err(mismatch) = unify(&mut store, &idents, a, b) else {
        panic!("expected precision mismatch");
    };
    assert_eq!(mismatch.kind, MismatchKind::IntPrecisionMismatch);
}

#[test]
fn negative_evidence_rejects_unsigned() {
    let mut store = TypeStore::new();
    let idents = rill_ir::IdentStore::new();
    let negative = num(&mut store, Num::NumUnbound(IntReq::for_value(-5)));
    let unsigned = num(&mut store, Num::IntPrecision(IntPrecision::U32));
    assert!(unify(&mut store, &idents, negative, unsigned).is_err());
}

#[test]
fn record_row_polymorphism_extends_both_sides() {
    let mut store = TypeStore::new();
    let mut idents = rill_ir::IdentStore::new();
    let x = idents.intern("x");
    let y = idents.intern("y");

    // { x: Str | e1 }  ~  { y: Str | e2 }
    let str1 = store.fresh_with(Content::Structure(FlatType::Str), Rank::TOP);
    let str2 = store.fresh_with(Content::Structure(FlatType::Str), Rank::TOP);
    let ext1 = store.fresh(Rank::TOP);
    let ext2 = store.fresh(Rank::TOP);
    let fields1 = store.alloc_fields([(x, str1)]);
    let fields2 = store.alloc_fields([(y, str2)]);
    let rec1 = store.fresh_with(
        Content::Structure(FlatType::Record { fields: fields1, ext: ext1 }),
        Rank::TOP,
    );
    let rec2 = store.fresh_with(
        Content::Structure(FlatType::Record { fields: fields2, ext: ext2 }),
        Rank::TOP,
    );
    assert!(unify(&mut store, &idents, rec1, rec2).is_ok());

    // The merged record has both fields.
    let Content::Structure(FlatType::Record { fields, .. }) = store.content(rec1) else {
        panic!("expected record");
    };
    assert_eq!(fields.len, 2);
}

#[test]
fn closed_record_missing_field_fails() {
    let mut store = TypeStore::new();
    let mut idents = rill_ir::IdentStore::new();
    let x = idents.intern("x");

    let str1 = store.fresh_with(Content::Structure(FlatType::Str), Rank::TOP);
    let closed_ext = store.fresh_with(Content::Structure(FlatType::EmptyRecord), Rank::TOP);
    let fields = store.alloc_fields([(x, str1)]);
    let rec = store.fresh_with(
        Content::Structure(FlatType::Record { fields, ext: closed_ext }),
        Rank::TOP,
    );
    let empty = store.fresh_with(Content::Structure(FlatType::EmptyRecord), Rank::TOP);
    let Err(mismatch) = unify(&mut store, &idents, rec, empty) else {
        panic!("expected missing-field failure");
    };
    assert_eq!(mismatch.kind, MismatchKind::MissingField(x));
}

#[test]
fn open_tag_unions_merge() {
    let mut store = TypeStore::new();
    let mut idents = rill_ir::IdentStore::new();
    let ok = idents.intern("Ok");
    let err = idents.intern("Err");

    let payload1 = store.alloc_vars([]);
    let payload2 = store.alloc_vars([]);
    let ext1 = store.fresh(Rank::TOP);
    let ext2 = store.fresh(Rank::TOP);
    let tags1 = store.alloc_tags([(ok, payload1)]);
    let tags2 = store.alloc_tags([(err, payload2)]);
    let union1 = store.fresh_with(
        Content::Structure(FlatType::TagUnion { tags: tags1, ext: ext1 }),
        Rank::TOP,
    );
    let union2 = store.fresh_with(
        Content::Structure(FlatType::TagUnion { tags: tags2, ext: ext2 }),
        Rank::TOP,
    );
    assert!(unify(&mut store, &idents, union1, union2).is_ok());
    let Content::Structure(FlatType::TagUnion { tags, .. }) = store.content(union1) else {
        panic!("expected tag union");
    };
    assert_eq!(tags.len, 2);
}

#[test]
fn function_arity_mismatch_fails() {
    let mut store = TypeStore::new();
    let idents = rill_ir::IdentStore::new();
    let a1 = store.fresh(Rank::TOP);
    let r1 = store.fresh(Rank::TOP);
    let args1 = store.alloc_vars([a1]);
    let f1 = store.fresh_with(
        Content::Structure(FlatType::FnUnbound(crate::Func { args: args1, ret: r1 })),
        Rank::TOP,
    );
    let r2 = store.fresh(Rank::TOP);
    let args2 = store.alloc_vars([]);
    let f2 = store.fresh_with(
        Content::Structure(FlatType::FnUnbound(crate::Func { args: args2, ret: r2 })),
        Rank::TOP,
    );
    let Err(mismatch) = unify(&mut store, &idents, f1, f2) else {
        panic!("expected arity mismatch");
    };
    assert_eq!(mismatch.kind, MismatchKind::Arity);
}

#[test]
fn pure_vs_effectful_fails() {
    let mut store = TypeStore::new();
    let idents = rill_ir::IdentStore::new();
    let r1 = store.fresh(Rank::TOP);
    let args1 = store.alloc_vars([]);
    let pure = store.fresh_with(
        Content::Structure(FlatType::FnPure(crate::Func { args: args1, ret: r1 })),
        Rank::TOP,
    );
    let r2 = store.fresh(Rank::TOP);
    let args2 = store.alloc_vars([]);
    let effectful = store.fresh_with(
        Content::Structure(FlatType::FnEffectful(crate::Func { args: args2, ret: r2 })),
        Rank::TOP,
    );
    let Err(mismatch) = unify(&mut store, &idents, pure, effectful) else {
        panic!("expected purity mismatch");
    };
    assert_eq!(mismatch.kind, MismatchKind::Purity);
}

proptest! {
    /// `unify(a, b)` and `unify(b, a)` agree on the representative content,
    /// including merges of two differently-named flex vars.
    #[test]
    fn unify_symmetry(pick_a in 0usize..6, pick_b in 0usize..6) {
        let mut idents = rill_ir::IdentStore::new();
        let name_a = idents.intern("a");
        let name_b = idents.intern("b");
        let make = |store: &mut TypeStore, pick: usize| match pick {
            0 => store.fresh(Rank::TOP),
            1 => store.fresh_with(Content::Structure(FlatType::Str), Rank::TOP),
            2 => num(store, Num::NumUnbound(IntReq::default())),
            3 => num(store, Num::IntPrecision(IntPrecision::I64)),
            4 => store.fresh_with(Content::FlexVar(Some(name_a)), Rank::TOP),
            _ => store.fresh_with(Content::FlexVar(Some(name_b)), Rank::TOP),
        };

        let mut store1 = TypeStore::new();
        let a1 = make(&mut store1, pick_a);
        let b1 = make(&mut store1, pick_b);
        let r1 = unify(&mut store1, &idents, a1, b1).map(|()| store1.content(a1));

        let mut store2 = TypeStore::new();
        let a2 = make(&mut store2, pick_a);
        let b2 = make(&mut store2, pick_b);
        let r2 = unify(&mut store2, &idents, b2, a2).map(|()| store2.content(b2));

        match (r1, r2) {
            (Ok(c1), Ok(c2)) => prop_assert_eq!(c1, c2),
            (Err(_), Err(_)) => {}
            (left, right) => prop_assert!(false, "asymmetric: {left:?} vs {right:?}"),
        }
    }
}

#[test]
fn named_flex_merge_is_order_independent() {
    let mut idents = rill_ir::IdentStore::new();
    let name_a = idents.intern("a");
    let name_b = idents.intern("b");

    let mut store1 = TypeStore::new();
    let x1 = store1.fresh_with(Content::FlexVar(Some(name_a)), Rank::TOP);
    let y1 = store1.fresh_with(Content::FlexVar(Some(name_b)), Rank::TOP);
    assert!(unify(&mut store1, &idents, x1, y1).is_ok());

    let mut store2 = TypeStore::new();
    let x2 = store2.fresh_with(Content::FlexVar(Some(name_a)), Rank::TOP);
    let y2 = store2.fresh_with(Content::FlexVar(Some(name_b)), Rank::TOP);
    assert!(unify(&mut store2, &idents, y2, x2).is_ok());

    assert_eq!(store1.content(x1), store2.content(x2));
}

// === Whole-pipeline inference ===

fn infer(source: &str) -> (Vec<String>, ModuleEnv) {
    let mut env = ModuleEnv::new(source);
    let tokens = rill_lexer::lex(&mut env);
    let parsed = rill_parse::parse_module(&tokens, &mut env);
    let canon = rill_canon::canonicalize(&parsed.header, &parsed.stmts, &parsed.store, &mut env);
    let mut checked = check_module(&canon, &mut env);
    let rendered = checked
        .def_vars
        .clone()
        .into_iter()
        .map(|var| render_var(&mut checked.store, &env.idents, var))
        .collect();
    (rendered, env)
}

fn type_errors(env: &ModuleEnv) -> usize {
    env.diagnostics
        .iter()
        .filter(|d| {
            matches!(
                d,
                Diagnostic::TypeMismatch { .. }
                    | Diagnostic::IncompatibleListElements { .. }
                    | Diagnostic::IncompatibleIfBranches { .. }
                    | Diagnostic::IncompatibleMatchBranches { .. }
                    | Diagnostic::NumberPrecisionMismatch { .. }
            )
        })
        .count()
}

#[test]
fn addition_infers_num() {
    let (types, env) = infer("module []\nx = 1 + 2\n");
    assert_eq!(types[0], "Num(*)");
    assert_eq!(type_errors(&env), 0);
}

#[test]
fn if_with_comparison_infers_num() {
    let (types, env) = infer("module []\nx = if 1 == 1 42 else 99\n");
    assert_eq!(types[0], "Num(*)");
    assert_eq!(type_errors(&env), 0);
}

#[test]
fn lambda_application_infers_result() {
    let (types, env) = infer("module []\nx = (|a, b| a + b)(3, 4)\n");
    assert_eq!(types[0], "Num(*)");
    assert_eq!(type_errors(&env), 0);
}

#[test]
fn record_field_access_infers_field() {
    let (types, env) = infer("module []\nx = {a: 10, b: 20}.b\n");
    assert_eq!(types[0], "Num(*)");
    assert_eq!(type_errors(&env), 0);
}

#[test]
fn closure_capture_type_checks() {
    let (types, env) = infer("module []\nx = ((|a| |b| a * b)(5))(10)\n");
    assert_eq!(types[0], "Num(*)");
    assert_eq!(type_errors(&env), 0);
}

#[test]
fn heterogeneous_list_reports_once_and_poisons() {
    let (types, env) = infer("module []\nx = [1, \"hello\"]\n");
    assert_eq!(type_errors(&env), 1);
    assert!(env
        .diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::IncompatibleListElements { .. })));
    assert_eq!(types[0], "List(<type error>)");
}

#[test]
fn condition_must_be_bool() {
    let (_, env) = infer("module []\nx = if 1 2 else 3\n");
    assert!(type_errors(&env) >= 1);
}

#[test]
fn polymorphic_def_reused_at_two_types() {
    let (_, env) = infer(
        "module []\nid = |v| v\nmain = {\n    a = id(1)\n    b = id(\"s\")\n    a\n}\n",
    );
    assert_eq!(type_errors(&env), 0);
}

#[test]
fn annotation_constrains_literal() {
    let (types, env) = infer("module []\nx : U8\nx = 200\n");
    assert_eq!(type_errors(&env), 0);
    assert_eq!(types[0], "U8");
}

#[test]
fn annotation_conflict_reports() {
    let (_, env) = infer("module []\nx : U8\nx = \"text\"\n");
    assert!(type_errors(&env) >= 1);
}

#[test]
fn annotated_identity_generalizes() {
    let (types, env) = infer("module []\nid : a -> a\nid = |v| v\n");
    assert_eq!(type_errors(&env), 0);
    assert_eq!(types[0], "a -> a");
}

#[test]
fn string_interpolation_requires_str_segments() {
    let (_, env) = infer("module []\nx = \"n = ${42}\"\n");
    assert!(type_errors(&env) >= 1);
}

#[test]
fn match_branches_must_agree() {
    let (_, env) = infer("module []\nf = |v| match v {\n    1 => \"one\",\n    _ => 2\n}\n");
    assert!(env
        .diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::IncompatibleMatchBranches { .. })));
}

#[test]
fn duplicate_literal_branch_warns() {
    let (_, env) = infer("module []\nf = |v| match v {\n    1 => 10,\n    1 => 20,\n    _ => 0\n}\n");
    assert!(env
        .diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::UnusedBranch { .. })));
}

#[test]
fn alias_type_checks_transparently() {
    let (_, env) = infer("module []\nName : Str\ngreet : Name -> Str\ngreet = |n| n\n");
    assert_eq!(type_errors(&env), 0);
}

#[test]
fn error_free_defs_have_no_flex_in_annotated_exports() {
    // Soundness: after checking an error-free module, the annotated def's
    // var resolves without `err`.
    let source = "module [inc]\ninc : U8 -> U8\ninc = |n| n + 1\n";
    let mut env = ModuleEnv::new(source);
    let tokens = rill_lexer::lex(&mut env);
    let parsed = rill_parse::parse_module(&tokens, &mut env);
    let canon = rill_canon::canonicalize(&parsed.header, &parsed.stmts, &parsed.store, &mut env);
    let mut checked = check_module(&canon, &mut env);
    assert_eq!(type_errors(&env), 0);
    let rendered = render_var(&mut checked.store, &env.idents, checked.def_vars[0]);
    assert!(!rendered.contains("<type error>"), "got {rendered}");
}
