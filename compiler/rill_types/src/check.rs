//! Hindley–Milner inference over CIR.
//!
//! One walk per module. Every CIR expression and pattern gets a type var,
//! created lazily at the current rank; inference builds structural types
//! with fresh vars and unifies. Mutually recursive top-level defs work
//! because a lookup of a not-yet-checked def lazily creates its pattern
//! var, and checking that def later unifies structure into the same var.
//!
//! Each definition is inferred one rank deeper than its surroundings; on
//! the way out, vars still at that rank are generalized into the def's
//! scheme. Lookups of generalized bindings instantiate.

use crate::types::{num_for_suffix, Content, FlatType, Func, IntReq, Mark, Num, Rank, Var};
use crate::unify::{unify, Mismatch, MismatchKind};
use crate::TypeStore;
use rill_canon::CanonOutput;
use rill_ir::cir::{
    self, Anno, Binop, BuiltinType, CirStore, DestructKind, Expr, Pattern, Stmt, TypeDeclKind,
    TypeRef,
};
use rill_ir::{Diagnostic, Ident, ModuleEnv, Region};
use rill_stack::grow_stack;
use rustc_hash::FxHashMap;
use tracing::trace;

/// The checker's output: the type store plus the var assigned to every CIR
/// node and definition.
pub struct CheckOutput {
    pub store: TypeStore,
    expr_vars: Vec<Option<Var>>,
    pattern_vars: Vec<Option<Var>>,
    /// One var per definition, parallel to `CanonOutput::defs`.
    pub def_vars: Vec<Var>,
}

impl CheckOutput {
    /// The type var of an expression.
    pub fn expr_var(&self, idx: cir::ExprIdx) -> Var {
        match self.expr_vars.get(idx.index()).copied().flatten() {
            Some(var) => var,
            None => unreachable!("expression {idx:?} was never visited by the checker"),
        }
    }

    /// The type var of a pattern.
    pub fn pattern_var(&self, idx: cir::PatternIdx) -> Var {
        match self.pattern_vars.get(idx.index()).copied().flatten() {
            Some(var) => var,
            None => unreachable!("pattern {idx:?} was never visited by the checker"),
        }
    }
}

/// In which position a failed unification happened, for diagnostic choice.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum UnifyCtx {
    General,
    ListElement,
    IfBranch,
    MatchBranch,
}

/// Type-check a canonicalized module.
pub fn check_module(canon: &CanonOutput, env: &mut ModuleEnv) -> CheckOutput {
    let mut checker = Checker::new(&canon.cir, env);

    for &def_idx in &canon.defs {
        let var = checker.check_def(def_idx);
        checker.def_vars.push(var);
    }
    for &expect_idx in &canon.expects {
        if let Stmt::Expect { body } = *canon.cir.stmt(expect_idx) {
            let region = canon.cir.stmt_region(expect_idx);
            let body_var = checker.infer_expr(body);
            let bool_var = checker.bool_var();
            checker.unify_or_report(body_var, bool_var, region, UnifyCtx::General);
        }
    }

    // Any node the walk never reached (e.g. inside dead malformed syntax)
    // still needs a var so invariants hold downstream.
    for i in 0..checker.expr_vars.len() {
        if checker.expr_vars[i].is_none() {
            checker.expr_vars[i] = Some(checker.store.fresh_with(Content::Err, Rank::TOP));
        }
    }
    for i in 0..checker.pattern_vars.len() {
        if checker.pattern_vars[i].is_none() {
            checker.pattern_vars[i] = Some(checker.store.fresh_with(Content::Err, Rank::TOP));
        }
    }

    CheckOutput {
        store: checker.store,
        expr_vars: checker.expr_vars,
        pattern_vars: checker.pattern_vars,
        def_vars: checker.def_vars,
    }
}

struct Checker<'a> {
    cir: &'a CirStore,
    env: &'a mut ModuleEnv,
    store: TypeStore,
    expr_vars: Vec<Option<Var>>,
    pattern_vars: Vec<Option<Var>>,
    def_vars: Vec<Var>,
    rank: Rank,
    /// Guard for recursive type declarations: decl → its in-flight var.
    expanding: FxHashMap<cir::TypeDeclIdx, Var>,
}

impl<'a> Checker<'a> {
    fn new(cir: &'a CirStore, env: &'a mut ModuleEnv) -> Self {
        Checker {
            cir,
            env,
            store: TypeStore::new(),
            expr_vars: vec![None; cir.expr_count()],
            pattern_vars: vec![None; cir.pattern_count()],
            def_vars: Vec::new(),
            rank: Rank::TOP,
            expanding: FxHashMap::default(),
        }
    }

    fn expr_var(&mut self, idx: cir::ExprIdx) -> Var {
        if let Some(var) = self.expr_vars[idx.index()] {
            return var;
        }
        let var = self.store.fresh(self.rank);
        self.expr_vars[idx.index()] = Some(var);
        var
    }

    fn pattern_var(&mut self, idx: cir::PatternIdx) -> Var {
        if let Some(var) = self.pattern_vars[idx.index()] {
            return var;
        }
        let var = self.store.fresh(self.rank);
        self.pattern_vars[idx.index()] = Some(var);
        var
    }

    // === Definitions ===

    fn check_def(&mut self, def_idx: cir::DefIdx) -> Var {
        let def = *self.cir.def(def_idx);
        let boundary = self.rank.next();
        let saved = self.rank;
        self.rank = boundary;

        let pattern_var = self.infer_pattern(def.pattern);
        // The pattern var may have been created lazily at an outer rank by
        // a forward reference; pull it into the def's own scope.
        self.store.set_rank(pattern_var, boundary);

        let expr_var = self.infer_expr(def.expr);
        self.unify_or_report(pattern_var, expr_var, def.expr_region, UnifyCtx::General);

        if let Some(anno) = def.annotation {
            let mut rigids = FxHashMap::default();
            let anno_var = self.anno_to_var(anno, &mut rigids);
            self.unify_or_report(expr_var, anno_var, def.expr_region, UnifyCtx::General);
        }

        self.rank = saved;
        self.store.generalize(pattern_var, boundary);
        pattern_var
    }

    // === Expressions ===

    fn infer_expr(&mut self, idx: cir::ExprIdx) -> Var {
        grow_stack(|| self.infer_expr_inner(idx))
    }

    fn infer_expr_inner(&mut self, idx: cir::ExprIdx) -> Var {
        let var = self.expr_var(idx);
        let region = self.cir.expr_region(idx);
        let expr = *self.cir.expr(idx);
        trace!(?idx, "infer expression");

        match expr {
            Expr::Int { value, suffix } => {
                let num = match suffix {
                    None => Num::NumUnbound(IntReq::for_value(value)),
                    Some(suffix) => num_for_suffix(suffix),
                };
                self.set_and_get(var, region, Content::Structure(FlatType::Num(num)))
            }
            Expr::Frac { suffix, .. } => {
                let num = match suffix {
                    None => Num::FracUnbound,
                    Some(suffix) if suffix.is_fractional() => num_for_suffix(suffix),
                    Some(_) => {
                        // An integer suffix on a fractional literal.
                        self.env.push_diagnostic(Diagnostic::NumberPrecisionMismatch {
                            region,
                            first: "Frac(*)".to_owned(),
                            second: "an integer precision".to_owned(),
                        });
                        Num::FracUnbound
                    }
                };
                self.set_and_get(var, region, Content::Structure(FlatType::Num(num)))
            }
            Expr::Scalar(value) => {
                let req = IntReq::for_value(i128::from(value));
                self.set_and_get(var, region, Content::Structure(FlatType::Num(Num::IntUnbound(req))))
            }
            Expr::StrSegment(_) => self.set_and_get(var, region, Content::Structure(FlatType::Str)),
            Expr::Str { segments } => {
                for &segment in &self.cir.expr_span(segments).to_vec() {
                    let segment_var = self.infer_expr(segment);
                    let str_var = self
                        .store
                        .fresh_with(Content::Structure(FlatType::Str), self.rank);
                    let segment_region = self.cir.expr_region(segment);
                    self.unify_or_report(segment_var, str_var, segment_region, UnifyCtx::General);
                }
                self.set_and_get(var, region, Content::Structure(FlatType::Str))
            }

            Expr::LookupLocal { pattern } => {
                let bound = self.pattern_var(pattern);
                let resolved = if self.store.desc(bound).rank.is_generalized() {
                    self.store.instantiate(bound, self.rank)
                } else {
                    bound
                };
                self.unify_or_report(var, resolved, region, UnifyCtx::General);
                var
            }
            // External types come from the host's resolver, which is outside
            // this module's checking horizon: a fresh var per use site.
            Expr::LookupExternal { .. } => var,

            Expr::List { elems } => {
                let elems = self.cir.expr_span(elems).to_vec();
                if elems.is_empty() {
                    return self.set_and_get(var, region, Content::Structure(FlatType::ListUnbound));
                }
                let elem_var = self.store.fresh(self.rank);
                for &elem in &elems {
                    let actual = self.infer_expr(elem);
                    let elem_region = self.cir.expr_region(elem);
                    self.unify_or_report(elem_var, actual, elem_region, UnifyCtx::ListElement);
                }
                self.set_and_get(var, region, Content::Structure(FlatType::List(elem_var)))
            }
            Expr::Tuple { elems } => {
                let elem_vars: Vec<Var> = self
                    .cir
                    .expr_span(elems)
                    .to_vec()
                    .into_iter()
                    .map(|elem| self.infer_expr(elem))
                    .collect();
                let elems = self.store.alloc_vars(elem_vars);
                self.set_and_get(var, region, Content::Structure(FlatType::Tuple(elems)))
            }
            Expr::Record { fields } => {
                let field_vars: Vec<(Ident, Var)> = self
                    .cir
                    .fields(fields)
                    .to_vec()
                    .into_iter()
                    .map(|field| (field.name, self.infer_expr(field.value)))
                    .collect();
                let fields = self.store.alloc_fields(field_vars);
                self.set_and_get(var, region, Content::Structure(FlatType::RecordUnbound { fields }))
            }
            Expr::EmptyRecord => {
                self.set_and_get(var, region, Content::Structure(FlatType::EmptyRecord))
            }

            Expr::FieldAccess { receiver, field } => {
                let receiver_var = self.infer_expr(receiver);
                let field_var = self.store.fresh(self.rank);
                let ext = self.store.fresh(self.rank);
                let fields = self.store.alloc_fields([(field, field_var)]);
                let wanted = self.store.fresh_with(
                    Content::Structure(FlatType::Record { fields, ext }),
                    self.rank,
                );
                self.unify_or_report(receiver_var, wanted, region, UnifyCtx::General);
                self.unify_or_report(var, field_var, region, UnifyCtx::General);
                var
            }
            Expr::TupleAccess { receiver, index } => {
                let receiver_var = self.infer_expr(receiver);
                // Tuples have no row polymorphism; peek at the shape.
                match self.store.content(receiver_var) {
                    Content::Structure(FlatType::Tuple(elems))
                        if (index as usize) < elems.count() =>
                    {
                        let elem = self.store.vars(elems)[index as usize];
                        self.unify_or_report(var, elem, region, UnifyCtx::General);
                    }
                    Content::Err => {
                        self.store.set_content(var, Content::Err);
                    }
                    _ => {
                        let found =
                            crate::render::render_var(&mut self.store, &self.env.idents, receiver_var);
                        self.env.push_diagnostic(Diagnostic::TypeMismatch {
                            region,
                            expected: format!("a tuple with at least {} elements", index + 1),
                            found,
                            path: String::new(),
                        });
                        self.store.set_content(var, Content::Err);
                    }
                }
                var
            }

            Expr::Tag { name, args } => {
                // The boolean tags are the nominal Bool type.
                let text = self.env.idents.text(name);
                if args.is_empty() && (text == "True" || text == "False") {
                    let bool_var = self.bool_var();
                    self.unify_or_report(var, bool_var, region, UnifyCtx::General);
                    return var;
                }
                let arg_vars: Vec<Var> = self
                    .cir
                    .expr_span(args)
                    .to_vec()
                    .into_iter()
                    .map(|arg| self.infer_expr(arg))
                    .collect();
                let payload = self.store.alloc_vars(arg_vars);
                let ext = self.store.fresh(self.rank);
                let tags = self.store.alloc_tags([(name, payload)]);
                self.set_and_get(var, region, Content::Structure(FlatType::TagUnion { tags, ext }))
            }

            Expr::Call { func, args } => {
                let func_var = self.infer_expr(func);
                let arg_vars: Vec<Var> = self
                    .cir
                    .expr_span(args)
                    .to_vec()
                    .into_iter()
                    .map(|arg| self.infer_expr(arg))
                    .collect();
                let args = self.store.alloc_vars(arg_vars);
                let wanted = self.store.fresh_with(
                    Content::Structure(FlatType::FnUnbound(Func { args, ret: var })),
                    self.rank,
                );
                self.unify_or_report(func_var, wanted, region, UnifyCtx::General);
                var
            }

            Expr::Binop { op, lhs, rhs } => self.infer_binop(var, op, lhs, rhs, region),
            Expr::And { lhs, rhs } | Expr::Or { lhs, rhs } => {
                let bool_var = self.bool_var();
                let lhs_var = self.infer_expr(lhs);
                self.unify_or_report(lhs_var, bool_var, self.cir.expr_region(lhs), UnifyCtx::General);
                let rhs_var = self.infer_expr(rhs);
                let bool_var = self.bool_var();
                self.unify_or_report(rhs_var, bool_var, self.cir.expr_region(rhs), UnifyCtx::General);
                let result = self.bool_var();
                self.unify_or_report(var, result, region, UnifyCtx::General);
                var
            }
            Expr::UnaryMinus { operand } => {
                let operand_var = self.infer_expr(operand);
                let req = IntReq {
                    sign_needed: true,
                    bits_needed: 0,
                };
                let num = self.store.fresh_with(
                    Content::Structure(FlatType::Num(Num::NumUnbound(req))),
                    self.rank,
                );
                self.unify_or_report(operand_var, num, region, UnifyCtx::General);
                self.unify_or_report(var, operand_var, region, UnifyCtx::General);
                var
            }
            Expr::UnaryNot { operand } => {
                let operand_var = self.infer_expr(operand);
                let bool_var = self.bool_var();
                self.unify_or_report(operand_var, bool_var, region, UnifyCtx::General);
                let result = self.bool_var();
                self.unify_or_report(var, result, region, UnifyCtx::General);
                var
            }

            Expr::Lambda { params, body, .. } => {
                let param_vars: Vec<Var> = self
                    .cir
                    .pattern_span(params)
                    .to_vec()
                    .into_iter()
                    .map(|param| self.infer_pattern(param))
                    .collect();
                let body_var = self.infer_expr(body);
                let args = self.store.alloc_vars(param_vars);
                self.set_and_get(
                    var,
                    region,
                    Content::Structure(FlatType::FnUnbound(Func { args, ret: body_var })),
                )
            }

            Expr::If { branches, final_else } => {
                let branches = self.cir.if_branches(branches).to_vec();
                for branch in &branches {
                    let cond_var = self.infer_expr(branch.cond);
                    let bool_var = self.bool_var();
                    let cond_region = self.cir.expr_region(branch.cond);
                    self.unify_or_report(cond_var, bool_var, cond_region, UnifyCtx::General);
                }
                for branch in &branches {
                    let body_var = self.infer_expr(branch.body);
                    let body_region = self.cir.expr_region(branch.body);
                    self.unify_or_report(var, body_var, body_region, UnifyCtx::IfBranch);
                }
                let else_var = self.infer_expr(final_else);
                let else_region = self.cir.expr_region(final_else);
                self.unify_or_report(var, else_var, else_region, UnifyCtx::IfBranch);
                var
            }

            Expr::Match { cond, branches } => self.infer_match(var, cond, branches, region),

            Expr::Block { stmts, result } => {
                for &stmt in &self.cir.stmt_span(stmts).to_vec() {
                    match *self.cir.stmt(stmt) {
                        Stmt::Def(def_idx) => {
                            self.check_def(def_idx);
                        }
                        Stmt::Expect { body } => {
                            let body_var = self.infer_expr(body);
                            let bool_var = self.bool_var();
                            let stmt_region = self.cir.stmt_region(stmt);
                            self.unify_or_report(
                                body_var,
                                bool_var,
                                stmt_region,
                                UnifyCtx::General,
                            );
                        }
                    }
                }
                let result_var = self.infer_expr(result);
                self.unify_or_report(var, result_var, region, UnifyCtx::General);
                var
            }

            Expr::Crash { message } => {
                let message_var = self.infer_expr(message);
                let str_var = self
                    .store
                    .fresh_with(Content::Structure(FlatType::Str), self.rank);
                let message_region = self.cir.expr_region(message);
                self.unify_or_report(message_var, str_var, message_region, UnifyCtx::General);
                // A crash never produces a value; its type unifies with
                // whatever the context wants.
                var
            }

            Expr::RuntimeError { .. } => {
                self.store.set_content(var, Content::Err);
                var
            }
        }
    }

    fn infer_binop(
        &mut self,
        var: Var,
        op: Binop,
        lhs: cir::ExprIdx,
        rhs: cir::ExprIdx,
        region: Region,
    ) -> Var {
        let lhs_var = self.infer_expr(lhs);
        let rhs_var = self.infer_expr(rhs);

        // The operand constraint depends on the operator family.
        let operand_constraint = match op {
            Binop::Add | Binop::Sub | Binop::Mul | Binop::Lt | Binop::Gt | Binop::Le | Binop::Ge => {
                Some(Num::NumUnbound(IntReq::default()))
            }
            Binop::Div => Some(Num::FracUnbound),
            Binop::DivTrunc | Binop::Rem => Some(Num::IntUnbound(IntReq::default())),
            Binop::Eq | Binop::Ne => None,
        };
        if let Some(num) = operand_constraint {
            let constraint = self
                .store
                .fresh_with(Content::Structure(FlatType::Num(num)), self.rank);
            self.unify_or_report(lhs_var, constraint, region, UnifyCtx::General);
        }
        self.unify_or_report(lhs_var, rhs_var, region, UnifyCtx::General);

        if op.is_comparison() {
            let bool_var = self.bool_var();
            self.unify_or_report(var, bool_var, region, UnifyCtx::General);
        } else {
            self.unify_or_report(var, lhs_var, region, UnifyCtx::General);
        }
        var
    }

    fn infer_match(
        &mut self,
        var: Var,
        cond: cir::ExprIdx,
        branches: cir::BranchSpan,
        _region: Region,
    ) -> Var {
        let cond_var = self.infer_expr(cond);
        let branches = self.cir.branches(branches).to_vec();

        // Duplicate literal patterns can never match; warn on the branch.
        let mut seen_literals: FxHashMap<LiteralKey, ()> = FxHashMap::default();

        for branch in &branches {
            for &pattern in &self.cir.pattern_span(branch.patterns).to_vec() {
                let pattern_var = self.infer_pattern(pattern);
                let pattern_region = self.cir.pattern_region(pattern);
                self.unify_or_report(cond_var, pattern_var, pattern_region, UnifyCtx::General);

                if let Some(key) = LiteralKey::of(self.cir.pattern(pattern)) {
                    if seen_literals.insert(key, ()).is_some() {
                        self.env
                            .push_diagnostic(Diagnostic::UnusedBranch { region: branch.region });
                    }
                }
            }
            let body_var = self.infer_expr(branch.body);
            self.unify_or_report(var, body_var, branch.region, UnifyCtx::MatchBranch);
        }

        // Record that this scrutinee's branches were checked.
        self.store.set_mark(cond_var, Mark::EXHAUSTIVENESS_CHECKED);
        var
    }

    // === Patterns ===

    fn infer_pattern(&mut self, idx: cir::PatternIdx) -> Var {
        grow_stack(|| self.infer_pattern_inner(idx))
    }

    fn infer_pattern_inner(&mut self, idx: cir::PatternIdx) -> Var {
        let var = self.pattern_var(idx);
        let region = self.cir.pattern_region(idx);
        match *self.cir.pattern(idx) {
            // A plain binding constrains nothing.
            Pattern::Bind { .. } | Pattern::Underscore => var,
            Pattern::IntLiteral { value } => self.set_and_get(
                var,
                region,
                Content::Structure(FlatType::Num(Num::NumUnbound(IntReq::for_value(value)))),
            ),
            Pattern::FracLiteral { .. } => {
                self.set_and_get(var, region, Content::Structure(FlatType::Num(Num::FracUnbound)))
            }
            Pattern::StrLiteral(_) => self.set_and_get(var, region, Content::Structure(FlatType::Str)),
            Pattern::Scalar(value) => self.set_and_get(
                var,
                region,
                Content::Structure(FlatType::Num(Num::IntUnbound(IntReq::for_value(
                    i128::from(value),
                )))),
            ),
            Pattern::Tag { name, args } => {
                let arg_vars: Vec<Var> = self
                    .cir
                    .pattern_span(args)
                    .to_vec()
                    .into_iter()
                    .map(|arg| self.infer_pattern(arg))
                    .collect();
                let payload = self.store.alloc_vars(arg_vars);
                let ext = self.store.fresh(self.rank);
                let tags = self.store.alloc_tags([(name, payload)]);
                self.set_and_get(var, region, Content::Structure(FlatType::TagUnion { tags, ext }))
            }
            Pattern::Record { destructs } => {
                let mut fields: Vec<(Ident, Var)> = Vec::new();
                for destruct in self.cir.destructs(destructs).to_vec() {
                    let sub_var = match destruct.kind {
                        DestructKind::Required(sub) | DestructKind::SubPattern(sub) => {
                            self.infer_pattern(sub)
                        }
                    };
                    fields.push((destruct.label, sub_var));
                }
                let fields = self.store.alloc_fields(fields);
                // Destructuring requires at least these fields; more may
                // exist behind the extension.
                let ext = self.store.fresh(self.rank);
                self.set_and_get(var, region, Content::Structure(FlatType::Record { fields, ext }))
            }
            Pattern::Tuple { patterns } => {
                let elem_vars: Vec<Var> = self
                    .cir
                    .pattern_span(patterns)
                    .to_vec()
                    .into_iter()
                    .map(|elem| self.infer_pattern(elem))
                    .collect();
                let elems = self.store.alloc_vars(elem_vars);
                self.set_and_get(var, region, Content::Structure(FlatType::Tuple(elems)))
            }
            Pattern::List { before, rest, after } => {
                let elem_var = self.store.fresh(self.rank);
                let all: Vec<cir::PatternIdx> = self
                    .cir
                    .pattern_span(before)
                    .iter()
                    .chain(self.cir.pattern_span(after).iter())
                    .copied()
                    .collect();
                for sub in all {
                    let sub_var = self.infer_pattern(sub);
                    let sub_region = self.cir.pattern_region(sub);
                    self.unify_or_report(elem_var, sub_var, sub_region, UnifyCtx::ListElement);
                }
                if let Some(cir::ListRest { pattern: Some(rest_pattern) }) = rest {
                    let rest_var = self.infer_pattern(rest_pattern);
                    let list = self.store.fresh_with(
                        Content::Structure(FlatType::List(elem_var)),
                        self.rank,
                    );
                    self.unify_or_report(rest_var, list, region, UnifyCtx::General);
                }
                self.set_and_get(var, region, Content::Structure(FlatType::List(elem_var)))
            }
            Pattern::RuntimeError { .. } => {
                self.store.set_content(var, Content::Err);
                var
            }
        }
    }

    // === Annotations ===

    fn anno_to_var(&mut self, idx: cir::AnnoIdx, rigids: &mut FxHashMap<Ident, Var>) -> Var {
        grow_stack(|| self.anno_to_var_inner(idx, rigids))
    }

    fn anno_to_var_inner(
        &mut self,
        idx: cir::AnnoIdx,
        rigids: &mut FxHashMap<Ident, Var>,
    ) -> Var {
        match *self.cir.anno(idx) {
            Anno::Var { name } => {
                if let Some(&var) = rigids.get(&name) {
                    return var;
                }
                let var = self.store.fresh_with(Content::RigidVar(name), self.rank);
                rigids.insert(name, var);
                var
            }
            Anno::Underscore => self.store.fresh(self.rank),
            Anno::Error => self.store.fresh_with(Content::Err, self.rank),
            Anno::Apply { target, args } => {
                let arg_vars: Vec<Var> = self
                    .cir
                    .anno_span(args)
                    .to_vec()
                    .into_iter()
                    .map(|arg| self.anno_to_var(arg, rigids))
                    .collect();
                self.apply_to_var(target, arg_vars)
            }
            Anno::Fn { args, ret, effectful } => {
                let arg_vars: Vec<Var> = self
                    .cir
                    .anno_span(args)
                    .to_vec()
                    .into_iter()
                    .map(|arg| self.anno_to_var(arg, rigids))
                    .collect();
                let ret = self.anno_to_var(ret, rigids);
                let args = self.store.alloc_vars(arg_vars);
                let func = Func { args, ret };
                let flat = if effectful {
                    FlatType::FnEffectful(func)
                } else {
                    FlatType::FnPure(func)
                };
                self.store.fresh_with(Content::Structure(flat), self.rank)
            }
            Anno::Record { fields, ext } => {
                let field_vars: Vec<(Ident, Var)> = self
                    .cir
                    .anno_fields(fields)
                    .to_vec()
                    .into_iter()
                    .map(|field| (field.name, self.anno_to_var(field.anno, rigids)))
                    .collect();
                let fields = self.store.alloc_fields(field_vars);
                let ext = match ext {
                    Some(ext) => self.anno_to_var(ext, rigids),
                    None => self
                        .store
                        .fresh_with(Content::Structure(FlatType::EmptyRecord), self.rank),
                };
                self.store.fresh_with(
                    Content::Structure(FlatType::Record { fields, ext }),
                    self.rank,
                )
            }
            Anno::TagUnion { tags, ext } => {
                let tag_vars: Vec<(Ident, crate::VarSlice)> = self
                    .cir
                    .anno_tags(tags)
                    .to_vec()
                    .into_iter()
                    .map(|tag| {
                        let payload: Vec<Var> = self
                            .cir
                            .anno_span(tag.args)
                            .to_vec()
                            .into_iter()
                            .map(|arg| self.anno_to_var(arg, rigids))
                            .collect();
                        (tag.name, self.store.alloc_vars(payload))
                    })
                    .collect();
                let tags = self.store.alloc_tags(tag_vars);
                let ext = match ext {
                    Some(ext) => self.anno_to_var(ext, rigids),
                    None => self
                        .store
                        .fresh_with(Content::Structure(FlatType::EmptyTagUnion), self.rank),
                };
                self.store.fresh_with(
                    Content::Structure(FlatType::TagUnion { tags, ext }),
                    self.rank,
                )
            }
            Anno::Tuple { elems } => {
                let elem_vars: Vec<Var> = self
                    .cir
                    .anno_span(elems)
                    .to_vec()
                    .into_iter()
                    .map(|elem| self.anno_to_var(elem, rigids))
                    .collect();
                let elems = self.store.alloc_vars(elem_vars);
                self.store
                    .fresh_with(Content::Structure(FlatType::Tuple(elems)), self.rank)
            }
        }
    }

    fn apply_to_var(&mut self, target: TypeRef, args: Vec<Var>) -> Var {
        match target {
            TypeRef::Builtin(builtin) => self.builtin_to_var(builtin, args),
            // External types resolve through the host; unconstrained here.
            TypeRef::External(_) => self.store.fresh(self.rank),
            TypeRef::Local(decl_idx) => self.expand_type_decl(decl_idx, args),
        }
    }

    fn builtin_to_var(&mut self, builtin: BuiltinType, args: Vec<Var>) -> Var {
        use crate::types::{FracPrecision, IntPrecision};
        let num = |num: Num| Content::Structure(FlatType::Num(num));
        let arg = |checker: &mut Self, args: Vec<Var>| {
            args.first().copied().unwrap_or_else(|| checker.store.fresh(checker.rank))
        };
        let content = match builtin {
            BuiltinType::Str => Content::Structure(FlatType::Str),
            BuiltinType::Bool => return self.bool_var(),
            BuiltinType::List => {
                let elem = arg(self, args);
                Content::Structure(FlatType::List(elem))
            }
            BuiltinType::Box => {
                let elem = arg(self, args);
                Content::Structure(FlatType::Box(elem))
            }
            BuiltinType::Num => {
                if args.is_empty() {
                    num(Num::NumUnbound(IntReq::default()))
                } else {
                    num(Num::NumPoly(args[0]))
                }
            }
            BuiltinType::Int => {
                if args.is_empty() {
                    num(Num::IntUnbound(IntReq::default()))
                } else {
                    num(Num::IntPoly(args[0]))
                }
            }
            BuiltinType::Frac => {
                if args.is_empty() {
                    num(Num::FracUnbound)
                } else {
                    num(Num::FracPoly(args[0]))
                }
            }
            BuiltinType::I8 => num(Num::IntPrecision(IntPrecision::I8)),
            BuiltinType::I16 => num(Num::IntPrecision(IntPrecision::I16)),
            BuiltinType::I32 => num(Num::IntPrecision(IntPrecision::I32)),
            BuiltinType::I64 => num(Num::IntPrecision(IntPrecision::I64)),
            BuiltinType::I128 => num(Num::IntPrecision(IntPrecision::I128)),
            BuiltinType::U8 => num(Num::IntPrecision(IntPrecision::U8)),
            BuiltinType::U16 => num(Num::IntPrecision(IntPrecision::U16)),
            BuiltinType::U32 => num(Num::IntPrecision(IntPrecision::U32)),
            BuiltinType::U64 => num(Num::IntPrecision(IntPrecision::U64)),
            BuiltinType::U128 => num(Num::IntPrecision(IntPrecision::U128)),
            BuiltinType::F32 => num(Num::FracPrecision(FracPrecision::F32)),
            BuiltinType::F64 => num(Num::FracPrecision(FracPrecision::F64)),
            BuiltinType::Dec => num(Num::FracPrecision(FracPrecision::Dec)),
        };
        self.store.fresh_with(content, self.rank)
    }

    /// Expand a local type declaration into an alias or nominal var.
    ///
    /// Re-entrancy ties the knot: a recursive reference inside the body
    /// resolves to the declaration's own in-flight var.
    fn expand_type_decl(&mut self, decl_idx: cir::TypeDeclIdx, args: Vec<Var>) -> Var {
        if let Some(&in_flight) = self.expanding.get(&decl_idx) {
            return in_flight;
        }
        let decl = *self.cir.type_decl(decl_idx);
        let placeholder = self.store.fresh(self.rank);
        self.expanding.insert(decl_idx, placeholder);

        // Bind the declaration's parameters to the provided arguments.
        let mut rigids = FxHashMap::default();
        let decl_args = self.cir.name_span(decl.args).to_vec();
        for (i, (name, _)) in decl_args.iter().enumerate() {
            let var = args
                .get(i)
                .copied()
                .unwrap_or_else(|| self.store.fresh(self.rank));
            rigids.insert(*name, var);
        }

        let backing = self.anno_to_var(decl.anno, &mut rigids);
        let args = self.store.alloc_vars(args);
        let content = match decl.kind {
            TypeDeclKind::Alias => Content::Alias {
                ident: decl.name,
                args,
                backing,
            },
            TypeDeclKind::Nominal => Content::Structure(FlatType::Nominal {
                ident: decl.name,
                args,
                backing,
                origin: None,
            }),
        };
        self.store.set_content(placeholder, content);
        self.expanding.remove(&decl_idx);
        placeholder
    }

    // === Helpers ===

    /// The nominal `Bool` type: `[False, True]` behind a nominal wrapper.
    fn bool_var(&mut self) -> Var {
        let bool_ident = self.env.idents.intern("Bool");
        let true_ident = self.env.idents.intern("True");
        let false_ident = self.env.idents.intern("False");
        let no_payload = self.store.alloc_vars([]);
        let no_payload2 = self.store.alloc_vars([]);
        let ext = self
            .store
            .fresh_with(Content::Structure(FlatType::EmptyTagUnion), self.rank);
        let tags = self
            .store
            .alloc_tags([(true_ident, no_payload), (false_ident, no_payload2)]);
        let backing = self.store.fresh_with(
            Content::Structure(FlatType::TagUnion { tags, ext }),
            self.rank,
        );
        let args = self.store.alloc_vars([]);
        self.store.fresh_with(
            Content::Structure(FlatType::Nominal {
                ident: bool_ident,
                args,
                backing,
                origin: None,
            }),
            self.rank,
        )
    }

    fn set_and_get(&mut self, var: Var, region: Region, content: Content) -> Var {
        // Unify rather than overwrite: the var may already carry
        // constraints from a forward reference.
        let fresh = self.store.fresh_with(content, self.rank);
        self.unify_or_report(var, fresh, region, UnifyCtx::General);
        var
    }

    fn unify_or_report(&mut self, a: Var, b: Var, region: Region, ctx: UnifyCtx) -> bool {
        match unify(&mut self.store, &self.env.idents, a, b) {
            Ok(()) => true,
            Err(mismatch) => {
                self.report_mismatch(mismatch, region, ctx);
                false
            }
        }
    }

    fn report_mismatch(&mut self, mismatch: Mismatch, region: Region, ctx: UnifyCtx) {
        let Mismatch {
            kind,
            expected,
            found,
            path,
        } = mismatch;
        let diagnostic = match (ctx, kind) {
            (_, MismatchKind::IntPrecisionMismatch | MismatchKind::FracPrecisionMismatch) => {
                Diagnostic::NumberPrecisionMismatch {
                    region,
                    first: expected,
                    second: found,
                }
            }
            (UnifyCtx::ListElement, _) => Diagnostic::IncompatibleListElements {
                region,
                first: expected,
                second: found,
            },
            (UnifyCtx::IfBranch, _) => Diagnostic::IncompatibleIfBranches {
                region,
                first: expected,
                second: found,
            },
            (UnifyCtx::MatchBranch, _) => Diagnostic::IncompatibleMatchBranches {
                region,
                first: expected,
                second: found,
            },
            (UnifyCtx::General, _) => Diagnostic::TypeMismatch {
                region,
                expected,
                found,
                path,
            },
        };
        self.env.push_diagnostic(diagnostic);
    }
}

/// Key for duplicate-literal detection in match branches.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
enum LiteralKey {
    Int(i128),
    Frac(u64),
    Str(rill_ir::StringLit),
    Scalar(u32),
}

impl LiteralKey {
    fn of(pattern: &Pattern) -> Option<LiteralKey> {
        match *pattern {
            Pattern::IntLiteral { value } => Some(LiteralKey::Int(value)),
            Pattern::FracLiteral { bits } => Some(LiteralKey::Frac(bits)),
            Pattern::StrLiteral(lit) => Some(LiteralKey::Str(lit)),
            Pattern::Scalar(value) => Some(LiteralKey::Scalar(value)),
            _ => None,
        }
    }
}
