//! The lowering pass itself.
//!
//! Top-level processing runs in ordered passes so that mutually recursive
//! types and values resolve:
//!
//! 1. imports and type declaration *names*
//! 2. type declaration bodies
//! 3. top-level definition *patterns*
//! 4. definition bodies, annotations, and expects
//!
//! Inside blocks, statements are sequential; each def's pattern is
//! introduced before its own body is lowered, which is what allows direct
//! recursion through a `let`.

use crate::scope::{Introduced, Scope, TypeBinding, ValueBinding};
use crate::CanonOutput;
use rill_ir::ast::{self, AstBinOp, AstUnaryOp, ExprKind, Header, PatternKind, StmtKind};
use rill_ir::cir::{
    self, Binop, Capture, Def, DefKind, Destruct, DestructKind, Expr, ExternalDecl, ExternalKind,
    Field, Pattern, RuntimeErrorKind, Stmt, TypeDecl,
};
use rill_ir::{AstStore, CirStore, Diagnostic, Ident, ModuleEnv, ModuleId, Region};
use rill_stack::grow_stack;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::debug;

pub(crate) struct Canonicalizer<'a> {
    ast: &'a AstStore,
    pub(crate) env: &'a mut ModuleEnv,
    pub(crate) cir: CirStore,
    pub(crate) scope: Scope,
    /// Capture sets of in-flight lambdas, innermost last.
    lambda_frames: Vec<Vec<Capture>>,
    /// `name : anno` waiting for its `name = …`.
    pending_annos: FxHashMap<Ident, cir::AnnoIdx>,
    /// Import alias or last path component → module handle.
    pub(crate) module_aliases: FxHashMap<Ident, ModuleId>,
    /// Dedup for external declarations.
    externals: FxHashMap<(ModuleId, Ident, ExternalKind), cir::ExternalDeclIdx>,
    /// Top-level value names, for exposes validation.
    top_level_values: FxHashMap<Ident, Region>,
    /// Top-level type names, for exposes validation.
    top_level_types: FxHashMap<Ident, Region>,
}

impl<'a> Canonicalizer<'a> {
    pub(crate) fn new(ast: &'a AstStore, env: &'a mut ModuleEnv) -> Self {
        Canonicalizer {
            ast,
            env,
            cir: CirStore::new(),
            scope: Scope::new(),
            lambda_frames: Vec::new(),
            pending_annos: FxHashMap::default(),
            module_aliases: FxHashMap::default(),
            externals: FxHashMap::default(),
            top_level_values: FxHashMap::default(),
            top_level_types: FxHashMap::default(),
        }
    }

    /// The AST being lowered.
    pub(crate) fn ast(&self) -> &'a AstStore {
        self.ast
    }

    pub(crate) fn run(&mut self, header: &Header, stmts: &[ast::StmtIdx]) -> CanonOutput {
        // Pass 1: imports and type declaration names.
        let mut decl_indices: FxHashMap<ast::StmtIdx, cir::TypeDeclIdx> = FxHashMap::default();
        for &stmt in stmts {
            match self.ast.stmt_kind(stmt) {
                StmtKind::Import(import) => self.register_import(*self.ast.import(*import)),
                StmtKind::TypeDecl { header, kind, .. } => {
                    let idx = self.register_type_decl(*header, *kind);
                    decl_indices.insert(stmt, idx);
                }
                _ => {}
            }
        }

        // Pass 2: type declaration bodies.
        for &stmt in stmts {
            if let StmtKind::TypeDecl { anno, .. } = self.ast.stmt_kind(stmt) {
                if let Some(&idx) = decl_indices.get(&stmt) {
                    let lowered = self.lower_anno(*anno);
                    self.cir.set_type_decl_anno(idx, lowered);
                }
            }
        }

        // Pass 3: top-level definition patterns, so defs see each other.
        let mut decl_patterns: FxHashMap<ast::StmtIdx, cir::PatternIdx> = FxHashMap::default();
        for &stmt in stmts {
            if let StmtKind::Decl { pattern, .. } = self.ast.stmt_kind(stmt) {
                let lowered = self.lower_pattern(*pattern);
                self.collect_top_level_names(lowered);
                decl_patterns.insert(stmt, lowered);
            }
        }

        // Pass 4: bodies, annotations, expects, and top-level validation.
        let mut defs = Vec::new();
        let mut expects = Vec::new();
        for &stmt in stmts {
            let region = self.ast.stmt_region(stmt);
            match self.ast.stmt_kind(stmt) {
                StmtKind::Decl { pattern, body } => {
                    let Some(&lowered_pattern) = decl_patterns.get(&stmt) else { continue };
                    let lowered_body = self.lower_expr(*body);
                    let annotation = self.take_pending_anno(*pattern);
                    let kind = match self.ast.pattern_kind(*pattern) {
                        PatternKind::Underscore => DefKind::Ignored,
                        _ => DefKind::Let,
                    };
                    defs.push(self.cir.alloc_def(Def {
                        pattern: lowered_pattern,
                        pattern_region: self.ast.pattern_region(*pattern),
                        expr: lowered_body,
                        expr_region: self.ast.expr_region(*body),
                        annotation,
                        kind,
                    }));
                }
                StmtKind::TypeAnno { name, anno } => {
                    let lowered = self.lower_anno(*anno);
                    self.pending_annos.insert(*name, lowered);
                }
                StmtKind::Expect { body } => {
                    let lowered = self.lower_expr(*body);
                    expects.push(
                        self.cir.alloc_stmt(Stmt::Expect { body: lowered }, region),
                    );
                }
                StmtKind::Import(_) | StmtKind::TypeDecl { .. } | StmtKind::Malformed(_) => {}
                StmtKind::Expr(_) => {
                    self.env
                        .push_diagnostic(Diagnostic::InvalidTopLevelStatement { region });
                }
            }
        }

        self.validate_exposes(header);

        let mut type_decls = Vec::new();
        for i in 0..self.cir.type_decl_count() {
            type_decls.push(cir::TypeDeclIdx::new(i as u32));
        }

        CanonOutput {
            cir: std::mem::take(&mut self.cir),
            defs,
            expects,
            type_decls,
        }
    }

    // === Imports & externals ===

    fn register_import(&mut self, import: ast::Import) {
        let module_name = self.env.idents.text(import.module).to_owned();
        let shorthand = import
            .shorthand
            .map(|s| self.env.idents.text(s).to_owned());
        let module = self
            .env
            .modules
            .get_or_insert(&module_name, shorthand.as_deref());

        // The module is referenced by its alias, or its last component.
        let local_name = match import.alias {
            Some(alias) => alias,
            None => {
                let last = module_name.rsplit('.').next().unwrap_or(&module_name);
                let last = last.to_owned();
                self.env.idents.intern(&last)
            }
        };
        self.module_aliases.insert(local_name, module);

        // Exposed names enter scope as external declarations. Capitalized
        // names are types, the rest are values.
        for &(name, region) in self.ast.name_span(import.exposing) {
            let text = self.env.idents.text(name);
            let is_type = text.chars().next().is_some_and(char::is_uppercase);
            self.env.idents.set_origin(name, module);
            if is_type {
                let external = self.external_decl(module, name, ExternalKind::Type);
                self.scope
                    .introduce_type(name, TypeBinding::External(external), region);
            } else {
                let external = self.external_decl(module, name, ExternalKind::Value);
                self.scope
                    .introduce_value(name, ValueBinding::External(external), region);
            }
        }
    }

    pub(crate) fn external_decl(
        &mut self,
        module: ModuleId,
        name: Ident,
        kind: ExternalKind,
    ) -> cir::ExternalDeclIdx {
        if let Some(&existing) = self.externals.get(&(module, name, kind)) {
            return existing;
        }
        let idx = self.cir.alloc_external_decl(ExternalDecl { module, name, kind });
        self.externals.insert((module, name, kind), idx);
        idx
    }

    // === Type declarations ===

    fn register_type_decl(
        &mut self,
        header: ast::TypeHeaderIdx,
        kind: ast::TypeDeclKind,
    ) -> cir::TypeDeclIdx {
        let header = *self.ast.type_header(header);
        let args: Vec<(Ident, Region)> = self.ast.name_span(header.args).to_vec();
        let args = self.cir.alloc_name_span(args);
        // The body is patched in by the second pass.
        let placeholder = self.cir.alloc_anno(cir::Anno::Error, header.name_region);
        let kind = match kind {
            ast::TypeDeclKind::Alias => cir::TypeDeclKind::Alias,
            ast::TypeDeclKind::Nominal => cir::TypeDeclKind::Nominal,
        };
        let idx = self.cir.alloc_type_decl(TypeDecl {
            name: header.name,
            name_region: header.name_region,
            args,
            anno: placeholder,
            kind,
        });

        match self
            .scope
            .introduce_type(header.name, TypeBinding::Local(idx), header.name_region)
        {
            Introduced::Duplicate { original } => {
                self.env.push_diagnostic(Diagnostic::TypeRedeclared {
                    name: header.name,
                    region: header.name_region,
                    original,
                });
            }
            Introduced::Shadows { .. } | Introduced::Fresh => {}
        }
        self.top_level_types
            .entry(header.name)
            .or_insert(header.name_region);
        idx
    }

    // === Patterns ===

    pub(crate) fn lower_pattern(&mut self, pattern: ast::PatternIdx) -> cir::PatternIdx {
        grow_stack(|| self.lower_pattern_inner(pattern))
    }

    fn lower_pattern_inner(&mut self, pattern: ast::PatternIdx) -> cir::PatternIdx {
        let region = self.ast.pattern_region(pattern);
        match *self.ast.pattern_kind(pattern) {
            PatternKind::Ident(ident) => self.bind_ident(ident, region),
            PatternKind::Underscore => self.cir.alloc_pattern(Pattern::Underscore, region),
            PatternKind::Int { value } => {
                self.cir.alloc_pattern(Pattern::IntLiteral { value }, region)
            }
            PatternKind::Frac { bits } => {
                self.cir.alloc_pattern(Pattern::FracLiteral { bits }, region)
            }
            PatternKind::Str(lit) => self.cir.alloc_pattern(Pattern::StrLiteral(lit), region),
            PatternKind::SingleQuote(scalar) => {
                self.cir.alloc_pattern(Pattern::Scalar(scalar), region)
            }
            PatternKind::Tag { name, args } => {
                let lowered: SmallVec<[cir::PatternIdx; 4]> = self
                    .ast
                    .pattern_span(args)
                    .to_vec()
                    .into_iter()
                    .map(|arg| self.lower_pattern(arg))
                    .collect();
                let args = self.cir.alloc_pattern_span(lowered);
                self.cir.alloc_pattern(Pattern::Tag { name, args }, region)
            }
            PatternKind::Record { fields } => {
                let mut destructs = Vec::new();
                for field in self.ast.pattern_fields(fields).to_vec() {
                    let kind = match field.sub {
                        None => DestructKind::Required(self.bind_ident(field.name, field.region)),
                        Some(sub) => DestructKind::SubPattern(self.lower_pattern(sub)),
                    };
                    destructs.push(Destruct {
                        label: field.name,
                        region: field.region,
                        kind,
                    });
                }
                let destructs = self.cir.alloc_destructs(destructs);
                self.cir.alloc_pattern(Pattern::Record { destructs }, region)
            }
            PatternKind::Tuple { items } => {
                let lowered: Vec<_> = self
                    .ast
                    .pattern_span(items)
                    .to_vec()
                    .into_iter()
                    .map(|item| self.lower_pattern(item))
                    .collect();
                let patterns = self.cir.alloc_pattern_span(lowered);
                self.cir.alloc_pattern(Pattern::Tuple { patterns }, region)
            }
            PatternKind::List { before, rest, after } => {
                let before_lowered: Vec<_> = self
                    .ast
                    .pattern_span(before)
                    .to_vec()
                    .into_iter()
                    .map(|item| self.lower_pattern(item))
                    .collect();
                let after_lowered: Vec<_> = self
                    .ast
                    .pattern_span(after)
                    .to_vec()
                    .into_iter()
                    .map(|item| self.lower_pattern(item))
                    .collect();
                let rest = rest.map(|rest| cir::ListRest {
                    pattern: rest.name.map(|name| self.bind_ident(name, region)),
                });
                let before = self.cir.alloc_pattern_span(before_lowered);
                let after = self.cir.alloc_pattern_span(after_lowered);
                self.cir
                    .alloc_pattern(Pattern::List { before, rest, after }, region)
            }
            PatternKind::Malformed(_) => self.cir.alloc_pattern(
                Pattern::RuntimeError {
                    kind: RuntimeErrorKind::MalformedSyntax,
                },
                region,
            ),
        }
    }

    /// Allocate a `Bind` pattern and introduce it into scope.
    fn bind_ident(&mut self, ident: Ident, region: Region) -> cir::PatternIdx {
        let idx = self.cir.alloc_pattern(Pattern::Bind { ident }, region);
        match self
            .scope
            .introduce_value(ident, ValueBinding::Local(idx), region)
        {
            Introduced::Fresh => {}
            Introduced::Duplicate { original } => {
                self.env.push_diagnostic(Diagnostic::IdentAlreadyInScope {
                    ident,
                    region,
                    original,
                });
            }
            Introduced::Shadows { original } => {
                self.env.push_diagnostic(Diagnostic::ShadowingWarning {
                    ident,
                    region,
                    original,
                });
            }
        }
        idx
    }

    /// Record names bound by a top-level pattern for exposes validation.
    fn collect_top_level_names(&mut self, pattern: cir::PatternIdx) {
        match *self.cir.pattern(pattern) {
            Pattern::Bind { ident } => {
                let region = self.cir.pattern_region(pattern);
                self.top_level_values.entry(ident).or_insert(region);
            }
            Pattern::Tag { args, .. } => {
                for &arg in self.cir.pattern_span(args).to_vec().iter() {
                    self.collect_top_level_names(arg);
                }
            }
            Pattern::Tuple { patterns } => {
                for &item in self.cir.pattern_span(patterns).to_vec().iter() {
                    self.collect_top_level_names(item);
                }
            }
            Pattern::Record { destructs } => {
                for destruct in self.cir.destructs(destructs).to_vec() {
                    match destruct.kind {
                        DestructKind::Required(p) | DestructKind::SubPattern(p) => {
                            self.collect_top_level_names(p);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn take_pending_anno(&mut self, pattern: ast::PatternIdx) -> Option<cir::AnnoIdx> {
        if let PatternKind::Ident(ident) = self.ast.pattern_kind(pattern) {
            return self.pending_annos.remove(ident);
        }
        None
    }

    // === Expressions ===

    pub(crate) fn lower_expr(&mut self, expr: ast::ExprIdx) -> cir::ExprIdx {
        grow_stack(|| self.lower_expr_inner(expr))
    }

    fn lower_expr_inner(&mut self, expr: ast::ExprIdx) -> cir::ExprIdx {
        let region = self.ast.expr_region(expr);
        match *self.ast.expr_kind(expr) {
            ExprKind::Int { value, suffix, .. } => {
                self.cir.alloc_expr(Expr::Int { value, suffix }, region)
            }
            ExprKind::Frac { bits, suffix } => {
                self.cir.alloc_expr(Expr::Frac { bits, suffix }, region)
            }
            ExprKind::SingleQuote(scalar) => self.cir.alloc_expr(Expr::Scalar(scalar), region),
            ExprKind::Str { segments } => self.lower_str(segments, region),
            ExprKind::StrPart(lit) => self.cir.alloc_expr(Expr::StrSegment(lit), region),
            ExprKind::Var(ident) => self.lower_var(ident, region),
            ExprKind::Tag(name) => {
                let args = self.cir.alloc_expr_span([]);
                self.cir.alloc_expr(Expr::Tag { name, args }, region)
            }
            ExprKind::ModuleAccess { module, name } => self.lower_module_access(module, name, region),
            ExprKind::FieldAccess { receiver, field } => {
                let receiver = self.lower_expr(receiver);
                self.cir
                    .alloc_expr(Expr::FieldAccess { receiver, field }, region)
            }
            ExprKind::TupleAccess { receiver, index } => {
                let receiver = self.lower_expr(receiver);
                self.cir
                    .alloc_expr(Expr::TupleAccess { receiver, index }, region)
            }
            ExprKind::List { items } => {
                let lowered: Vec<_> = self
                    .ast
                    .expr_span(items)
                    .to_vec()
                    .into_iter()
                    .map(|item| self.lower_expr(item))
                    .collect();
                let elems = self.cir.alloc_expr_span(lowered);
                self.cir.alloc_expr(Expr::List { elems }, region)
            }
            ExprKind::Tuple { items } => {
                let items = self.ast.expr_span(items).to_vec();
                match items.as_slice() {
                    [] => self.cir.alloc_expr(Expr::EmptyRecord, region),
                    [single] => self.lower_expr(*single),
                    _ => {
                        let lowered: Vec<_> =
                            items.into_iter().map(|item| self.lower_expr(item)).collect();
                        let elems = self.cir.alloc_expr_span(lowered);
                        self.cir.alloc_expr(Expr::Tuple { elems }, region)
                    }
                }
            }
            ExprKind::Record { fields } => {
                let fields = self.ast.record_fields(fields).to_vec();
                if fields.is_empty() {
                    return self.cir.alloc_expr(Expr::EmptyRecord, region);
                }
                let mut lowered = Vec::with_capacity(fields.len());
                for field in fields {
                    let value = match field.value {
                        Some(value) => self.lower_expr(value),
                        // Shorthand `{ x }` is `{ x: x }`.
                        None => self.lower_var(field.name, field.name_region),
                    };
                    lowered.push(Field {
                        name: field.name,
                        value,
                    });
                }
                let fields = self.cir.alloc_fields(lowered);
                self.cir.alloc_expr(Expr::Record { fields }, region)
            }
            ExprKind::Apply { func, args } => self.lower_apply(func, args, region),
            ExprKind::BinOp { op, lhs, rhs } => self.lower_binop(op, lhs, rhs, region),
            ExprKind::Unary { op, operand } => {
                let operand = self.lower_expr(operand);
                let expr = match op {
                    AstUnaryOp::Negate => Expr::UnaryMinus { operand },
                    AstUnaryOp::Not => Expr::UnaryNot { operand },
                };
                self.cir.alloc_expr(expr, region)
            }
            ExprKind::Lambda { params, body } => self.lower_lambda(params, body, region),
            ExprKind::If { branches, final_else } => {
                let lowered: Vec<_> = self
                    .ast
                    .if_branches(branches)
                    .to_vec()
                    .into_iter()
                    .map(|branch| cir::IfBranch {
                        cond: self.lower_expr(branch.cond),
                        body: self.lower_expr(branch.body),
                    })
                    .collect();
                let final_else = self.lower_expr(final_else);
                let branches = self.cir.alloc_if_branches(lowered);
                self.cir
                    .alloc_expr(Expr::If { branches, final_else }, region)
            }
            ExprKind::Match { cond, arms } => self.lower_match(cond, arms, region),
            ExprKind::Block { stmts } => self.lower_block(stmts, region),
            ExprKind::Crash { message } => {
                let message = self.lower_expr(message);
                self.cir.alloc_expr(Expr::Crash { message }, region)
            }
            ExprKind::Malformed(_) => self.runtime_error(RuntimeErrorKind::MalformedSyntax, region),
        }
    }

    /// A `RuntimeError` node. The diagnostic is the caller's business: parse
    /// malformations were already reported by the parser.
    pub(crate) fn runtime_error(
        &mut self,
        kind: RuntimeErrorKind,
        region: Region,
    ) -> cir::ExprIdx {
        self.cir.alloc_expr(Expr::RuntimeError { kind }, region)
    }

    fn lower_var(&mut self, ident: Ident, region: Region) -> cir::ExprIdx {
        match self.scope.lookup_value_with_crossings(ident) {
            Some((ValueBinding::Local(pattern), crossings)) => {
                if crossings > 0 && !self.scope.is_module_level(ident) {
                    self.record_capture(pattern, ident, crossings);
                }
                self.cir.alloc_expr(Expr::LookupLocal { pattern }, region)
            }
            Some((ValueBinding::External(external), _)) => self
                .cir
                .alloc_expr(Expr::LookupExternal { external }, region),
            None => {
                debug!(ident = self.env.idents.text(ident), "ident not in scope");
                self.env
                    .push_diagnostic(Diagnostic::IdentNotInScope { ident, region });
                self.runtime_error(RuntimeErrorKind::IdentNotInScope, region)
            }
        }
    }

    /// Add a capture to every lambda frame between the binding and the use.
    fn record_capture(&mut self, pattern: cir::PatternIdx, ident: Ident, crossings: usize) {
        let total = self.lambda_frames.len();
        let crossed = crossings.min(total);
        for frame in &mut self.lambda_frames[total - crossed..] {
            if !frame.iter().any(|c| c.pattern == pattern) {
                frame.push(Capture { pattern, ident });
            }
        }
    }

    fn lower_module_access(
        &mut self,
        module: Ident,
        name: Ident,
        region: Region,
    ) -> cir::ExprIdx {
        let Some(&module_id) = self.module_aliases.get(&module) else {
            self.env.push_diagnostic(Diagnostic::IdentNotInScope {
                ident: module,
                region,
            });
            return self.runtime_error(RuntimeErrorKind::IdentNotInScope, region);
        };
        self.env.idents.set_origin(name, module_id);
        let external = self.external_decl(module_id, name, ExternalKind::Value);
        self.cir.alloc_expr(Expr::LookupExternal { external }, region)
    }

    fn lower_str(&mut self, segments: ast::ExprSpan, region: Region) -> cir::ExprIdx {
        let lowered: Vec<_> = self
            .ast
            .expr_span(segments)
            .to_vec()
            .into_iter()
            .map(|segment| self.lower_expr(segment))
            .collect();
        let segments = self.cir.alloc_expr_span(lowered);
        self.cir.alloc_expr(Expr::Str { segments }, region)
    }

    fn lower_apply(
        &mut self,
        func: ast::ExprIdx,
        args: ast::ExprSpan,
        region: Region,
    ) -> cir::ExprIdx {
        let arg_idxs = self.ast.expr_span(args).to_vec();
        // A tag applied to arguments is tag construction, not a call.
        if let ExprKind::Tag(name) = *self.ast.expr_kind(func) {
            let lowered: Vec<_> = arg_idxs
                .into_iter()
                .map(|arg| self.lower_expr(arg))
                .collect();
            let args = self.cir.alloc_expr_span(lowered);
            return self.cir.alloc_expr(Expr::Tag { name, args }, region);
        }
        let func = self.lower_expr(func);
        let lowered: Vec<_> = arg_idxs
            .into_iter()
            .map(|arg| self.lower_expr(arg))
            .collect();
        let args = self.cir.alloc_expr_span(lowered);
        self.cir.alloc_expr(Expr::Call { func, args }, region)
    }

    fn lower_binop(
        &mut self,
        op: AstBinOp,
        lhs: ast::ExprIdx,
        rhs: ast::ExprIdx,
        region: Region,
    ) -> cir::ExprIdx {
        // `lhs |> f(a)` is `f(lhs, a)`; `lhs |> f` is `f(lhs)`.
        if op == AstBinOp::Pizza {
            let lowered_lhs = self.lower_expr(lhs);
            if let ExprKind::Apply { func, args } = *self.ast.expr_kind(rhs) {
                if !matches!(*self.ast.expr_kind(func), ExprKind::Tag(_)) {
                    let func = self.lower_expr(func);
                    let mut all = vec![lowered_lhs];
                    for arg in self.ast.expr_span(args).to_vec() {
                        all.push(self.lower_expr(arg));
                    }
                    let args = self.cir.alloc_expr_span(all);
                    return self.cir.alloc_expr(Expr::Call { func, args }, region);
                }
            }
            let func = self.lower_expr(rhs);
            let args = self.cir.alloc_expr_span([lowered_lhs]);
            return self.cir.alloc_expr(Expr::Call { func, args }, region);
        }

        let lhs = self.lower_expr(lhs);
        let rhs = self.lower_expr(rhs);
        let expr = match op {
            AstBinOp::And => Expr::And { lhs, rhs },
            AstBinOp::Or => Expr::Or { lhs, rhs },
            AstBinOp::Add => Expr::Binop { op: Binop::Add, lhs, rhs },
            AstBinOp::Sub => Expr::Binop { op: Binop::Sub, lhs, rhs },
            AstBinOp::Mul => Expr::Binop { op: Binop::Mul, lhs, rhs },
            AstBinOp::Div => Expr::Binop { op: Binop::Div, lhs, rhs },
            AstBinOp::DivTrunc => Expr::Binop { op: Binop::DivTrunc, lhs, rhs },
            AstBinOp::Rem => Expr::Binop { op: Binop::Rem, lhs, rhs },
            AstBinOp::Eq => Expr::Binop { op: Binop::Eq, lhs, rhs },
            AstBinOp::Ne => Expr::Binop { op: Binop::Ne, lhs, rhs },
            AstBinOp::Lt => Expr::Binop { op: Binop::Lt, lhs, rhs },
            AstBinOp::Gt => Expr::Binop { op: Binop::Gt, lhs, rhs },
            AstBinOp::Le => Expr::Binop { op: Binop::Le, lhs, rhs },
            AstBinOp::Ge => Expr::Binop { op: Binop::Ge, lhs, rhs },
            AstBinOp::Pizza => unreachable!("handled above"),
        };
        self.cir.alloc_expr(expr, region)
    }

    fn lower_lambda(
        &mut self,
        params: ast::PatternSpan,
        body: ast::ExprIdx,
        region: Region,
    ) -> cir::ExprIdx {
        self.scope.push_function();
        self.lambda_frames.push(Vec::new());

        let lowered_params: Vec<_> = self
            .ast
            .pattern_span(params)
            .to_vec()
            .into_iter()
            .map(|param| self.lower_pattern(param))
            .collect();
        let lowered_body = self.lower_expr(body);

        let captures = self.lambda_frames.pop().unwrap_or_default();
        self.scope.pop();

        let params = self.cir.alloc_pattern_span(lowered_params);
        let captures = self.cir.alloc_captures(captures);
        self.cir.alloc_expr(
            Expr::Lambda {
                params,
                body: lowered_body,
                captures,
            },
            region,
        )
    }

    fn lower_match(
        &mut self,
        cond: ast::ExprIdx,
        arms: ast::MatchArmSpan,
        region: Region,
    ) -> cir::ExprIdx {
        let cond = self.lower_expr(cond);
        let mut branches = Vec::new();
        for arm in self.ast.match_arms(arms).to_vec() {
            self.scope.push();
            let ast_patterns = self.ast.pattern_span(arm.patterns).to_vec();
            let mut lowered_patterns = Vec::with_capacity(ast_patterns.len());
            for (i, pattern) in ast_patterns.into_iter().enumerate() {
                if i == 0 {
                    lowered_patterns.push(self.lower_pattern(pattern));
                } else {
                    // Later alternatives bind in a throwaway level so the
                    // shared names don't double-report.
                    self.scope.push();
                    lowered_patterns.push(self.lower_pattern(pattern));
                    self.scope.pop();
                }
            }
            let body = self.lower_expr(arm.body);
            self.scope.pop();
            let patterns = self.cir.alloc_pattern_span(lowered_patterns);
            branches.push(cir::Branch {
                patterns,
                body,
                region: arm.region,
            });
        }
        let branches = self.cir.alloc_branches(branches);
        self.cir.alloc_expr(Expr::Match { cond, branches }, region)
    }

    fn lower_block(&mut self, stmts: ast::StmtSpan, region: Region) -> cir::ExprIdx {
        self.scope.push();
        let stmt_idxs = self.ast.stmt_span(stmts).to_vec();
        let mut lowered_stmts = Vec::new();
        let mut result = None;
        let mut block_annos: FxHashMap<Ident, cir::AnnoIdx> = FxHashMap::default();
        let last = stmt_idxs.len().saturating_sub(1);

        for (i, stmt) in stmt_idxs.into_iter().enumerate() {
            let stmt_region = self.ast.stmt_region(stmt);
            match *self.ast.stmt_kind(stmt) {
                StmtKind::Decl { pattern, body } => {
                    // Pattern first, so the body can recurse through it.
                    let lowered_pattern = self.lower_pattern(pattern);
                    let lowered_body = self.lower_expr(body);
                    let annotation = match self.ast.pattern_kind(pattern) {
                        PatternKind::Ident(ident) => block_annos.remove(ident),
                        _ => None,
                    };
                    let kind = match self.ast.pattern_kind(pattern) {
                        PatternKind::Underscore => DefKind::Ignored,
                        _ => DefKind::Let,
                    };
                    let def = self.cir.alloc_def(Def {
                        pattern: lowered_pattern,
                        pattern_region: self.ast.pattern_region(pattern),
                        expr: lowered_body,
                        expr_region: self.ast.expr_region(body),
                        annotation,
                        kind,
                    });
                    lowered_stmts.push(self.cir.alloc_stmt(Stmt::Def(def), stmt_region));
                }
                StmtKind::TypeAnno { name, anno } => {
                    let lowered = self.lower_anno(anno);
                    block_annos.insert(name, lowered);
                }
                StmtKind::Expect { body } => {
                    let lowered = self.lower_expr(body);
                    lowered_stmts
                        .push(self.cir.alloc_stmt(Stmt::Expect { body: lowered }, stmt_region));
                }
                StmtKind::Expr(expr) => {
                    let lowered = self.lower_expr(expr);
                    if i == last {
                        result = Some(lowered);
                    } else {
                        // An effectful expression in statement position.
                        let underscore =
                            self.cir.alloc_pattern(Pattern::Underscore, stmt_region);
                        let def = self.cir.alloc_def(Def {
                            pattern: underscore,
                            pattern_region: stmt_region,
                            expr: lowered,
                            expr_region: stmt_region,
                            annotation: None,
                            kind: DefKind::Stmt,
                        });
                        lowered_stmts.push(self.cir.alloc_stmt(Stmt::Def(def), stmt_region));
                    }
                }
                StmtKind::Import(_) | StmtKind::TypeDecl { .. } => {
                    self.env.push_diagnostic(Diagnostic::InvalidTopLevelStatement {
                        region: stmt_region,
                    });
                }
                StmtKind::Malformed(_) => {}
            }
        }

        let result =
            result.unwrap_or_else(|| self.cir.alloc_expr(Expr::EmptyRecord, region));
        self.scope.pop();
        let stmts = self.cir.alloc_stmt_span(lowered_stmts);
        self.cir.alloc_expr(Expr::Block { stmts, result }, region)
    }

    // === Exposes validation ===

    fn validate_exposes(&mut self, header: &Header) {
        let spans: SmallVec<[ast::NameSpan; 2]> = match *header {
            Header::Module { exposes } | Header::Hosted { exposes } => SmallVec::from_slice(&[exposes]),
            Header::App { provides, .. } => SmallVec::from_slice(&[provides]),
            Header::Package { exposes, .. } => SmallVec::from_slice(&[exposes]),
            Header::Platform {
                exposes, provides, ..
            } => SmallVec::from_slice(&[exposes, provides]),
            Header::TypeModule { .. } | Header::Malformed(_) => return,
        };

        let mut seen: FxHashMap<Ident, Region> = FxHashMap::default();
        for span in spans {
            for &(name, region) in self.ast.name_span(span).to_vec().iter() {
                if let Some(&original) = seen.get(&name) {
                    self.env.push_diagnostic(Diagnostic::RedundantExposed {
                        name,
                        region,
                        original,
                    });
                    continue;
                }
                seen.insert(name, region);
                let defined = self.top_level_values.contains_key(&name)
                    || self.top_level_types.contains_key(&name);
                if !defined {
                    self.env
                        .push_diagnostic(Diagnostic::ExposedButNotImplemented { name, region });
                }
            }
        }
    }
}
