//! Canonical IR: the post-canonicalization representation consumed by the
//! type checker and the interpreter.
//!
//! Differences from the AST:
//! - identifier references are resolved to the [`PatternIdx`] that introduced
//!   them (locals) or to an [`ExternalDeclIdx`] (imports)
//! - sugar is gone: operators are a small closed set, `|>` is a call, string
//!   interpolation is a flat segment span, `if` chains are branch lists
//! - problematic nodes are `RuntimeError`s paired with a recorded diagnostic,
//!   so evaluation of healthy code is never blocked by broken code elsewhere

use crate::{Ident, ModuleId, NumSuffix, Region, StringLit};
use std::fmt;

crate::define_index!(
    /// Handle to a CIR expression.
    ExprIdx
);
crate::define_index!(
    /// Handle to a CIR pattern. Doubles as the identity of the binding the
    /// pattern introduces.
    PatternIdx
);
crate::define_index!(
    /// Handle to a CIR statement.
    StmtIdx
);
crate::define_index!(
    /// Handle to a canonical type annotation.
    AnnoIdx
);
crate::define_index!(
    /// Handle to a definition (top-level or `let`).
    DefIdx
);
crate::define_index!(
    /// Handle to a canonical type declaration.
    TypeDeclIdx
);
crate::define_index!(
    /// Handle to an external declaration `(module, name, kind)`.
    ExternalDeclIdx
);

crate::define_span!(
    /// Span over the CIR expression list buffer.
    ExprSpan
);
crate::define_span!(
    /// Span over the CIR pattern list buffer.
    PatternSpan
);
crate::define_span!(
    /// Span over the CIR statement list buffer.
    StmtSpan
);
crate::define_span!(
    /// Span over the canonical annotation list buffer.
    AnnoSpan
);
crate::define_span!(
    /// Span over record literal fields.
    FieldSpan
);
crate::define_span!(
    /// Span over record destructure fields.
    DestructSpan
);
crate::define_span!(
    /// Span over `if` branches.
    IfBranchSpan
);
crate::define_span!(
    /// Span over `match` branches.
    BranchSpan
);
crate::define_span!(
    /// Span over lambda captures.
    CaptureSpan
);
crate::define_span!(
    /// Span over annotation record fields.
    AnnoFieldSpan
);
crate::define_span!(
    /// Span over annotation tags.
    AnnoTagSpan
);
crate::define_span!(
    /// Span over `(Ident, Region)` name lists.
    NameSpan
);

/// Why a CIR node is a `RuntimeError`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum RuntimeErrorKind {
    IdentNotInScope,
    UnknownOperator,
    UndeclaredType,
    MalformedSyntax,
    InvalidTopLevelStatement,
}

/// The closed set of canonical binary operators.
///
/// `and`/`or` are not here: they canonicalize to dedicated short-circuit
/// expressions.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Binop {
    Add,
    Sub,
    Mul,
    Div,
    DivTrunc,
    Rem,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Binop {
    /// Whether the operator produces a `Bool` rather than its operand type.
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Binop::Eq | Binop::Ne | Binop::Lt | Binop::Gt | Binop::Le | Binop::Ge
        )
    }
}

/// CIR expression node.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Expr {
    Int {
        value: i128,
        suffix: Option<NumSuffix>,
    },
    Frac {
        bits: u64,
        suffix: Option<NumSuffix>,
    },
    /// Single-quoted scalar; numerically an unbound integer.
    Scalar(u32),
    /// String with interpolation expanded: segments alternate `StrSegment`
    /// and arbitrary expressions.
    Str {
        segments: ExprSpan,
    },
    StrSegment(StringLit),
    /// Reference to a local binding, by the pattern that introduced it.
    LookupLocal {
        pattern: PatternIdx,
    },
    /// Reference to an imported name.
    LookupExternal {
        external: ExternalDeclIdx,
    },
    List {
        elems: ExprSpan,
    },
    Tuple {
        elems: ExprSpan,
    },
    Record {
        fields: FieldSpan,
    },
    EmptyRecord,
    FieldAccess {
        receiver: ExprIdx,
        field: Ident,
    },
    TupleAccess {
        receiver: ExprIdx,
        index: u32,
    },
    Tag {
        name: Ident,
        args: ExprSpan,
    },
    Call {
        func: ExprIdx,
        args: ExprSpan,
    },
    Binop {
        op: Binop,
        lhs: ExprIdx,
        rhs: ExprIdx,
    },
    /// Short-circuit `and`.
    And {
        lhs: ExprIdx,
        rhs: ExprIdx,
    },
    /// Short-circuit `or`.
    Or {
        lhs: ExprIdx,
        rhs: ExprIdx,
    },
    UnaryMinus {
        operand: ExprIdx,
    },
    UnaryNot {
        operand: ExprIdx,
    },
    Lambda {
        params: PatternSpan,
        body: ExprIdx,
        captures: CaptureSpan,
    },
    If {
        branches: IfBranchSpan,
        final_else: ExprIdx,
    },
    Match {
        cond: ExprIdx,
        branches: BranchSpan,
    },
    Block {
        stmts: StmtSpan,
        result: ExprIdx,
    },
    Crash {
        message: ExprIdx,
    },
    /// A node that cannot be evaluated; a diagnostic was recorded when it
    /// was created. Evaluating it crashes, checking it yields `err`.
    RuntimeError {
        kind: RuntimeErrorKind,
    },
}

/// One `cond -> body` pair of an `if` chain.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct IfBranch {
    pub cond: ExprIdx,
    pub body: ExprIdx,
}

/// One field of a record literal.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Field {
    pub name: Ident,
    pub value: ExprIdx,
}

/// One branch of a `match`: alternation patterns plus a body.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Branch {
    pub patterns: PatternSpan,
    pub body: ExprIdx,
    pub region: Region,
}

/// A value captured by a lambda from its enclosing scope.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Capture {
    /// The binding being captured.
    pub pattern: PatternIdx,
    pub ident: Ident,
}

/// List-pattern rest marker. When named (`.. as tail`), `pattern` is the
/// `Bind` pattern carrying the binding identity.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ListRest {
    pub pattern: Option<PatternIdx>,
}

/// CIR pattern node.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Pattern {
    /// Introduces a binding; the pattern's own index is the binding identity.
    Bind {
        ident: Ident,
    },
    Underscore,
    IntLiteral {
        value: i128,
    },
    FracLiteral {
        bits: u64,
    },
    StrLiteral(StringLit),
    Scalar(u32),
    Tag {
        name: Ident,
        args: PatternSpan,
    },
    Record {
        destructs: DestructSpan,
    },
    Tuple {
        patterns: PatternSpan,
    },
    List {
        before: PatternSpan,
        rest: Option<ListRest>,
        after: PatternSpan,
    },
    RuntimeError {
        kind: RuntimeErrorKind,
    },
}

/// How one record-destructure field binds.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum DestructKind {
    /// `{ x }` — binds the label itself; payload is the `Bind` pattern.
    Required(PatternIdx),
    /// `{ x: pat }` — destructures further.
    SubPattern(PatternIdx),
}

/// One field of a record destructure.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Destruct {
    pub label: Ident,
    pub region: Region,
    pub kind: DestructKind,
}

/// What kind of definition a `Def` is.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum DefKind {
    /// Ordinary `pattern = expr` binding.
    Let,
    /// Bare effectful expression in statement position.
    Stmt,
    /// `_ = expr` whose result is deliberately discarded.
    Ignored,
}

/// A top-level or `let` binding.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Def {
    pub pattern: PatternIdx,
    pub pattern_region: Region,
    pub expr: ExprIdx,
    pub expr_region: Region,
    pub annotation: Option<AnnoIdx>,
    pub kind: DefKind,
}

/// CIR statement node.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Stmt {
    Def(DefIdx),
    Expect {
        body: ExprIdx,
    },
}

/// Builtin types the canonicalizer resolves by name.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum BuiltinType {
    Str,
    Bool,
    List,
    Box,
    Num,
    Frac,
    Int,
    I8,
    I16,
    I32,
    I64,
    I128,
    U8,
    U16,
    U32,
    U64,
    U128,
    F32,
    F64,
    Dec,
}

impl BuiltinType {
    /// Resolve a builtin type by its source name.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Str" => BuiltinType::Str,
            "Bool" => BuiltinType::Bool,
            "List" => BuiltinType::List,
            "Box" => BuiltinType::Box,
            "Num" => BuiltinType::Num,
            "Frac" => BuiltinType::Frac,
            "Int" => BuiltinType::Int,
            "I8" => BuiltinType::I8,
            "I16" => BuiltinType::I16,
            "I32" => BuiltinType::I32,
            "I64" => BuiltinType::I64,
            "I128" => BuiltinType::I128,
            "U8" => BuiltinType::U8,
            "U16" => BuiltinType::U16,
            "U32" => BuiltinType::U32,
            "U64" => BuiltinType::U64,
            "U128" => BuiltinType::U128,
            "F32" => BuiltinType::F32,
            "F64" => BuiltinType::F64,
            "Dec" => BuiltinType::Dec,
            _ => return None,
        })
    }
}

/// Where a resolved type annotation points.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum TypeRef {
    Builtin(BuiltinType),
    Local(TypeDeclIdx),
    External(ExternalDeclIdx),
}

/// Canonical type annotation node.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Anno {
    /// User-written type variable (becomes a rigid var during checking).
    Var {
        name: Ident,
    },
    Apply {
        target: TypeRef,
        args: AnnoSpan,
    },
    Fn {
        args: AnnoSpan,
        ret: AnnoIdx,
        effectful: bool,
    },
    Record {
        fields: AnnoFieldSpan,
        ext: Option<AnnoIdx>,
    },
    TagUnion {
        tags: AnnoTagSpan,
        ext: Option<AnnoIdx>,
    },
    Tuple {
        elems: AnnoSpan,
    },
    Underscore,
    /// The annotation failed to resolve; checking it yields `err`.
    Error,
}

/// One field of a record annotation.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct AnnoField {
    pub name: Ident,
    pub anno: AnnoIdx,
}

/// One tag of a tag union annotation.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct AnnoTag {
    pub name: Ident,
    pub args: AnnoSpan,
}

/// Alias versus nominal type declaration.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum TypeDeclKind {
    Alias,
    Nominal,
}

/// A canonical type declaration.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct TypeDecl {
    pub name: Ident,
    pub name_region: Region,
    /// Declared type variables.
    pub args: NameSpan,
    pub anno: AnnoIdx,
    pub kind: TypeDeclKind,
}

/// What an external declaration names.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ExternalKind {
    Value,
    Type,
}

/// An imported name: `(module, local name, kind)`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ExternalDecl {
    pub module: ModuleId,
    pub name: Ident,
    pub kind: ExternalKind,
}

/// Arena for every CIR node family of one module.
#[derive(Default)]
pub struct CirStore {
    expr_kinds: Vec<Expr>,
    expr_regions: Vec<Region>,
    patterns: Vec<(Pattern, Region)>,
    stmts: Vec<(Stmt, Region)>,
    annos: Vec<(Anno, Region)>,
    defs: Vec<Def>,
    type_decls: Vec<TypeDecl>,
    external_decls: Vec<ExternalDecl>,

    expr_lists: Vec<ExprIdx>,
    pattern_lists: Vec<PatternIdx>,
    stmt_lists: Vec<StmtIdx>,
    anno_lists: Vec<AnnoIdx>,
    fields: Vec<Field>,
    destructs: Vec<Destruct>,
    if_branches: Vec<IfBranch>,
    branches: Vec<Branch>,
    captures: Vec<Capture>,
    anno_fields: Vec<AnnoField>,
    anno_tags: Vec<AnnoTag>,
    names: Vec<(Ident, Region)>,
}

macro_rules! define_list {
    ($field:ident, $item:ty, $span:ty, $alloc:ident, $get:ident, $ctx:literal) => {
        #[doc = concat!("Store a list of ", $ctx, ", returning its span.")]
        pub fn $alloc(&mut self, items: impl IntoIterator<Item = $item>) -> $span {
            let start = crate::to_u32(self.$field.len(), $ctx);
            self.$field.extend(items);
            let len = crate::to_u16(self.$field.len() - start as usize, $ctx);
            <$span>::new(start, len)
        }

        #[doc = concat!("Borrow the ", $ctx, " covered by `span`.")]
        #[inline]
        pub fn $get(&self, span: $span) -> &[$item] {
            let start = span.start as usize;
            &self.$field[start..start + span.len as usize]
        }
    };
}

impl CirStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an expression, returning its handle.
    #[inline]
    pub fn alloc_expr(&mut self, expr: Expr, region: Region) -> ExprIdx {
        let idx = ExprIdx::new(crate::to_u32(self.expr_kinds.len(), "CIR expressions"));
        self.expr_kinds.push(expr);
        self.expr_regions.push(region);
        idx
    }

    /// Expression by handle.
    #[inline]
    #[track_caller]
    pub fn expr(&self, idx: ExprIdx) -> &Expr {
        &self.expr_kinds[idx.index()]
    }

    /// Expression region by handle.
    #[inline]
    #[track_caller]
    pub fn expr_region(&self, idx: ExprIdx) -> Region {
        self.expr_regions[idx.index()]
    }

    /// Number of expressions allocated.
    #[inline]
    pub fn expr_count(&self) -> usize {
        self.expr_kinds.len()
    }

    /// Allocate a pattern, returning its handle.
    #[inline]
    pub fn alloc_pattern(&mut self, pattern: Pattern, region: Region) -> PatternIdx {
        let idx = PatternIdx::new(crate::to_u32(self.patterns.len(), "CIR patterns"));
        self.patterns.push((pattern, region));
        idx
    }

    /// Pattern by handle.
    #[inline]
    #[track_caller]
    pub fn pattern(&self, idx: PatternIdx) -> &Pattern {
        &self.patterns[idx.index()].0
    }

    /// Pattern region by handle.
    #[inline]
    #[track_caller]
    pub fn pattern_region(&self, idx: PatternIdx) -> Region {
        self.patterns[idx.index()].1
    }

    /// Number of patterns allocated.
    #[inline]
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Allocate a statement, returning its handle.
    #[inline]
    pub fn alloc_stmt(&mut self, stmt: Stmt, region: Region) -> StmtIdx {
        let idx = StmtIdx::new(crate::to_u32(self.stmts.len(), "CIR statements"));
        self.stmts.push((stmt, region));
        idx
    }

    /// Statement by handle.
    #[inline]
    #[track_caller]
    pub fn stmt(&self, idx: StmtIdx) -> &Stmt {
        &self.stmts[idx.index()].0
    }

    /// Statement region by handle.
    #[inline]
    #[track_caller]
    pub fn stmt_region(&self, idx: StmtIdx) -> Region {
        self.stmts[idx.index()].1
    }

    /// Allocate a canonical annotation, returning its handle.
    #[inline]
    pub fn alloc_anno(&mut self, anno: Anno, region: Region) -> AnnoIdx {
        let idx = AnnoIdx::new(crate::to_u32(self.annos.len(), "CIR annotations"));
        self.annos.push((anno, region));
        idx
    }

    /// Annotation by handle.
    #[inline]
    #[track_caller]
    pub fn anno(&self, idx: AnnoIdx) -> &Anno {
        &self.annos[idx.index()].0
    }

    /// Annotation region by handle.
    #[inline]
    #[track_caller]
    pub fn anno_region(&self, idx: AnnoIdx) -> Region {
        self.annos[idx.index()].1
    }

    /// Allocate a definition, returning its handle.
    pub fn alloc_def(&mut self, def: Def) -> DefIdx {
        let idx = DefIdx::new(crate::to_u32(self.defs.len(), "definitions"));
        self.defs.push(def);
        idx
    }

    /// Definition by handle.
    #[inline]
    #[track_caller]
    pub fn def(&self, idx: DefIdx) -> &Def {
        &self.defs[idx.index()]
    }

    /// Number of definitions.
    #[inline]
    pub fn def_count(&self) -> usize {
        self.defs.len()
    }

    /// Allocate a type declaration, returning its handle.
    pub fn alloc_type_decl(&mut self, decl: TypeDecl) -> TypeDeclIdx {
        let idx = TypeDeclIdx::new(crate::to_u32(self.type_decls.len(), "type declarations"));
        self.type_decls.push(decl);
        idx
    }

    /// Type declaration by handle.
    #[inline]
    #[track_caller]
    pub fn type_decl(&self, idx: TypeDeclIdx) -> &TypeDecl {
        &self.type_decls[idx.index()]
    }

    /// Number of type declarations.
    #[inline]
    pub fn type_decl_count(&self) -> usize {
        self.type_decls.len()
    }

    /// Patch a type declaration's annotation.
    ///
    /// Declarations are registered name-first so mutually recursive types
    /// resolve; the annotation is filled in on the second pass.
    pub fn set_type_decl_anno(&mut self, idx: TypeDeclIdx, anno: AnnoIdx) {
        self.type_decls[idx.index()].anno = anno;
    }

    /// Allocate an external declaration, returning its handle.
    pub fn alloc_external_decl(&mut self, decl: ExternalDecl) -> ExternalDeclIdx {
        let idx =
            ExternalDeclIdx::new(crate::to_u32(self.external_decls.len(), "external declarations"));
        self.external_decls.push(decl);
        idx
    }

    /// External declaration by handle.
    #[inline]
    #[track_caller]
    pub fn external_decl(&self, idx: ExternalDeclIdx) -> &ExternalDecl {
        &self.external_decls[idx.index()]
    }

    define_list!(expr_lists, ExprIdx, ExprSpan, alloc_expr_span, expr_span, "expression list");
    define_list!(
        pattern_lists,
        PatternIdx,
        PatternSpan,
        alloc_pattern_span,
        pattern_span,
        "pattern list"
    );
    define_list!(stmt_lists, StmtIdx, StmtSpan, alloc_stmt_span, stmt_span, "statement list");
    define_list!(anno_lists, AnnoIdx, AnnoSpan, alloc_anno_span, anno_span, "annotation list");
    define_list!(fields, Field, FieldSpan, alloc_fields, fields, "record fields");
    define_list!(
        destructs,
        Destruct,
        DestructSpan,
        alloc_destructs,
        destructs,
        "destructure fields"
    );
    define_list!(
        if_branches,
        IfBranch,
        IfBranchSpan,
        alloc_if_branches,
        if_branches,
        "if branches"
    );
    define_list!(branches, Branch, BranchSpan, alloc_branches, branches, "match branches");
    define_list!(captures, Capture, CaptureSpan, alloc_captures, captures, "captures");
    define_list!(
        anno_fields,
        AnnoField,
        AnnoFieldSpan,
        alloc_anno_fields,
        anno_fields,
        "annotation fields"
    );
    define_list!(anno_tags, AnnoTag, AnnoTagSpan, alloc_anno_tags, anno_tags, "annotation tags");
    define_list!(names, (Ident, Region), NameSpan, alloc_name_span, name_span, "name list");
}

impl fmt::Debug for CirStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CirStore {{ {} exprs, {} patterns, {} defs }}",
            self.expr_kinds.len(),
            self.patterns.len(),
            self.defs.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn def_round_trip() {
        let mut store = CirStore::new();
        let ident = Ident::new(0);
        let pattern = store.alloc_pattern(Pattern::Bind { ident }, Region::new(0, 1));
        let expr = store.alloc_expr(Expr::Int { value: 1, suffix: None }, Region::new(4, 5));
        let def = store.alloc_def(Def {
            pattern,
            pattern_region: Region::new(0, 1),
            expr,
            expr_region: Region::new(4, 5),
            annotation: None,
            kind: DefKind::Let,
        });
        assert_eq!(store.def(def).pattern, pattern);
        assert!(matches!(store.expr(expr), Expr::Int { value: 1, .. }));
    }

    #[test]
    fn every_expr_has_a_region() {
        let mut store = CirStore::new();
        let a = store.alloc_expr(Expr::EmptyRecord, Region::new(3, 5));
        assert_eq!(store.expr_region(a), Region::new(3, 5));
    }
}
