//! Untyped AST produced by the parser.
//!
//! Nodes are flat: children are index handles into the owning [`AstStore`].
//! Every node family has a `Malformed` variant carrying a [`MalformedReason`];
//! the parser never fails, it recovers and keeps going, so malformed nodes
//! are in 1:1 correspondence with emitted parse diagnostics.

use crate::{Base, Ident, NumSuffix, Region, StringLit};
use std::fmt;

crate::define_index!(
    /// Handle to an AST expression.
    ExprIdx
);
crate::define_index!(
    /// Handle to an AST pattern.
    PatternIdx
);
crate::define_index!(
    /// Handle to an AST statement.
    StmtIdx
);
crate::define_index!(
    /// Handle to an AST type annotation.
    TypeAnnoIdx
);
crate::define_index!(
    /// Handle to a type declaration header (`Pair a b`).
    TypeHeaderIdx
);
crate::define_index!(
    /// Handle to an `import` statement payload.
    ImportIdx
);

crate::define_span!(
    /// Span over the expression list buffer.
    ExprSpan
);
crate::define_span!(
    /// Span over the pattern list buffer.
    PatternSpan
);
crate::define_span!(
    /// Span over the statement list buffer.
    StmtSpan
);
crate::define_span!(
    /// Span over the type annotation list buffer.
    TypeAnnoSpan
);
crate::define_span!(
    /// Span over the `(Ident, Region)` names buffer.
    NameSpan
);
crate::define_span!(
    /// Span over record literal fields.
    RecordFieldSpan
);
crate::define_span!(
    /// Span over record destructure fields.
    PatternFieldSpan
);
crate::define_span!(
    /// Span over record annotation fields.
    AnnoFieldSpan
);
crate::define_span!(
    /// Span over annotation tags in a tag union.
    AnnoTagSpan
);
crate::define_span!(
    /// Span over `if` condition/body branches.
    IfBranchSpan
);
crate::define_span!(
    /// Span over `match` arms.
    MatchArmSpan
);
crate::define_span!(
    /// Span over package fields in a header.
    PackageFieldSpan
);

/// Why a node is malformed. Shared by AST nodes and parse diagnostics so the
/// 1:1 correspondence holds by construction.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum MalformedReason {
    ExprUnexpectedToken,
    ExpectedExprCloseRoundOrComma,
    ExpectedExprCloseSquareOrComma,
    ExpectedExprCloseCurlyOrComma,
    NoElse,
    ExprNoSpaceDotInt,
    PatternUnexpectedToken,
    ExpectedPatternClose,
    TypeUnexpectedToken,
    ExpectedTypeClose,
    StatementUnexpectedToken,
    ExpectedDeclBody,
    HeaderUnexpectedToken,
    MissingHeader,
    UnclosedString,
    UnclosedInterpolation,
    ExpectedLambdaBody,
    ExpectedMatchArrow,
    ExpectedBlockClose,
    ImportBadPath,
}

impl MalformedReason {
    /// Short tag-style name used in rendered diagnostics.
    pub const fn tag(self) -> &'static str {
        match self {
            MalformedReason::ExprUnexpectedToken => "expr_unexpected_token",
            MalformedReason::ExpectedExprCloseRoundOrComma => "expected_expr_close_round_or_comma",
            MalformedReason::ExpectedExprCloseSquareOrComma => {
                "expected_expr_close_square_or_comma"
            }
            MalformedReason::ExpectedExprCloseCurlyOrComma => "expected_expr_close_curly_or_comma",
            MalformedReason::NoElse => "no_else",
            MalformedReason::ExprNoSpaceDotInt => "expr_no_space_dot_int",
            MalformedReason::PatternUnexpectedToken => "pattern_unexpected_token",
            MalformedReason::ExpectedPatternClose => "expected_pattern_close",
            MalformedReason::TypeUnexpectedToken => "type_unexpected_token",
            MalformedReason::ExpectedTypeClose => "expected_type_close",
            MalformedReason::StatementUnexpectedToken => "statement_unexpected_token",
            MalformedReason::ExpectedDeclBody => "expected_decl_body",
            MalformedReason::HeaderUnexpectedToken => "header_unexpected_token",
            MalformedReason::MissingHeader => "missing_header",
            MalformedReason::UnclosedString => "unclosed_string",
            MalformedReason::UnclosedInterpolation => "unclosed_interpolation",
            MalformedReason::ExpectedLambdaBody => "expected_lambda_body",
            MalformedReason::ExpectedMatchArrow => "expected_match_arrow",
            MalformedReason::ExpectedBlockClose => "expected_block_close",
            MalformedReason::ImportBadPath => "import_bad_path",
        }
    }
}

/// Surface binary operators, pre-desugaring.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum AstBinOp {
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
    And,
    Or,
    Pizza,
}

/// Surface unary operators.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum AstUnaryOp {
    Negate,
    Not,
}

/// AST expression node.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ExprKind {
    Int {
        value: i128,
        base: Base,
        suffix: Option<NumSuffix>,
    },
    Frac {
        bits: u64,
        suffix: Option<NumSuffix>,
    },
    SingleQuote(u32),
    /// A string literal: segments alternate `StrPart` and interpolations.
    Str {
        segments: ExprSpan,
    },
    /// A literal segment inside a `Str`.
    StrPart(StringLit),
    /// Lowercase identifier reference.
    Var(Ident),
    /// Uppercase identifier: a tag or type reference in expression position.
    Tag(Ident),
    /// Qualified lookup `Module.name`.
    ModuleAccess {
        module: Ident,
        name: Ident,
    },
    FieldAccess {
        receiver: ExprIdx,
        field: Ident,
    },
    TupleAccess {
        receiver: ExprIdx,
        index: u32,
    },
    List {
        items: ExprSpan,
    },
    Tuple {
        items: ExprSpan,
    },
    Record {
        fields: RecordFieldSpan,
    },
    Apply {
        func: ExprIdx,
        args: ExprSpan,
    },
    BinOp {
        op: AstBinOp,
        lhs: ExprIdx,
        rhs: ExprIdx,
    },
    Unary {
        op: AstUnaryOp,
        operand: ExprIdx,
    },
    Lambda {
        params: PatternSpan,
        body: ExprIdx,
    },
    /// `if c1 b1 else if c2 b2 else bN`; flattened into branches + final else.
    If {
        branches: IfBranchSpan,
        final_else: ExprIdx,
    },
    Match {
        cond: ExprIdx,
        arms: MatchArmSpan,
    },
    /// `{ stmt … expr }` block.
    Block {
        stmts: StmtSpan,
    },
    Crash {
        message: ExprIdx,
    },
    Malformed(MalformedReason),
}

/// One `cond -> body` pair of an `if` chain.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct IfBranch {
    pub cond: ExprIdx,
    pub body: ExprIdx,
}

/// One field in a record literal. `value == None` is shorthand (`{ x }`).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct RecordField {
    pub name: Ident,
    pub name_region: Region,
    pub value: Option<ExprIdx>,
}

/// One arm of a `match`: alternation patterns and a body.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct MatchArm {
    pub patterns: PatternSpan,
    pub body: ExprIdx,
    pub region: Region,
}

/// List-pattern rest marker (`..` or `.. as tail`).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ListRest {
    pub name: Option<Ident>,
}

/// AST pattern node.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum PatternKind {
    Ident(Ident),
    Underscore,
    Int {
        value: i128,
    },
    Frac {
        bits: u64,
    },
    Str(StringLit),
    SingleQuote(u32),
    Tag {
        name: Ident,
        args: PatternSpan,
    },
    Record {
        fields: PatternFieldSpan,
    },
    Tuple {
        items: PatternSpan,
    },
    List {
        before: PatternSpan,
        rest: Option<ListRest>,
        after: PatternSpan,
    },
    Malformed(MalformedReason),
}

/// One field in a record destructure.
///
/// `sub == None` binds the field name itself (`{ x }`); `Some` destructures
/// further (`{ x: (a, b) }`).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct PatternRecordField {
    pub name: Ident,
    pub region: Region,
    pub sub: Option<PatternIdx>,
}

/// Alias (`:`) versus nominal (`:=`) type declaration.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum TypeDeclKind {
    Alias,
    Nominal,
}

/// `Name arg1 arg2` head of a type declaration.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct TypeHeader {
    pub name: Ident,
    pub name_region: Region,
    /// Lowercase type variables.
    pub args: NameSpan,
}

/// `import pf.Foo.Bar as Alias exposing [a, B]` payload.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Import {
    /// Package shorthand qualifier (`pf.`), if any.
    pub shorthand: Option<Ident>,
    /// Dotted module name, interned as a single ident (`Foo.Bar`).
    pub module: Ident,
    pub module_region: Region,
    pub alias: Option<Ident>,
    pub exposing: NameSpan,
}

/// AST statement node.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum StmtKind {
    /// `pattern = expr`
    Decl {
        pattern: PatternIdx,
        body: ExprIdx,
    },
    /// `name : anno`
    TypeAnno {
        name: Ident,
        anno: TypeAnnoIdx,
    },
    /// `Header : anno` / `Header := anno`
    TypeDecl {
        header: TypeHeaderIdx,
        anno: TypeAnnoIdx,
        kind: TypeDeclKind,
    },
    Import(ImportIdx),
    Expect {
        body: ExprIdx,
    },
    /// Bare expression in statement position.
    Expr(ExprIdx),
    Malformed(MalformedReason),
}

/// One field of a record type annotation.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct AnnoRecordField {
    pub name: Ident,
    pub region: Region,
    pub anno: TypeAnnoIdx,
}

/// One tag of a tag union annotation.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct AnnoTag {
    pub name: Ident,
    pub region: Region,
    pub args: TypeAnnoSpan,
}

/// AST type annotation node.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum TypeAnnoKind {
    /// Lowercase type variable.
    Var(Ident),
    /// Concrete type reference with optional module qualifier and arguments.
    Apply {
        module: Option<Ident>,
        name: Ident,
        args: TypeAnnoSpan,
    },
    /// `a, b -> ret` (pure) or `a, b => ret` (effectful).
    Fn {
        args: TypeAnnoSpan,
        ret: TypeAnnoIdx,
        effectful: bool,
    },
    Record {
        fields: AnnoFieldSpan,
        ext: Option<TypeAnnoIdx>,
    },
    TagUnion {
        tags: AnnoTagSpan,
        ext: Option<TypeAnnoIdx>,
    },
    Tuple {
        elems: TypeAnnoSpan,
    },
    /// `_` — infer here.
    Underscore,
    Malformed(MalformedReason),
}

/// One `shorthand: [platform] "path"` field of an app/package header.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct PackageField {
    pub shorthand: Ident,
    pub is_platform: bool,
    pub path: StringLit,
    pub region: Region,
}

/// Module header.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Header {
    Module {
        exposes: NameSpan,
    },
    App {
        provides: NameSpan,
        packages: PackageFieldSpan,
    },
    Package {
        exposes: NameSpan,
        packages: PackageFieldSpan,
    },
    Platform {
        name: StringLit,
        requires: NameSpan,
        exposes: NameSpan,
        packages: PackageFieldSpan,
        provides: NameSpan,
    },
    Hosted {
        exposes: NameSpan,
    },
    /// Synthesized for a file whose body defines a type named after the file.
    TypeModule {
        name: Ident,
    },
    Malformed(MalformedReason),
}

/// Arena for every AST node family of one module.
///
/// Expression kinds and regions live in parallel arrays; the other families
/// store their regions inline. All buffers are append-only.
#[derive(Default)]
pub struct AstStore {
    expr_kinds: Vec<ExprKind>,
    expr_regions: Vec<Region>,
    patterns: Vec<(PatternKind, Region)>,
    stmts: Vec<(StmtKind, Region)>,
    annos: Vec<(TypeAnnoKind, Region)>,
    type_headers: Vec<TypeHeader>,
    imports: Vec<Import>,

    expr_lists: Vec<ExprIdx>,
    pattern_lists: Vec<PatternIdx>,
    stmt_lists: Vec<StmtIdx>,
    anno_lists: Vec<TypeAnnoIdx>,
    names: Vec<(Ident, Region)>,
    record_fields: Vec<RecordField>,
    pattern_fields: Vec<PatternRecordField>,
    anno_fields: Vec<AnnoRecordField>,
    anno_tags: Vec<AnnoTag>,
    if_branches: Vec<IfBranch>,
    match_arms: Vec<MatchArm>,
    package_fields: Vec<PackageField>,
}

/// Generate `alloc_*`/`get_*` pairs for a side buffer with a span type.
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

impl AstStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with capacity estimated from source size.
    pub fn with_capacity(source_len: usize) -> Self {
        let exprs = source_len / 20;
        AstStore {
            expr_kinds: Vec::with_capacity(exprs),
            expr_regions: Vec::with_capacity(exprs),
            ..Self::default()
        }
    }

    /// Allocate an expression, returning its handle.
    #[inline]
    pub fn alloc_expr(&mut self, kind: ExprKind, region: Region) -> ExprIdx {
        let idx = ExprIdx::new(crate::to_u32(self.expr_kinds.len(), "expressions"));
        self.expr_kinds.push(kind);
        self.expr_regions.push(region);
        idx
    }

    /// Expression kind by handle.
    #[inline]
    #[track_caller]
    pub fn expr_kind(&self, idx: ExprIdx) -> &ExprKind {
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
    pub fn alloc_pattern(&mut self, kind: PatternKind, region: Region) -> PatternIdx {
        let idx = PatternIdx::new(crate::to_u32(self.patterns.len(), "patterns"));
        self.patterns.push((kind, region));
        idx
    }

    /// Pattern kind by handle.
    #[inline]
    #[track_caller]
    pub fn pattern_kind(&self, idx: PatternIdx) -> &PatternKind {
        &self.patterns[idx.index()].0
    }

    /// Pattern region by handle.
    #[inline]
    #[track_caller]
    pub fn pattern_region(&self, idx: PatternIdx) -> Region {
        self.patterns[idx.index()].1
    }

    /// Allocate a statement, returning its handle.
    #[inline]
    pub fn alloc_stmt(&mut self, kind: StmtKind, region: Region) -> StmtIdx {
        let idx = StmtIdx::new(crate::to_u32(self.stmts.len(), "statements"));
        self.stmts.push((kind, region));
        idx
    }

    /// Statement kind by handle.
    #[inline]
    #[track_caller]
    pub fn stmt_kind(&self, idx: StmtIdx) -> &StmtKind {
        &self.stmts[idx.index()].0
    }

    /// Statement region by handle.
    #[inline]
    #[track_caller]
    pub fn stmt_region(&self, idx: StmtIdx) -> Region {
        self.stmts[idx.index()].1
    }

    /// Allocate a type annotation, returning its handle.
    #[inline]
    pub fn alloc_anno(&mut self, kind: TypeAnnoKind, region: Region) -> TypeAnnoIdx {
        let idx = TypeAnnoIdx::new(crate::to_u32(self.annos.len(), "type annotations"));
        self.annos.push((kind, region));
        idx
    }

    /// Type annotation kind by handle.
    #[inline]
    #[track_caller]
    pub fn anno_kind(&self, idx: TypeAnnoIdx) -> &TypeAnnoKind {
        &self.annos[idx.index()].0
    }

    /// Type annotation region by handle.
    #[inline]
    #[track_caller]
    pub fn anno_region(&self, idx: TypeAnnoIdx) -> Region {
        self.annos[idx.index()].1
    }

    /// Allocate a type declaration header.
    pub fn alloc_type_header(&mut self, header: TypeHeader) -> TypeHeaderIdx {
        let idx = TypeHeaderIdx::new(crate::to_u32(self.type_headers.len(), "type headers"));
        self.type_headers.push(header);
        idx
    }

    /// Type declaration header by handle.
    #[inline]
    #[track_caller]
    pub fn type_header(&self, idx: TypeHeaderIdx) -> &TypeHeader {
        &self.type_headers[idx.index()]
    }

    /// Allocate an import payload.
    pub fn alloc_import(&mut self, import: Import) -> ImportIdx {
        let idx = ImportIdx::new(crate::to_u32(self.imports.len(), "imports"));
        self.imports.push(import);
        idx
    }

    /// Import payload by handle.
    #[inline]
    #[track_caller]
    pub fn import(&self, idx: ImportIdx) -> &Import {
        &self.imports[idx.index()]
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
    define_list!(
        anno_lists,
        TypeAnnoIdx,
        TypeAnnoSpan,
        alloc_anno_span,
        anno_span,
        "type annotation list"
    );
    define_list!(names, (Ident, Region), NameSpan, alloc_name_span, name_span, "name list");
    define_list!(
        record_fields,
        RecordField,
        RecordFieldSpan,
        alloc_record_fields,
        record_fields,
        "record fields"
    );
    define_list!(
        pattern_fields,
        PatternRecordField,
        PatternFieldSpan,
        alloc_pattern_fields,
        pattern_fields,
        "destructure fields"
    );
    define_list!(
        anno_fields,
        AnnoRecordField,
        AnnoFieldSpan,
        alloc_anno_fields,
        anno_fields,
        "annotation fields"
    );
    define_list!(anno_tags, AnnoTag, AnnoTagSpan, alloc_anno_tags, anno_tags, "annotation tags");
    define_list!(
        if_branches,
        IfBranch,
        IfBranchSpan,
        alloc_if_branches,
        if_branches,
        "if branches"
    );
    define_list!(match_arms, MatchArm, MatchArmSpan, alloc_match_arms, match_arms, "match arms");
    define_list!(
        package_fields,
        PackageField,
        PackageFieldSpan,
        alloc_package_fields,
        package_fields,
        "package fields"
    );
}

impl fmt::Debug for AstStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AstStore {{ {} exprs, {} patterns, {} stmts, {} annos }}",
            self.expr_kinds.len(),
            self.patterns.len(),
            self.stmts.len(),
            self.annos.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expr_round_trip() {
        let mut store = AstStore::new();
        let idx = store.alloc_expr(
            ExprKind::Int {
                value: 42,
                base: Base::Decimal,
                suffix: None,
            },
            Region::new(0, 2),
        );
        assert!(matches!(store.expr_kind(idx), ExprKind::Int { value: 42, .. }));
        assert_eq!(store.expr_region(idx), Region::new(0, 2));
    }

    #[test]
    fn span_round_trip() {
        let mut store = AstStore::new();
        let a = store.alloc_expr(
            ExprKind::Var(Ident::new(0)),
            Region::new(0, 1),
        );
        let b = store.alloc_expr(
            ExprKind::Var(Ident::new(1)),
            Region::new(2, 3),
        );
        let span = store.alloc_expr_span([a, b]);
        assert_eq!(store.expr_span(span), &[a, b]);
    }
}
