//! Recursive descent parser for Rill.
//!
//! Produces a flat AST in an [`AstStore`]. The parser never halts on error:
//! any unexpected token becomes a `Malformed` node tagged with a reason, a
//! matching diagnostic is recorded on the `ModuleEnv`, and parsing
//! resynchronizes at the next statement boundary or closing bracket.
//!
//! Expressions use Pratt-style precedence climbing; statements are newline
//! separated, with newlines treated as plain whitespace inside brackets.

mod context;
mod cursor;
mod grammar;
#[cfg(test)]
mod tests;

pub use context::ParseContext;

use cursor::Cursor;
use rill_ir::ast::{ExprKind, Header, MalformedReason, PatternKind, StmtKind, TypeAnnoKind};
use rill_ir::{ast, AstStore, Diagnostic, ModuleEnv, Region, TokenList};
use tracing::debug;

/// Everything the parser produces for one module.
pub struct ParseOutput {
    pub header: Header,
    pub header_region: Region,
    /// Top-level statements in source order.
    pub stmts: Vec<ast::StmtIdx>,
    pub store: AstStore,
}

/// Parse a token stream into an AST.
///
/// `env.module_name` (when set) is used to synthesize a type-module header
/// for files that define a top-level type of the same name instead of
/// writing a header.
pub fn parse_module(tokens: &TokenList, env: &mut ModuleEnv) -> ParseOutput {
    let mut parser = Parser::new(tokens, env);
    parser.module()
}

pub(crate) struct Parser<'a> {
    pub(crate) cursor: Cursor<'a>,
    pub(crate) store: AstStore,
    pub(crate) context: ParseContext,
    pub(crate) env: &'a mut ModuleEnv,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a TokenList, env: &'a mut ModuleEnv) -> Self {
        Parser {
            cursor: Cursor::new(tokens),
            store: AstStore::with_capacity(env.source.len()),
            context: ParseContext::new(),
            env,
        }
    }

    /// Whether newlines are currently insignificant.
    #[inline]
    pub(crate) fn nl(&self) -> bool {
        self.context.contains(ParseContext::IGNORE_NEWLINES)
    }

    /// Run `f` with extra context flags, restoring the old flags after.
    pub(crate) fn with_context<T>(
        &mut self,
        add: ParseContext,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let old = self.context;
        self.context = old | add;
        let result = f(self);
        self.context = old;
        result
    }

    /// Run `f` with context flags removed, restoring the old flags after.
    pub(crate) fn without_context<T>(
        &mut self,
        remove: ParseContext,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let old = self.context;
        self.context = old - remove;
        let result = f(self);
        self.context = old;
        result
    }

    /// Allocate a malformed expression and record its diagnostic.
    pub(crate) fn malformed_expr(&mut self, reason: MalformedReason, region: Region) -> ast::ExprIdx {
        debug!(tag = reason.tag(), ?region, "malformed expression");
        self.env.push_diagnostic(Diagnostic::Parse { reason, region });
        self.store.alloc_expr(ExprKind::Malformed(reason), region)
    }

    /// Allocate a malformed pattern and record its diagnostic.
    pub(crate) fn malformed_pattern(
        &mut self,
        reason: MalformedReason,
        region: Region,
    ) -> ast::PatternIdx {
        self.env.push_diagnostic(Diagnostic::Parse { reason, region });
        self.store.alloc_pattern(PatternKind::Malformed(reason), region)
    }

    /// Allocate a malformed type annotation and record its diagnostic.
    pub(crate) fn malformed_anno(
        &mut self,
        reason: MalformedReason,
        region: Region,
    ) -> ast::TypeAnnoIdx {
        self.env.push_diagnostic(Diagnostic::Parse { reason, region });
        self.store.alloc_anno(TypeAnnoKind::Malformed(reason), region)
    }

    /// Allocate a malformed statement and record its diagnostic.
    pub(crate) fn malformed_stmt(
        &mut self,
        reason: MalformedReason,
        region: Region,
    ) -> ast::StmtIdx {
        self.env.push_diagnostic(Diagnostic::Parse { reason, region });
        self.store.alloc_stmt(StmtKind::Malformed(reason), region)
    }

    /// Parse the whole module: header, then top-level statements.
    fn module(&mut self) -> ParseOutput {
        let parsed_header = self.header();

        let mut stmts = Vec::new();
        loop {
            while self.cursor.eat(rill_ir::TokenKind::Newline, false).is_some() {}
            if self.cursor.at_eof() {
                break;
            }
            stmts.push(self.stmt());
        }

        // A headerless file is a type module when it declares a top-level
        // type named after the file; otherwise the header is missing.
        let (header, header_region) = match parsed_header {
            Some(parsed) => parsed,
            None => match self.type_module_name(&stmts) {
                Some(name) => (Header::TypeModule { name }, Region::point(0)),
                None => {
                    let region = Region::point(0);
                    self.env.push_diagnostic(Diagnostic::Parse {
                        reason: MalformedReason::MissingHeader,
                        region,
                    });
                    (Header::Malformed(MalformedReason::MissingHeader), region)
                }
            },
        };

        ParseOutput {
            header,
            header_region,
            stmts,
            store: std::mem::take(&mut self.store),
        }
    }

    /// The name of the top-level type matching the module's filename, if any.
    fn type_module_name(&self, stmts: &[ast::StmtIdx]) -> Option<rill_ir::Ident> {
        let module_name = self.env.module_name.as_deref()?;
        // Only the last path component can match a type name.
        let last = module_name.rsplit('.').next()?;
        for &stmt in stmts {
            if let StmtKind::TypeDecl { header, .. } = self.store.stmt_kind(stmt) {
                let decl = self.store.type_header(*header);
                if self.env.idents.text(decl.name) == last {
                    return Some(decl.name);
                }
            }
        }
        None
    }
}
