//! Canonicalization: AST → CIR.
//!
//! This stage resolves names against a lexically-scoped symbol table,
//! eliminates sugar (operator tokens, `|>`, string interpolation, `if`
//! chains), canonicalizes patterns, resolves type annotations in a separate
//! type scope, and validates the module surface (top-level statement forms,
//! header exposes). It is total: problems become `RuntimeError` CIR nodes
//! plus diagnostics, never failures.

mod annos;
mod lower;
mod scope;
#[cfg(test)]
mod tests;

pub use scope::{Introduced, Scope, TypeBinding, ValueBinding};

use rill_ir::ast::Header;
use rill_ir::{ast, cir, AstStore, CirStore, ModuleEnv};

/// Everything canonicalization produces for one module.
pub struct CanonOutput {
    pub cir: CirStore,
    /// Top-level definitions in source order.
    pub defs: Vec<cir::DefIdx>,
    /// Top-level `expect` statements in source order.
    pub expects: Vec<cir::StmtIdx>,
    /// Canonical type declarations in source order.
    pub type_decls: Vec<cir::TypeDeclIdx>,
}

/// Canonicalize a parsed module.
pub fn canonicalize(
    header: &Header,
    stmts: &[ast::StmtIdx],
    ast: &AstStore,
    env: &mut ModuleEnv,
) -> CanonOutput {
    let mut canonicalizer = lower::Canonicalizer::new(ast, env);
    canonicalizer.run(header, stmts)
}
