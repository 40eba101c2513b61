//! Type system for the Rill compiler.
//!
//! - [`TypeStore`]: union-find forest of `(Content, Rank, Mark)` descriptors
//!   with path compression, instantiation, and generalization
//! - [`unify`]: structural unification with row-polymorphic records and tag
//!   unions and the numeric lattice
//! - [`check_module`]: Hindley–Milner inference over a canonicalized module
//! - [`render_var`]: display rendering for diagnostics

mod check;
mod render;
mod store;
#[cfg(test)]
mod tests;
mod types;
mod unify;

pub use check::{check_module, CheckOutput};
pub use render::render_var;
pub use store::TypeStore;
pub use types::{
    Content, Descriptor, FieldSlice, FlatType, FracPrecision, Func, IntPrecision, IntReq, Mark,
    Num, NumCompact, Rank, TagSlice, Var, VarSlice,
};
pub use types::num_for_suffix;
pub use unify::{unify, Mismatch, MismatchKind};
