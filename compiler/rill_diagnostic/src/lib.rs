//! Rendering for the structured diagnostics accumulated on a `ModuleEnv`.
//!
//! The compiler core emits `rill_ir::Diagnostic` values; this crate turns
//! them into human-facing reports: severity, title, a message built from the
//! diagnostic's semantic fields, the offending source line with the range
//! underlined, and a short suggested-fix paragraph derived from the tag.

mod render;
mod report;

pub use render::{render, render_all, report_for};
pub use report::Report;
