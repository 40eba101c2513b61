//! The renderer-facing report shape.

use rill_ir::{Region, Severity};

/// One diagnostic, resolved into renderable pieces.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Report {
    pub severity: Severity,
    /// Machine-readable tag (`ident_not_in_scope`).
    pub tag: &'static str,
    /// One-line human message with names filled in.
    pub message: String,
    pub region: Region,
    /// Suggested-fix paragraph, if the tag has one.
    pub hint: Option<String>,
}

impl Report {
    /// `severity: message` one-liner, without the excerpt.
    pub fn headline(&self) -> String {
        format!("{}: {}", self.severity, self.message)
    }
}
