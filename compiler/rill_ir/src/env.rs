//! The per-module container every stage reads from and appends to.

use crate::{Diagnostic, IdentStore, ModuleStore, Severity, StringLitStore};
use std::fmt;

/// Everything one module accumulates across the pipeline: the source text,
/// the interned stores, and the diagnostic list.
///
/// A `ModuleEnv` is created per source file, populated by each stage in
/// turn, and dropped (or serialized) as a unit. Arenas inside never shrink;
/// every handle stays valid for the env's lifetime.
pub struct ModuleEnv {
    /// Dotted module name (`Foo.Bar`), if known.
    pub module_name: Option<String>,
    /// The full UTF-8 source text.
    pub source: String,
    pub idents: IdentStore,
    pub strings: StringLitStore,
    pub modules: ModuleStore,
    /// Append-only; stages never reorder or deduplicate.
    pub diagnostics: Vec<Diagnostic>,
    /// Byte offset of each line start, for diagnostic rendering.
    line_starts: Vec<u32>,
}

/// Store sizes for host instrumentation.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct EnvStats {
    pub idents: usize,
    pub strings: usize,
    pub modules: usize,
    pub diagnostics: usize,
}

impl ModuleEnv {
    /// Create an env for one source file.
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let mut line_starts = vec![0u32];
        for (offset, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(crate::to_u32(offset + 1, "line starts"));
            }
        }
        ModuleEnv {
            module_name: None,
            source,
            idents: IdentStore::new(),
            strings: StringLitStore::new(),
            modules: ModuleStore::new(),
            diagnostics: Vec::new(),
            line_starts,
        }
    }

    /// Record a diagnostic.
    #[inline]
    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Whether any diagnostic at `Error` severity or above was recorded.
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity() >= Severity::Error)
    }

    /// Whether a `Fatal` diagnostic was recorded (suppresses later phases).
    pub fn has_fatal(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity() == Severity::Fatal)
    }

    /// Translate a byte offset into a zero-based `(line, column)` pair.
    pub fn line_col(&self, offset: u32) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(insert) => insert - 1,
        };
        let col = (offset - self.line_starts[line]) as usize;
        (line, col)
    }

    /// The source text of line `line` (zero-based), without its newline.
    pub fn line_text(&self, line: usize) -> &str {
        let start = self.line_starts[line] as usize;
        let end = self
            .line_starts
            .get(line + 1)
            .map_or(self.source.len(), |&next| next as usize);
        self.source[start..end].trim_end_matches('\n')
    }

    /// Current store sizes.
    pub fn stats(&self) -> EnvStats {
        EnvStats {
            idents: self.idents.len(),
            strings: self.strings.len(),
            modules: self.modules.len(),
            diagnostics: self.diagnostics.len(),
        }
    }
}

impl fmt::Debug for ModuleEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ModuleEnv {{ {:?}, {} bytes, {} diagnostics }}",
            self.module_name,
            self.source.len(),
            self.diagnostics.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Region;

    #[test]
    fn line_col_lookup() {
        let env = ModuleEnv::new("abc\ndef\nghi");
        assert_eq!(env.line_col(0), (0, 0));
        assert_eq!(env.line_col(2), (0, 2));
        assert_eq!(env.line_col(4), (1, 0));
        assert_eq!(env.line_col(9), (2, 1));
        assert_eq!(env.line_text(1), "def");
    }

    #[test]
    fn error_detection() {
        let mut env = ModuleEnv::new("x");
        assert!(!env.has_errors());
        env.push_diagnostic(Diagnostic::UnknownToken {
            region: Region::new(0, 1),
        });
        assert!(env.has_errors());
        assert!(!env.has_fatal());
    }
}
