//! Context flags for context-sensitive parsing decisions.

use bitflags::bitflags;

bitflags! {
    /// Flags that change how the parser treats certain tokens.
    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    pub struct ParseContext: u8 {
        /// Inside `(…)`, `[…]`, or `${…}`: newlines are plain whitespace
        /// instead of statement boundaries.
        const IGNORE_NEWLINES = 1 << 0;
        /// Parsing a `match` scrutinee: `{` belongs to the arm list, so it
        /// cannot start a block or record expression here.
        const NO_CURLY = 1 << 1;
    }
}

impl ParseContext {
    /// Empty context (top level of a statement).
    pub fn new() -> Self {
        ParseContext::empty()
    }
}

impl Default for ParseContext {
    fn default() -> Self {
        Self::new()
    }
}
