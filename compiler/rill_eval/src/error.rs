//! Evaluation failures.
//!
//! A failure is terminal for the current top-level evaluation but not for
//! the module: the interpreter's stacks are reset and further evaluations
//! (e.g. from a REPL host) proceed against intact module state.

use thiserror::Error;

/// Why an evaluation stopped.
///
/// The first two are user-caused; `StackOverflow`/`OutOfMemory` are resource
/// limits; the rest are invariant violations that should be unreachable
/// after type checking and indicate a compiler bug.
#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum EvalError {
    /// Explicit `crash "…"` or an unreachable runtime-error node.
    #[error("crash: {0}")]
    Crash(String),

    #[error("integer division by zero")]
    DivisionByZero,

    #[error("evaluation stack exceeded its limit")]
    StackOverflow,

    #[error("evaluation ran out of memory")]
    OutOfMemory,

    #[error("layout inconsistency: {0}")]
    LayoutError(String),

    #[error("wrong number of arguments: expected {expected}, got {got}")]
    ArityMismatch { expected: u32, got: u32 },

    #[error("no binding in scope for a resolved pattern")]
    PatternNotFound,

    #[error("interpreter stacks are in an invalid state")]
    InvalidStackState,

    #[error("value shape did not match its type during evaluation")]
    TypeMismatch,
}

impl EvalError {
    /// Whether this failure indicates a compiler bug rather than a
    /// user-visible condition.
    pub fn is_compiler_bug(&self) -> bool {
        matches!(
            self,
            EvalError::LayoutError(_)
                | EvalError::ArityMismatch { .. }
                | EvalError::PatternNotFound
                | EvalError::InvalidStackState
                | EvalError::TypeMismatch
        )
    }
}
