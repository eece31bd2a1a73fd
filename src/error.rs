//! Error types for the paint core.

use thiserror::Error;

/// Errors surfaced by core operations.
///
/// Numeric edge cases (zero-length chords, degenerate gamma, empty ranges) are
/// not errors; each operation documents how it resolves them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Malformed input: wrong-length color vector, bad perspective corners,
    /// mismatched buffer sizes, unknown layer id, out-of-range parameter.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The call is well-formed but not allowed in the current state, e.g.
    /// deleting the background layer or committing with no preview session.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A buffer allocation would exceed the configured pixel budget.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
}

impl CoreError {
    pub(crate) fn arg(msg: impl Into<String>) -> Self {
        CoreError::InvalidArgument(msg.into())
    }

    pub(crate) fn op(msg: impl Into<String>) -> Self {
        CoreError::InvalidOperation(msg.into())
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
