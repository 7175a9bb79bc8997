//! Error types for the formatting core.

use thiserror::Error;

use crate::template::EngineError;

pub type FormatResult<T> = Result<T, FormatError>;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("request was cancelled")]
    Cancelled,

    /// Applying the edits would change the document's diagnostics or content.
    #[error("formatting invariant violated: {reason}")]
    InvariantViolation { reason: String },

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A request delegated to the client failed.
    #[error("delegated request failed: {0}")]
    Delegate(String),

    /// The caller broke a documented precondition.
    #[error("precondition failed: {0}")]
    Precondition(String),
}

impl FormatError {
    pub fn invariant(reason: impl Into<String>) -> Self {
        Self::InvariantViolation {
            reason: reason.into(),
        }
    }

    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::Precondition(reason.into())
    }
}
