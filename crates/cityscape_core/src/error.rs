//! Core error types for Cityscape.
//!
//! Errors exist only at the file edges. Replay itself never fails:
//! malformed trace structure is absorbed by per-event fallback behavior.

use thiserror::Error;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Error)]
pub enum CoreError {
    /// Reading a trace file failed
    #[error("Trace I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Decoding a trace document failed
    #[error("Trace parse failed: {0}")]
    Parse(#[from] serde_json::Error),

    /// Document decoded but does not hold a usable trace
    #[error("Malformed trace: {reason}")]
    Malformed {
        /// What was wrong with the document
        reason: String,
    },
}

impl CoreError {
    /// Shorthand for a malformed-document error
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}
