//! Error types for kai-consolidate

use thiserror::Error;

/// Result type alias using kai-consolidate Error
pub type Result<T> = std::result::Result<T, Error>;

/// Run-level errors. Per-file failures are recorded in results, not raised.
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the completion layer
    #[error(transparent)]
    Ai(#[from] kai_ai::Error),

    /// The run may not start (e.g. dirty working tree)
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// The analysis response could not be turned into operations
    #[error("Could not parse analysis response: {reason}")]
    AnalysisParse {
        reason: String,
        /// Raw completion text, kept for diagnostics
        raw: String,
    },

    /// One or more files failed to apply
    #[error("Apply failed for {failed} of {total} files")]
    ApplyBatch { failed: usize, total: usize },

    /// Filesystem or process I/O outside the per-file apply loop
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The durable log could not be written or read
    #[error("Log error: {0}")]
    Log(String),

    /// A generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether retrying the failed phase could help
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Ai(e) => is_retryable_ai(e),
            _ => false,
        }
    }
}

/// Only the typed classification counts; error text is never inspected.
pub fn is_retryable_ai(error: &kai_ai::Error) -> bool {
    error.is_retryable()
}
