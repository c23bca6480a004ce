use thiserror::Error;

/// Error kinds shared across every porcupin crate.
///
/// Each component maps its own failures into one of these variants rather
/// than growing a new error type per crate — the persistence layer, the
/// indexer adapter and the backup engine all need to reason about the same
/// small set of kinds, in particular whether a failure is retriable.
#[derive(Debug, Error)]
pub enum PorcupinError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request rate-limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("{0} not found")]
    NotFound(String),

    #[error("uri is not pinnable: {0}")]
    NotPinnable(String),

    #[error("operation timed out")]
    Deadline,

    #[error("{0}")]
    Other(String),
}

impl PorcupinError {
    /// Deadline-class errors drive the `failed` vs `failed_unavailable`
    /// split in the pin state machine. Exposed as an explicit predicate
    /// rather than string-matching on the error message.
    pub fn is_deadline(&self) -> bool {
        matches!(self, PorcupinError::Deadline)
    }
}
