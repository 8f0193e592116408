//! Error types for the Exso core

/// Errors raised by core operations
///
/// Only `MissingDraftField` and `ReplyReferenceImmutable` are meant to reach
/// callers uncaught. Everything else has a fallback at the boundary where it
/// is produced (default value, next store tier, remote fetch).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Draft is missing required field: {0}")]
    MissingDraftField(&'static str),

    #[error("Unknown exso type: {0}")]
    UnknownExsoType(String),

    #[error("replyToExsoId is immutable for exso {id}")]
    ReplyReferenceImmutable { id: String },

    #[error("Malformed data: {0}")]
    Malformed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Contention on {0}: retries exhausted")]
    Contention(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(format!("JSON error: {}", err))
    }
}

impl From<base64::DecodeError> for CoreError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Malformed(format!("base64 error: {}", err))
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
