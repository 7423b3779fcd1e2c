//! Engine error type and stable error codes
//!
//! Errors are partitioned into caller errors (surfaced directly, never
//! retried), transient infrastructure errors (retried with bounded backoff,
//! compensated in write paths), and fatal errors (latch the engine into
//! `Failed`). Every variant maps to a stable wire tag via [`EngineError::code`].

use crate::memory::ContentError;

/// Stable wire tags for the tool surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidArguments,
    InvalidContent,
    NotFound,
    Conflict,
    DimensionMismatch,
    Initializing,
    Draining,
    Timeout,
    BackendUnavailable,
    InvalidTransition,
    Internal,
}

impl ErrorCode {
    /// The wire tag carried in JSON-RPC error data.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidArguments => "INVALID_ARGUMENTS",
            ErrorCode::InvalidContent => "INVALID_CONTENT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::DimensionMismatch => "DIMENSION_MISMATCH",
            ErrorCode::Initializing => "INITIALIZING",
            ErrorCode::Draining => "DRAINING",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::BackendUnavailable => "BACKEND_UNAVAILABLE",
            ErrorCode::InvalidTransition => "INVALID_TRANSITION",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Engine error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Arguments failed schema validation
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// Content failed shape or sanitization checks
    #[error(transparent)]
    InvalidContent(#[from] ContentError),
    /// No record with the given id
    #[error("memory not found: {0}")]
    NotFound(String),
    /// Concurrent modification conflict
    #[error("conflict: {0}")]
    Conflict(String),
    /// Vector dimension does not match the collection's declared dimension
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// Engine has not finished warming; the current state is attached
    #[error("engine is initializing (state: {0})")]
    Initializing(String),
    /// Engine is draining; no new calls accepted
    #[error("engine is draining")]
    Draining,
    /// The call exceeded its deadline
    #[error("call deadline exceeded")]
    Timeout,
    /// A storage or index backend is unavailable
    #[error("backend unavailable: {0}")]
    Backend(String),
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// A migration state transition outside the allowed graph
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Invariant violation or other unrecoverable condition
    #[error("internal error")]
    Internal(String),
}

impl EngineError {
    /// The stable wire tag for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::InvalidArguments(_) => ErrorCode::InvalidArguments,
            EngineError::InvalidContent(_) => ErrorCode::InvalidContent,
            EngineError::NotFound(_) => ErrorCode::NotFound,
            EngineError::Conflict(_) => ErrorCode::Conflict,
            EngineError::DimensionMismatch { .. } => ErrorCode::DimensionMismatch,
            EngineError::Initializing(_) => ErrorCode::Initializing,
            EngineError::Draining => ErrorCode::Draining,
            EngineError::Timeout => ErrorCode::Timeout,
            EngineError::Backend(_) => ErrorCode::BackendUnavailable,
            EngineError::Database(_) => ErrorCode::BackendUnavailable,
            EngineError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            EngineError::Io(_) => ErrorCode::Internal,
            EngineError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether a bounded retry could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Backend(_) | EngineError::Database(_) | EngineError::Timeout
        )
    }

    /// Message safe to surface to callers. Internal errors get a stable,
    /// non-leaking message; everything else uses its Display form.
    pub fn public_message(&self) -> String {
        match self {
            EngineError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Engine result type
pub type Result<T> = std::result::Result<T, EngineError>;

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(
            EngineError::NotFound("x".into()).code().as_str(),
            "NOT_FOUND"
        );
        assert_eq!(
            EngineError::DimensionMismatch { expected: 256, got: 768 }
                .code()
                .as_str(),
            "DIMENSION_MISMATCH"
        );
        assert_eq!(EngineError::Draining.code().as_str(), "DRAINING");
    }

    #[test]
    fn test_internal_message_does_not_leak() {
        let err = EngineError::Internal("reader lock poisoned at store.rs:42".into());
        assert_eq!(err.public_message(), "internal error");
    }

    #[test]
    fn test_transient_classification() {
        assert!(EngineError::Backend("down".into()).is_transient());
        assert!(!EngineError::NotFound("x".into()).is_transient());
        assert!(!EngineError::InvalidArguments("x".into()).is_transient());
    }
}
