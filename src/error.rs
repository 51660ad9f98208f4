//! Error types for session-hash-store.

use thiserror::Error;

/// Main error type for session persistence operations.
#[derive(Error, Debug)]
pub enum SessionStoreError {
    /// A round trip to the backing store failed.
    #[error("store error: {0}")]
    Store(String),

    /// A stored field holds a value of the wrong type.
    #[error("malformed field {field}: {reason}")]
    MalformedField { field: String, reason: String },

    /// A required reserved field is absent from a stored session.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// The given string cannot be used as a session id.
    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),

    /// Typed attribute conversion failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,
}

/// Convenience Result type for session persistence operations.
pub type Result<T> = std::result::Result<T, SessionStoreError>;
