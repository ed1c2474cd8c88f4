//! Error types for the rowstate store.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
///
/// None of these are retried internally; the caller owns retry policy.
#[derive(Debug, Error)]
pub enum StateError {
    /// Rejected before reaching the backend: empty key, malformed ETag,
    /// or a payload that cannot be serialized.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A mutation matched no row. The key is absent or its ETag is stale;
    /// the two causes are not distinguished.
    #[error("no rows match key {key:?} and etag")]
    NotFoundOrConflict { key: String },

    /// A keyed mutation touched more than one row.
    #[error("more than one row affected for key {key:?} ({rows} rows), expected one")]
    InvariantViolation { key: String, rows: u64 },

    #[error("backend error: {0}")]
    Backend(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl StateError {
    /// True when a conditional mutation lost to a concurrent writer or
    /// targeted a key that no longer exists.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StateError::NotFoundOrConflict { .. })
    }
}
