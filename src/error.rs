//! Error types for the Turnstile service.

use thiserror::Error;

/// Errors surfaced by counter store implementations.
///
/// The decision engine treats any of these on a read it needs for a verdict
/// as a deny; on a post-decision bookkeeping write they are logged only.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The caller asked the store to record something invalid, such as an
    /// already-expired API key or a zero block duration.
    #[error("validation error: {0}")]
    Validation(String),

    /// The backing store could not be reached or failed mid-operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The operation did not complete within the configured deadline.
    #[error("store operation timed out")]
    Timeout,
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Counter store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
