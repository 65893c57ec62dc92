//! Store error types

use thiserror::Error;

/// Errors raised by a `JobStore`
#[derive(Debug, Error)]
pub enum StoreError {
    /// The persistence layer could not be reached or rejected the statement
    #[error("store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),

    /// Another job already uses this idempotency key
    #[error("idempotency key already in use: {0}")]
    DuplicateIdempotencyKey(String),

    /// A stored row could not be decoded into a job
    #[error("corrupt job record: {0}")]
    Corrupt(String),
}

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
