//! Error types for the idempotent consumer library

use thiserror::Error;

/// Result type for idempotency operations
pub type IdempotencyResult<T> = Result<T, IdempotencyError>;

/// Errors that can occur during idempotent event processing
#[derive(Error, Debug)]
pub enum IdempotencyError {
    /// Database operation failed (connection, query execution, etc.)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Topic validation failed (empty, too long)
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    /// Generic error with context
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl IdempotencyError {
    /// Check if error is a duplicate key violation (event already processed)
    ///
    /// Not an error condition for callers: the conditional insert plus
    /// rows_affected is the primary duplicate signal, this covers code paths
    /// that insert without ON CONFLICT.
    pub fn is_duplicate_key(&self) -> bool {
        match self {
            IdempotencyError::Database(sqlx_err) => {
                // PostgreSQL unique violation error code: 23505
                if let Some(db_err) = sqlx_err.as_database_error() {
                    db_err.code().as_deref() == Some("23505")
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    /// Check if error is transient (should retry)
    pub fn is_transient(&self) -> bool {
        match self {
            IdempotencyError::Database(sqlx_err) => {
                matches!(
                    sqlx_err,
                    sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
                )
            }
            _ => false,
        }
    }
}
