/// Error types for post-service
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Referenced aggregate absent (or soft-deleted)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Ownership violation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Duplicate like or duplicate idempotency key
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Required remote dependency unreachable (identity snapshot backfill)
    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, AppError>;

/// PostgreSQL unique violation (SQLSTATE 23505).
///
/// The unique constraints on post_likes (post_id, user_id) and
/// processed_events (event_id, topic) are the concurrency backstops; callers
/// map this to [`AppError::Conflict`].
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let Some(db_err) = err.as_database_error() {
        db_err.code().as_deref() == Some("23505")
    } else {
        false
    }
}
