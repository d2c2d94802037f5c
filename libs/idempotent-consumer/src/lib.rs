//! # Idempotent Kafka Consumer Library
//!
//! Tracks processed (event_id, topic) pairs in PostgreSQL so that
//! at-least-once Kafka delivery does not re-apply handler side effects
//! across restarts, rebalances, or duplicate deliveries.
//!
//! ## Problem
//!
//! Without persistent idempotency tracking:
//! - **Service restarts**: in-memory de-duplication state is lost
//! - **Rebalances**: a new consumer-group member replays recent offsets
//! - **Duplicates**: at-least-once delivery hands the same message to the
//!   handler more than once
//!
//! ## Guarantees and limits
//!
//! The canonical "first time" signal is a conditional insert
//! (`INSERT ... ON CONFLICT DO NOTHING`) on the unique (event_id, topic)
//! index; the `is_processed` pre-check is a fast path only. The
//! check-then-process-then-mark sequence is NOT atomic: two group members
//! handling the same delivery concurrently can both run the handler before
//! either marks it. Handlers must therefore be independently idempotent
//! (upsert-by-key side effects); the guard removes duplicate work, it does
//! not replace handler idempotency.
//!
//! One event id may legitimately appear under several topics, which is why
//! the key is composite.
//!
//! ## Usage
//!
//! ```ignore
//! use idempotent_consumer::{IdempotencyGuard, ProcessingResult};
//! use sqlx::PgPool;
//! use std::time::Duration;
//! use uuid::Uuid;
//!
//! # async fn example(pool: PgPool, event_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
//! let guard = IdempotencyGuard::new(pool, Duration::from_secs(30 * 86400));
//!
//! match guard.process_if_new(event_id, "auth.user.created", || async {
//!     // Handler side effects here (replica upsert, etc.)
//!     Ok(())
//! }).await? {
//!     ProcessingResult::Success => println!("applied"),
//!     ProcessingResult::AlreadyProcessed => println!("duplicate, skipped"),
//!     ProcessingResult::Failed(err) => eprintln!("handler failed: {err}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Schema
//!
//! The consuming service's migrations must create the tracking table:
//!
//! ```sql
//! CREATE TABLE processed_events (
//!     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
//!     event_id UUID NOT NULL,
//!     topic VARCHAR(255) NOT NULL,
//!     processed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     UNIQUE (event_id, topic)
//! );
//! CREATE INDEX idx_processed_events_processed_at ON processed_events (processed_at);
//! ```
//!
//! Rows are append-only; `cleanup_expired` bounds growth by deleting rows
//! older than the retention window. Retention must stay far above the bus's
//! maximum redelivery horizon.

use anyhow::Context;
use chrono::Utc;
use sqlx::{PgPool, Row};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

mod error;

pub use error::{IdempotencyError, IdempotencyResult};

/// Result of processing an event with idempotency check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingResult {
    /// Event was processed successfully (first time)
    Success,

    /// Event was already processed before (duplicate)
    AlreadyProcessed,

    /// Event processing failed with error message
    Failed(String),
}

impl ProcessingResult {
    /// Check if processing reached a settled state (applied now or earlier)
    pub fn is_ok(&self) -> bool {
        matches!(
            self,
            ProcessingResult::Success | ProcessingResult::AlreadyProcessed
        )
    }

    /// Check if processing failed
    pub fn is_failed(&self) -> bool {
        matches!(self, ProcessingResult::Failed(_))
    }
}

/// Idempotency guard for Kafka event processing
///
/// Thread-safe; share across async tasks via `Clone` (the inner pool is a
/// handle).
#[derive(Clone)]
pub struct IdempotencyGuard {
    pool: PgPool,
    retention: Duration,
}

impl IdempotencyGuard {
    /// Create a new idempotency guard
    ///
    /// # Arguments
    ///
    /// * `pool` - PostgreSQL connection pool
    /// * `retention` - how long processed (event_id, topic) rows are kept
    pub fn new(pool: PgPool, retention: Duration) -> Self {
        Self { pool, retention }
    }

    /// Check if an event has already been processed for a topic
    ///
    /// Fast lookup on the unique (event_id, topic) index. A `false` here is
    /// only advisory; the conditional insert in [`mark_processed`] is what
    /// settles races.
    ///
    /// [`mark_processed`]: IdempotencyGuard::mark_processed
    pub async fn is_processed(&self, event_id: Uuid, topic: &str) -> IdempotencyResult<bool> {
        Self::validate_topic(topic)?;

        let result = sqlx::query(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM processed_events WHERE event_id = $1 AND topic = $2
            ) AS exists
            "#,
        )
        .bind(event_id)
        .bind(topic)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check if event is processed")?;

        let exists: bool = result.try_get("exists")?;

        if exists {
            debug!(event_id = %event_id, topic = %topic, "Event already processed");
        }

        Ok(exists)
    }

    /// Mark an event as processed for a topic
    ///
    /// Uses `INSERT ... ON CONFLICT DO NOTHING`; the affected-row count is
    /// the canonical first-time signal under concurrency.
    ///
    /// # Returns
    ///
    /// - `Ok(true)` if this call inserted the record (first time)
    /// - `Ok(false)` if the pair was already recorded (duplicate)
    pub async fn mark_processed(&self, event_id: Uuid, topic: &str) -> IdempotencyResult<bool> {
        Self::validate_topic(topic)?;

        let result = sqlx::query(
            r#"
            INSERT INTO processed_events (event_id, topic, processed_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (event_id, topic) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(topic)
        .execute(&self.pool)
        .await
        .context("Failed to mark event as processed")?;

        let was_inserted = result.rows_affected() > 0;

        if was_inserted {
            info!(event_id = %event_id, topic = %topic, "Event marked as processed");
        } else {
            debug!(
                event_id = %event_id,
                topic = %topic,
                "Event already marked as processed (duplicate)"
            );
        }

        Ok(was_inserted)
    }

    /// Process an event only if it has not been processed for this topic
    ///
    /// 1. Fast-path existence check; duplicates return `AlreadyProcessed`
    ///    without running the handler.
    /// 2. Run the handler; a handler error returns `Failed` and leaves the
    ///    pair unmarked so redelivery retries it.
    /// 3. Conditionally mark the pair. Losing the insert race means another
    ///    member applied the event concurrently; that also reports
    ///    `AlreadyProcessed`, and the double side effect is tolerated because
    ///    handlers are required to be idempotent.
    pub async fn process_if_new<F, Fut>(
        &self,
        event_id: Uuid,
        topic: &str,
        f: F,
    ) -> IdempotencyResult<ProcessingResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), anyhow::Error>>,
    {
        Self::validate_topic(topic)?;

        if self.is_processed(event_id, topic).await? {
            return Ok(ProcessingResult::AlreadyProcessed);
        }

        match f().await {
            Ok(_) => {
                let first = self.mark_processed(event_id, topic).await?;
                if first {
                    Ok(ProcessingResult::Success)
                } else {
                    debug!(
                        event_id = %event_id,
                        topic = %topic,
                        "Lost mark race to a concurrent consumer"
                    );
                    Ok(ProcessingResult::AlreadyProcessed)
                }
            }
            Err(e) => {
                warn!(
                    event_id = %event_id,
                    topic = %topic,
                    error = ?e,
                    "Event processing failed"
                );
                Ok(ProcessingResult::Failed(e.to_string()))
            }
        }
    }

    /// Delete processed-event rows older than the retention window
    ///
    /// Call periodically from a background task.
    ///
    /// # Returns
    ///
    /// Number of rows deleted
    pub async fn cleanup_expired(&self) -> IdempotencyResult<u64> {
        let cutoff_time = Utc::now()
            - chrono::Duration::from_std(self.retention).map_err(|e| {
                IdempotencyError::Other(anyhow::anyhow!("Invalid retention duration: {}", e))
            })?;

        let result = sqlx::query(
            r#"
            DELETE FROM processed_events
            WHERE processed_at < $1
            "#,
        )
        .bind(cutoff_time)
        .execute(&self.pool)
        .await
        .context("Failed to cleanup expired events")?;

        let deleted_count = result.rows_affected();

        if deleted_count > 0 {
            info!(
                deleted_count = deleted_count,
                cutoff_time = %cutoff_time,
                "Cleaned up expired processed events"
            );
        } else {
            debug!("No expired events to cleanup");
        }

        Ok(deleted_count)
    }

    /// Validate topic format
    fn validate_topic(topic: &str) -> IdempotencyResult<()> {
        if topic.is_empty() {
            return Err(IdempotencyError::InvalidTopic(
                "Topic cannot be empty".to_string(),
            ));
        }

        if topic.len() > 255 {
            return Err(IdempotencyError::InvalidTopic(format!(
                "Topic too long: {} characters (max 255)",
                topic.len()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_topic() {
        assert!(IdempotencyGuard::validate_topic("auth.user.created").is_ok());
        assert!(IdempotencyGuard::validate_topic(&"x".repeat(255)).is_ok());

        let err = IdempotencyGuard::validate_topic("").unwrap_err();
        assert!(matches!(err, IdempotencyError::InvalidTopic(_)));

        let err = IdempotencyGuard::validate_topic(&"x".repeat(256)).unwrap_err();
        assert!(matches!(err, IdempotencyError::InvalidTopic(_)));
    }

    #[test]
    fn test_processing_result() {
        assert!(ProcessingResult::Success.is_ok());
        assert!(ProcessingResult::AlreadyProcessed.is_ok());
        assert!(!ProcessingResult::Failed("error".to_string()).is_ok());

        assert!(!ProcessingResult::Success.is_failed());
        assert!(!ProcessingResult::AlreadyProcessed.is_failed());
        assert!(ProcessingResult::Failed("error".to_string()).is_failed());
    }
}
