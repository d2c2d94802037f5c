//! Identity event handlers for the user replica store
//!
//! The replica is never authoritative: these handlers only mirror what the
//! identity service announces. Each side effect is an upsert or keyed update,
//! safe to apply twice, because the guard's check-then-mark is not atomic and
//! two consumer-group members can race on the same delivery.

use anyhow::bail;
use async_trait::async_trait;
use event_schema::{topics, EventEnvelope, UserCreatedEvent, UserUpdatedEvent, UsernameChangedEvent};
use idempotent_consumer::{IdempotencyGuard, ProcessingResult};
use tracing::{debug, info, warn};

use crate::db::ReplicaRepository;
use crate::kafka::EventHandler;

/// Handles `auth.user.created`: insert-if-absent into the replica
pub struct UserCreatedHandler {
    guard: IdempotencyGuard,
    replicas: ReplicaRepository,
}

impl UserCreatedHandler {
    pub fn new(guard: IdempotencyGuard, replicas: ReplicaRepository) -> Self {
        Self { guard, replicas }
    }
}

#[async_trait]
impl EventHandler for UserCreatedHandler {
    async fn handle(&self, payload: &[u8]) -> anyhow::Result<()> {
        let envelope: EventEnvelope<UserCreatedEvent> = serde_json::from_slice(payload)?;
        let event = &envelope.payload;

        let outcome = self
            .guard
            .process_if_new(envelope.event_id, topics::USER_CREATED, || async {
                let inserted = self
                    .replicas
                    .upsert_created(event.id, &event.username, event.active)
                    .await?;

                if inserted {
                    info!(user_id = %event.id, username = %event.username, "User replica created");
                } else {
                    debug!(user_id = %event.id, "User replica already present, created event ignored");
                }
                Ok(())
            })
            .await?;

        match outcome {
            ProcessingResult::Success => Ok(()),
            ProcessingResult::AlreadyProcessed => {
                debug!(event_id = %envelope.event_id, "Duplicate user created event skipped");
                Ok(())
            }
            ProcessingResult::Failed(err) => bail!("user created handler failed: {err}"),
        }
    }
}

/// Handles `auth.user.updated`: partial update by id, no-op if absent
pub struct UserUpdatedHandler {
    guard: IdempotencyGuard,
    replicas: ReplicaRepository,
}

impl UserUpdatedHandler {
    pub fn new(guard: IdempotencyGuard, replicas: ReplicaRepository) -> Self {
        Self { guard, replicas }
    }
}

#[async_trait]
impl EventHandler for UserUpdatedHandler {
    async fn handle(&self, payload: &[u8]) -> anyhow::Result<()> {
        let envelope: EventEnvelope<UserUpdatedEvent> = serde_json::from_slice(payload)?;
        let event = &envelope.payload;

        let outcome = self
            .guard
            .process_if_new(envelope.event_id, topics::USER_UPDATED, || async {
                let updated = self
                    .replicas
                    .update_partial(event.id, event.username.as_deref(), event.active)
                    .await?;

                if updated {
                    info!(user_id = %event.id, "User replica updated");
                } else {
                    debug!(user_id = %event.id, "No replica row for updated event, ignored");
                }
                Ok(())
            })
            .await?;

        match outcome {
            ProcessingResult::Success => Ok(()),
            ProcessingResult::AlreadyProcessed => {
                debug!(event_id = %envelope.event_id, "Duplicate user updated event skipped");
                Ok(())
            }
            ProcessingResult::Failed(err) => bail!("user updated handler failed: {err}"),
        }
    }
}

/// Handles `auth.user.username.changed`: username-only update
pub struct UsernameChangedHandler {
    guard: IdempotencyGuard,
    replicas: ReplicaRepository,
}

impl UsernameChangedHandler {
    pub fn new(guard: IdempotencyGuard, replicas: ReplicaRepository) -> Self {
        Self { guard, replicas }
    }
}

#[async_trait]
impl EventHandler for UsernameChangedHandler {
    async fn handle(&self, payload: &[u8]) -> anyhow::Result<()> {
        let envelope: EventEnvelope<UsernameChangedEvent> = serde_json::from_slice(payload)?;
        let event = &envelope.payload;

        let outcome = self
            .guard
            .process_if_new(envelope.event_id, topics::USER_USERNAME_CHANGED, || async {
                let updated = self
                    .replicas
                    .set_username(event.id, &event.new_username)
                    .await?;

                if updated {
                    info!(
                        user_id = %event.id,
                        new_username = %event.new_username,
                        "User replica username changed"
                    );
                } else {
                    warn!(
                        user_id = %event.id,
                        "Username changed event for unknown replica, ignored"
                    );
                }
                Ok(())
            })
            .await?;

        match outcome {
            ProcessingResult::Success => Ok(()),
            ProcessingResult::AlreadyProcessed => {
                debug!(event_id = %envelope.event_id, "Duplicate username changed event skipped");
                Ok(())
            }
            ProcessingResult::Failed(err) => bail!("username changed handler failed: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_created_envelope_deserialization() {
        let json = r#"{
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "username": "alice",
            "eventId": "650e8400-e29b-41d4-a716-446655440001",
            "occurredAt": "2024-01-01T00:00:00Z"
        }"#;

        let envelope: EventEnvelope<UserCreatedEvent> =
            serde_json::from_str(json).expect("Failed to parse");

        assert_eq!(envelope.payload.username, "alice");
        // `active` is absent from older producers and defaults to true
        assert!(envelope.payload.active);
    }

    #[test]
    fn test_user_updated_envelope_allows_partial_fields() {
        let json = r#"{
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "active": false,
            "eventId": "650e8400-e29b-41d4-a716-446655440001",
            "occurredAt": "2024-01-01T00:00:00Z"
        }"#;

        let envelope: EventEnvelope<UserUpdatedEvent> =
            serde_json::from_str(json).expect("Failed to parse");

        assert_eq!(envelope.payload.username, None);
        assert_eq!(envelope.payload.active, Some(false));
    }

    #[test]
    fn test_username_changed_envelope_deserialization() {
        let json = r#"{
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "newUsername": "alice_2",
            "eventId": "650e8400-e29b-41d4-a716-446655440001",
            "occurredAt": "2024-01-01T00:00:00Z"
        }"#;

        let envelope: EventEnvelope<UsernameChangedEvent> =
            serde_json::from_str(json).expect("Failed to parse");

        assert_eq!(envelope.payload.new_username, "alice_2");
    }
}
