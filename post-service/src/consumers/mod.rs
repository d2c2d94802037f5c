//! Inbound event handlers
//!
//! Handlers for the identity topics that keep the local user replica in
//! sync. Every handler runs behind the idempotency guard and applies its
//! side effect as an upsert so redelivery and guard races stay harmless.

pub mod user_events;

use std::sync::Arc;

use idempotent_consumer::IdempotencyGuard;

use crate::db::ReplicaRepository;
use crate::error::Result;
use crate::kafka::HandlerRegistry;

pub use user_events::{UserCreatedHandler, UserUpdatedHandler, UsernameChangedHandler};

/// Build the topic-to-handler table for all consumed topics.
pub fn build_registry(
    guard: IdempotencyGuard,
    replicas: ReplicaRepository,
) -> Result<HandlerRegistry> {
    let mut registry = HandlerRegistry::new();

    registry.register(
        event_schema::topics::USER_CREATED,
        Arc::new(UserCreatedHandler::new(guard.clone(), replicas.clone())),
    )?;
    registry.register(
        event_schema::topics::USER_UPDATED,
        Arc::new(UserUpdatedHandler::new(guard.clone(), replicas.clone())),
    )?;
    registry.register(
        event_schema::topics::USER_USERNAME_CHANGED,
        Arc::new(UsernameChangedHandler::new(guard, replicas)),
    )?;

    Ok(registry)
}
