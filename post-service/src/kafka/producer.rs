//! Kafka event producer
//!
//! Wraps every payload in an [`EventEnvelope`] so downstream consumers can
//! de-duplicate on the generated event id. Delivery is at-most-once from the
//! caller's point of view: the send is awaited with a bounded timeout and a
//! failure surfaces as an error for the caller to log, never to retry.

use std::time::Duration;

use event_schema::EventEnvelope;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::metrics;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared Kafka producer for post domain events
#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("client.id", "post-service")
            // Idempotency and reliability settings
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("max.in.flight.requests.per.connection", "5")
            .set("retries", "3")
            .set("message.timeout.ms", "5000")
            .set("linger.ms", "5")
            .create::<FutureProducer>()
            .map_err(|err| AppError::Internal(format!("failed to create Kafka producer: {err}")))?;

        info!(brokers = %brokers, "Post service Kafka producer initialized");

        Ok(Self { producer })
    }

    /// Publish a domain event to `topic`, keyed by `partition_key_id`.
    ///
    /// The payload is wrapped in an envelope carrying a fresh `eventId` and
    /// `occurredAt` timestamp before serialization.
    pub async fn publish<T: Serialize>(
        &self,
        topic: &str,
        partition_key_id: Uuid,
        payload: T,
    ) -> Result<()> {
        let envelope = EventEnvelope::new(payload);
        let event_id = envelope.event_id;
        let serialized = serde_json::to_string(&envelope)?;
        let partition_key = partition_key_id.to_string();

        let record = FutureRecord::to(topic)
            .key(&partition_key)
            .payload(&serialized);

        match self.producer.send(record, SEND_TIMEOUT).await {
            Ok(_) => {
                metrics::record_event_published(topic, "success");
                debug!(
                    topic = %topic,
                    event_id = %event_id,
                    partition_key = %partition_key,
                    "Published event to Kafka"
                );
                Ok(())
            }
            Err((err, _)) => {
                metrics::record_event_published(topic, "failure");
                warn!(
                    error = ?err,
                    topic = %topic,
                    event_id = %event_id,
                    "Failed to publish event to Kafka"
                );
                Err(AppError::Internal(format!(
                    "failed to publish event to {topic}: {err}"
                )))
            }
        }
    }
}
