//! Kafka consumer loop with per-topic handler dispatch
//!
//! Exactly one handler is bound per topic, all registered before the loop
//! starts. A message whose topic has no handler is dropped with a warning.
//! Handler failures are caught and logged per message so one bad message can
//! never halt the loop, and handler execution is bounded by a timeout so a
//! stalled handler cannot block the partition. Offsets are committed after
//! dispatch regardless of handler outcome: failed messages are dropped, not
//! re-queued, and redelivery safety comes from idempotent handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use tracing::{debug, error, info, warn};

use crate::error::{AppError, Result};
use crate::metrics;

/// Handler for one consumed topic.
///
/// Implementations parse the envelope themselves and must be idempotent:
/// delivery is at-least-once and unordered across partitions.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> anyhow::Result<()>;
}

/// Topic-to-handler table, populated at startup before consumption begins
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `topic`. Binding a topic twice is a wiring bug and
    /// fails loudly instead of silently replacing the first handler.
    pub fn register(&mut self, topic: &str, handler: Arc<dyn EventHandler>) -> Result<()> {
        if self.handlers.contains_key(topic) {
            return Err(AppError::Internal(format!(
                "handler already registered for topic {topic}"
            )));
        }
        self.handlers.insert(topic.to_string(), handler);
        Ok(())
    }

    pub fn get(&self, topic: &str) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(topic)
    }

    pub fn topics(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Single poll loop dispatching messages to registered handlers
pub struct EventConsumer {
    consumer: StreamConsumer,
    registry: HandlerRegistry,
    handler_timeout: Duration,
}

impl EventConsumer {
    /// Create the consumer and subscribe to every registered topic.
    ///
    /// All instances of the service share `group_id` so each message is
    /// handled once per deployment, not once per instance.
    pub fn new(
        brokers: &str,
        group_id: &str,
        registry: HandlerRegistry,
        handler_timeout: Duration,
    ) -> Result<Self> {
        if registry.is_empty() {
            return Err(AppError::Internal(
                "cannot start consumer with no registered handlers".to_string(),
            ));
        }

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "45000")
            .set("max.poll.interval.ms", "300000")
            .create()
            .map_err(|err| AppError::Internal(format!("failed to create Kafka consumer: {err}")))?;

        let topics = registry.topics();
        consumer
            .subscribe(&topics)
            .map_err(|err| AppError::Internal(format!("failed to subscribe: {err}")))?;

        info!(
            group_id = %group_id,
            topics = ?topics,
            "Post service Kafka consumer subscribed"
        );

        Ok(Self {
            consumer,
            registry,
            handler_timeout,
        })
    }

    /// Run the poll loop until the task is aborted.
    pub async fn run(self) {
        loop {
            match self.consumer.recv().await {
                Ok(message) => {
                    self.dispatch(&message).await;

                    if let Err(commit_err) =
                        self.consumer.commit_message(&message, CommitMode::Async)
                    {
                        warn!("Failed to commit Kafka offset: {}", commit_err);
                    }
                }
                Err(err) => {
                    error!("Kafka consumer error: {}", err);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn dispatch(&self, message: &BorrowedMessage<'_>) {
        let topic = message.topic();

        let Some(handler) = self.registry.get(topic) else {
            warn!(topic = %topic, "No handler registered for topic, dropping message");
            metrics::record_event_consumed(topic, "dropped");
            return;
        };

        let Some(payload) = message.payload() else {
            warn!(topic = %topic, "Received message with empty payload, dropping");
            metrics::record_event_consumed(topic, "dropped");
            return;
        };

        let outcome = run_handler(handler.as_ref(), topic, payload, self.handler_timeout).await;
        if outcome == "success" {
            debug!(
                topic = %topic,
                partition = message.partition(),
                offset = message.offset(),
                "Handled event"
            );
        }
    }
}

/// Invoke `handler` on `payload`, bounding execution by `timeout`.
///
/// Failed and timed-out handlers drop the message rather than re-queue it.
/// The returned label is the outcome recorded to the consumed-events counter:
/// `success`, `failure`, or `timeout`.
async fn run_handler(
    handler: &dyn EventHandler,
    topic: &str,
    payload: &[u8],
    timeout: Duration,
) -> &'static str {
    let outcome = match tokio::time::timeout(timeout, handler.handle(payload)).await {
        Ok(Ok(())) => "success",
        Ok(Err(err)) => {
            warn!(error = %err, topic = %topic, "Handler failed, message dropped");
            "failure"
        }
        Err(_) => {
            warn!(
                topic = %topic,
                timeout_secs = timeout.as_secs(),
                "Handler timed out, message dropped"
            );
            "timeout"
        }
    };

    metrics::record_event_consumed(topic, outcome);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    mock! {
        Handler {}

        #[async_trait]
        impl EventHandler for Handler {
            async fn handle(&self, payload: &[u8]) -> anyhow::Result<()>;
        }
    }

    struct CountingHandler {
        calls: AtomicUsize,
    }

    impl CountingHandler {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _payload: &[u8]) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct SleepingHandler;

    #[async_trait]
    impl EventHandler for SleepingHandler {
        async fn handle(&self, _payload: &[u8]) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    /// Sum of the consumed-events counter for one (topic, result) pair.
    fn consumed_total(topic: &str, result: &str) -> f64 {
        prometheus::gather()
            .into_iter()
            .filter(|family| family.get_name() == "post_events_consumed_total")
            .flat_map(|family| family.get_metric().to_vec())
            .filter(|metric| {
                let labels = metric.get_label();
                labels
                    .iter()
                    .any(|label| label.get_name() == "topic" && label.get_value() == topic)
                    && labels
                        .iter()
                        .any(|label| label.get_name() == "result" && label.get_value() == result)
            })
            .map(|metric| metric.get_counter().get_value())
            .sum()
    }

    #[test]
    fn test_register_rejects_duplicate_topic() {
        let mut registry = HandlerRegistry::new();
        registry
            .register("post.created", Arc::new(CountingHandler::new()))
            .unwrap();

        let result = registry.register("post.created", Arc::new(CountingHandler::new()));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_topic_has_no_handler() {
        let mut registry = HandlerRegistry::new();
        registry
            .register("auth.user.created", Arc::new(CountingHandler::new()))
            .unwrap();

        assert!(registry.get("auth.user.created").is_some());
        assert!(registry.get("auth.user.deleted").is_none());
    }

    #[test]
    fn test_topics_lists_all_registered() {
        let mut registry = HandlerRegistry::new();
        registry
            .register("auth.user.created", Arc::new(CountingHandler::new()))
            .unwrap();
        registry
            .register("auth.user.updated", Arc::new(CountingHandler::new()))
            .unwrap();

        let mut topics = registry.topics();
        topics.sort_unstable();
        assert_eq!(topics, vec!["auth.user.created", "auth.user.updated"]);
    }

    #[tokio::test]
    async fn test_registered_handler_receives_payload() {
        let handler = Arc::new(CountingHandler::new());
        let mut registry = HandlerRegistry::new();
        registry
            .register("auth.user.created", handler.clone())
            .unwrap();

        let bound = registry.get("auth.user.created").unwrap();
        bound.handle(b"{}").await.unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_passes_payload_bytes_unchanged() {
        let mut mock = MockHandler::new();
        mock.expect_handle()
            .withf(|payload: &[u8]| payload == br#"{"id":"u1"}"#)
            .times(1)
            .returning(|_| Ok(()));

        let mut registry = HandlerRegistry::new();
        registry
            .register("auth.user.updated", Arc::new(mock))
            .unwrap();

        registry
            .get("auth.user.updated")
            .unwrap()
            .handle(br#"{"id":"u1"}"#)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_handler_error_does_not_poison_registry() {
        let mut mock = MockHandler::new();
        mock.expect_handle()
            .times(2)
            .returning(|_| Err(anyhow::anyhow!("boom")));

        let mut registry = HandlerRegistry::new();
        registry
            .register("auth.user.created", Arc::new(mock))
            .unwrap();

        let bound = registry.get("auth.user.created").unwrap();
        assert!(bound.handle(b"{}").await.is_err());
        assert!(bound.handle(b"{}").await.is_err());
    }

    #[tokio::test]
    async fn test_stalled_handler_times_out_and_is_dropped() {
        // Topic string is unique to this test so the counter starts at zero.
        let topic = "auth.user.created.stall";

        let outcome =
            run_handler(&SleepingHandler, topic, b"{}", Duration::from_millis(20)).await;

        assert_eq!(outcome, "timeout");
        assert_eq!(consumed_total(topic, "timeout"), 1.0);
    }

    #[tokio::test]
    async fn test_failing_handler_is_dropped_not_retried() {
        let mut mock = MockHandler::new();
        mock.expect_handle()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("replica unavailable")));

        let outcome =
            run_handler(&mock, "auth.user.updated", b"{}", Duration::from_secs(1)).await;

        assert_eq!(outcome, "failure");
    }

    #[tokio::test]
    async fn test_fast_handler_completes_within_timeout() {
        let handler = CountingHandler::new();

        let outcome =
            run_handler(&handler, "auth.user.created", b"{}", Duration::from_secs(1)).await;

        assert_eq!(outcome, "success");
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }
}
