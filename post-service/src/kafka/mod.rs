//! Kafka client layer
//!
//! One shared producer publishes domain events wrapped in the standard
//! envelope; one consumer loop dispatches inbound messages to the handler
//! registered for their topic. Both are created at startup and injected
//! into dependents, never accessed through globals.

pub mod consumer;
pub mod producer;

pub use consumer::{EventConsumer, EventHandler, HandlerRegistry};
pub use producer::EventProducer;
