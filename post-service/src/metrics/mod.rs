//! Prometheus metrics for post-service.
//!
//! Exposes event pipeline collectors and an HTTP handler for the `/metrics`
//! endpoint.

use actix_web::HttpResponse;
use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

lazy_static! {
    /// Events published per topic, segmented by outcome (success/failure).
    static ref EVENTS_PUBLISHED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "post_events_published_total",
        "Domain events published to Kafka segmented by topic and outcome",
        &["topic", "result"]
    )
    .expect("failed to register post_events_published_total");

    /// Events consumed per topic, segmented by outcome
    /// (success/failure/timeout/dropped).
    static ref EVENTS_CONSUMED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "post_events_consumed_total",
        "Kafka messages dispatched to handlers segmented by topic and outcome",
        &["topic", "result"]
    )
    .expect("failed to register post_events_consumed_total");

    /// Post cache events (hit/miss/error).
    static ref CACHE_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "post_cache_events_total",
        "Post cache lookups segmented by outcome",
        &["event"]
    )
    .expect("failed to register post_cache_events_total");
}

/// Record a publish attempt outcome
pub fn record_event_published(topic: &str, result: &str) {
    EVENTS_PUBLISHED_TOTAL
        .with_label_values(&[topic, result])
        .inc();
}

/// Record a consumed-message dispatch outcome
pub fn record_event_consumed(topic: &str, result: &str) {
    EVENTS_CONSUMED_TOTAL
        .with_label_values(&[topic, result])
        .inc();
}

/// Record a cache lookup outcome
pub fn record_cache_event(event: &str) {
    CACHE_EVENTS_TOTAL.with_label_values(&[event]).inc();
}

/// Actix handler that renders Prometheus metrics in text format.
pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
