//! Prometheus metrics for the notification core.
//!
//! - Broker metrics (queue, detail store, subscriptions)
//! - Trigger outcomes
//! - Live fan-out (publishes, listener deliveries and failures)

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "notification_core";

lazy_static! {
    // ============================================================================
    // Broker Metrics
    // ============================================================================

    pub static ref QUEUE_PUSHED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_queue_pushed_total", METRIC_PREFIX),
        "Total entries pushed to the durable queue"
    ).unwrap();

    pub static ref QUEUE_POPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_queue_popped_total", METRIC_PREFIX),
        "Total entries popped from the durable queue"
    ).unwrap();

    pub static ref QUEUE_EMPTY_POPS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_queue_empty_pops_total", METRIC_PREFIX),
        "Total pops that found the queue empty"
    ).unwrap();

    pub static ref QUEUE_MALFORMED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_queue_malformed_total", METRIC_PREFIX),
        "Total popped entries that failed to deserialize"
    ).unwrap();

    pub static ref DETAILS_STORED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_details_stored_total", METRIC_PREFIX),
        "Total detail records written"
    ).unwrap();

    /// Subscription registry changes by operation (subscribe/unsubscribe)
    pub static ref SUBSCRIPTION_CHANGES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_subscription_changes_total", METRIC_PREFIX),
        "Total subscription registry changes",
        &["operation"]
    ).unwrap();

    /// Backing store failures by broker operation
    pub static ref STORE_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_store_errors_total", METRIC_PREFIX),
        "Total backing store failures",
        &["operation"]
    ).unwrap();

    // ============================================================================
    // Trigger Metrics
    // ============================================================================

    /// Trigger outcomes (ok/rejected/failed)
    pub static ref TRIGGERS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_triggers_total", METRIC_PREFIX),
        "Total trigger invocations by outcome",
        &["outcome"]
    ).unwrap();

    // ============================================================================
    // Fan-out Metrics
    // ============================================================================

    pub static ref PUBLISHED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_published_total", METRIC_PREFIX),
        "Total notifications published on the live channel"
    ).unwrap();

    pub static ref PUBLISH_FAILED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_publish_failed_total", METRIC_PREFIX),
        "Total live publishes that failed after persistence"
    ).unwrap();

    pub static ref LISTENER_MESSAGES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_listener_messages_total", METRIC_PREFIX),
        "Total messages received by live listeners"
    ).unwrap();

    pub static ref LISTENER_MALFORMED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_listener_malformed_total", METRIC_PREFIX),
        "Total live messages that failed to parse"
    ).unwrap();

    pub static ref LISTENER_HANDLER_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_listener_handler_failures_total", METRIC_PREFIX),
        "Total handler failures isolated by live listeners"
    ).unwrap();
}

/// Encode all registered metrics in Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}
