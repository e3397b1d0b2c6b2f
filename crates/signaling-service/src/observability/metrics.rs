//! Metrics definitions for the signaling service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `sig_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `actor_type`: 2 values (call, connection)
//! - `event`: bounded by the inbound event table (~12 values)
//! - `outcome`: applied, dropped, rejected, error
//! - `operation`: get, update

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle used to render
/// `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Event handling latency - in-process work plus one store round trip
        .set_buckets_for_metric(
            Matcher::Prefix("sig_event".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set event latency buckets: {e}"))?
        // Store latency - internal call like a Redis command
        .set_buckets_for_metric(
            Matcher::Prefix("sig_store".to_string()),
            &[
                0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500,
            ],
        )
        .map_err(|e| format!("Failed to set store latency buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Gauges
// ============================================================================

/// Metric: `sig_connections_active`
pub fn set_connections_active(count: u64) {
    // u64 to f64 conversion is safe for realistic connection counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("sig_connections_active").set(count as f64);
}

/// Metric: `sig_calls_active`
///
/// Counts call actors resident in memory, not call records.
pub fn set_calls_active(count: u64) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("sig_calls_active").set(count as f64);
}

// ============================================================================
// Events
// ============================================================================

/// Record one handled inbound event.
///
/// Metric: `sig_events_total`
/// Labels: `event`, `outcome`
pub fn record_event(event: &'static str, outcome: &'static str) {
    counter!("sig_events_total", "event" => event, "outcome" => outcome).increment(1);
}

/// Metric: `sig_event_latency_seconds`
/// Labels: `event`
pub fn record_event_latency(event: &'static str, duration: Duration) {
    histogram!("sig_event_latency_seconds", "event" => event).record(duration.as_secs_f64());
}

/// Metric: `sig_store_latency_seconds`
/// Labels: `operation`
pub fn record_store_latency(operation: &'static str, duration: Duration) {
    histogram!("sig_store_latency_seconds", "operation" => operation)
        .record(duration.as_secs_f64());
}

// ============================================================================
// Actor health
// ============================================================================

/// Metric: `sig_messages_dropped_total`
/// Labels: `actor_type`
///
/// Non-zero values mean a consumer is falling behind.
pub fn record_message_dropped(actor_type: &'static str) {
    counter!("sig_messages_dropped_total", "actor_type" => actor_type).increment(1);
}

/// Metric: `sig_actor_panics_total`
/// Labels: `actor_type`
///
/// ALERT: Any non-zero value indicates a bug.
pub fn record_actor_panic(actor_type: &'static str) {
    counter!("sig_actor_panics_total", "actor_type" => actor_type).increment(1);
}
