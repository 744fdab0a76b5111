//! Metrics definitions for the signaling relay.
//!
//! All metrics follow Prometheus naming conventions:
//! - `sg_` prefix for the signaling relay
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `outcome`: join and gate outcomes (~6 values)
//! - `kind`: offer, answer, ice-candidate, chat-message
//! - `reason`: drop and call-end reasons (~6 values each)
//!
//! No label carries a room id, appointment id or identity.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used by `/metrics`.
///
/// Must be called before any metrics are recorded. Gate latency buckets span
/// the configured gate timeout range.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("sg_auth_gate".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set auth gate buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Gauges
// ============================================================================

/// Set the number of registered connections.
///
/// Metric: `sg_connections_active`
pub fn set_connections_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("sg_connections_active").set(count as f64);
}

/// Set the number of live rooms.
///
/// Metric: `sg_rooms_active`
pub fn set_rooms_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("sg_rooms_active").set(count as f64);
}

/// Set the signaling actor's mailbox depth.
///
/// Metric: `sg_actor_mailbox_depth`
pub fn set_actor_mailbox_depth(depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("sg_actor_mailbox_depth").set(depth as f64);
}

// ============================================================================
// Counters
// ============================================================================

/// Record a join outcome.
///
/// Metric: `sg_joins_total`
/// Labels: `outcome` (accepted, room_full, denied, invalid, error, abandoned)
pub fn record_join(outcome: &'static str) {
    counter!("sg_joins_total", "outcome" => outcome).increment(1);
}

/// Record a forwarded message.
///
/// Metric: `sg_messages_relayed_total`
/// Labels: `kind` (offer, answer, ice-candidate, chat-message)
pub fn record_message_relayed(kind: &'static str) {
    counter!("sg_messages_relayed_total", "kind" => kind).increment(1);
}

/// Record a message that was not delivered.
///
/// Metric: `sg_messages_dropped_total`
/// Labels: `reason` (target_unreachable, outbound_full, connection_closed,
/// empty_chat, malformed)
pub fn record_message_dropped(reason: &'static str) {
    counter!("sg_messages_dropped_total", "reason" => reason).increment(1);
}

/// Record a call termination.
///
/// Metric: `sg_calls_ended_total`
/// Labels: `reason` (end_call, room_emptied)
pub fn record_call_ended(reason: &'static str) {
    counter!("sg_calls_ended_total", "reason" => reason).increment(1);
}

// ============================================================================
// Histograms
// ============================================================================

/// Record an Authorization Gate check.
///
/// Metric: `sg_auth_gate_duration_seconds`
/// Labels: `outcome` (allowed, denied, error, timeout)
pub fn record_auth_gate_check(outcome: &'static str, duration: Duration) {
    histogram!("sg_auth_gate_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());
}
