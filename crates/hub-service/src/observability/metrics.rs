//! Metrics definitions for the realtime hub.
//!
//! All metrics use the `hub_` prefix. Label values are bounded by code:
//! - `scope`: private, room, global, user
//! - `reason`: malformed, membership_error, membership_timeout for drops;
//!   slow_consumer for evictions
//! - `status`: success, error, timeout

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus metrics recorder and return the render handle.
///
/// Must be called once, before any metric is recorded.
///
/// # Errors
///
/// Returns an error if bucket configuration fails or a global recorder is
/// already installed.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Membership lookups hit Postgres (p99 < 50ms target)
        .set_buckets_for_metric(
            Matcher::Prefix("hub_membership".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set membership lookup buckets: {e}"))?
        // Routing covers decode, optional lookup and fan-out
        .set_buckets_for_metric(
            Matcher::Prefix("hub_route".to_string()),
            &[
                0.0001, 0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set route duration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Connection Metrics
// ============================================================================

/// Set the number of registered connections.
///
/// Metric: `hub_connections_active`
pub fn set_connections_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("hub_connections_active").set(count as f64);
}

/// Record a live connection dropped by the hub for falling behind.
///
/// Metric: `hub_connections_evicted_total`
/// Labels: `reason` (`slow_consumer`)
pub fn record_connection_evicted(reason: &'static str) {
    counter!("hub_connections_evicted_total", "reason" => reason).increment(1);
}

/// Record a table entry whose writer had already exited, found on delivery.
///
/// Metric: `hub_connections_stale_removed_total`
pub fn record_stale_connection_removed() {
    counter!("hub_connections_stale_removed_total").increment(1);
}

// ============================================================================
// Routing Metrics
// ============================================================================

/// Record a routed payload and its fan-out.
///
/// Metrics: `hub_messages_routed_total`, `hub_deliveries_total`,
/// `hub_route_duration_seconds`
/// Labels: `scope` (private, room, global, user)
pub fn record_message_routed(scope: &'static str, deliveries: usize, duration: Duration) {
    counter!("hub_messages_routed_total", "scope" => scope).increment(1);
    counter!("hub_deliveries_total", "scope" => scope).increment(deliveries as u64);
    histogram!("hub_route_duration_seconds", "scope" => scope).record(duration.as_secs_f64());
}

/// Record a payload that reached no connection.
///
/// Metric: `hub_messages_dropped_total`
/// Labels: `reason`
pub fn record_message_dropped(reason: &'static str) {
    counter!("hub_messages_dropped_total", "reason" => reason).increment(1);
}

// ============================================================================
// Membership Metrics
// ============================================================================

/// Record a room membership lookup.
///
/// Metric: `hub_membership_lookup_seconds`
/// Labels: `status` (success, error, timeout)
pub fn record_membership_lookup(status: &'static str, duration: Duration) {
    histogram!("hub_membership_lookup_seconds", "status" => status)
        .record(duration.as_secs_f64());
}
