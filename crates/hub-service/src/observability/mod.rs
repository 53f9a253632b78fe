//! Observability for the hub: health endpoints and Prometheus metrics.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `hub_connections_active` | Gauge | none | Registered connections |
//! | `hub_messages_routed_total` | Counter | `scope` | Payloads routed |
//! | `hub_deliveries_total` | Counter | `scope` | Payloads enqueued to connections |
//! | `hub_messages_dropped_total` | Counter | `reason` | Payloads that reached nobody |
//! | `hub_connections_evicted_total` | Counter | `reason` | Slow consumers dropped on a full buffer |
//! | `hub_connections_stale_removed_total` | Counter | none | Entries whose writer had already exited |
//! | `hub_membership_lookup_seconds` | Histogram | `status` | Room membership lookup latency |
//! | `hub_route_duration_seconds` | Histogram | `scope` | Time spent routing one payload |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState, Readiness};
pub use metrics::init_metrics_recorder;
