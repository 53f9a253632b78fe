//! HTTP request handlers for the hub.

pub mod metrics;
pub mod publish;
pub mod ws;

pub use metrics::metrics_handler;
pub use publish::{hub_status, publish_to_room, publish_to_user, route_payload};
pub use ws::ws_handler;
