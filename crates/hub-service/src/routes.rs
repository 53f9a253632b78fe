//! HTTP routes for the hub.
//!
//! Defines the axum router and application state.

use crate::actors::{ConnectionSettings, HubHandle};
use crate::handlers;
use crate::identity::IdentityResolver;
use crate::observability::{health_router, HealthState};
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,

    /// Resolves connection owners from request headers.
    pub identity: Arc<dyn IdentityResolver>,

    /// Transport settings for accepted connections.
    pub connection_settings: ConnectionSettings,

    /// Inbound WebSocket frame size limit.
    pub max_message_bytes: usize,
}

/// Build the application routes.
///
/// - `GET /ws` - WebSocket acceptor
/// - `POST /internal/route`, `/internal/users/:user_id`, `/internal/rooms/:room_id` - producers
/// - `GET /internal/status` - hub status
/// - `GET /health`, `GET /ready` - liveness and readiness
/// - `GET /metrics` - Prometheus scrape
pub fn build_routes(
    state: Arc<AppState>,
    health_state: Arc<HealthState>,
    metrics_handle: PrometheusHandle,
) -> Router {
    // Producer calls are short; the WebSocket route returns as soon as the
    // upgrade response is written, so only this group carries a timeout.
    let internal_routes = Router::new()
        .route("/internal/route", post(handlers::route_payload))
        .route("/internal/users/:user_id", post(handlers::publish_to_user))
        .route("/internal/rooms/:room_id", post(handlers::publish_to_room))
        .route("/internal/status", get(handlers::hub_status))
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .with_state(Arc::clone(&state));

    let ws_routes = Router::new()
        .route("/ws", get(handlers::ws_handler))
        .with_state(state);

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    ws_routes
        .merge(internal_routes)
        .merge(metrics_routes)
        .merge(health_router(health_state))
        .layer(TraceLayer::new_for_http())
}
