//! Liveness and readiness endpoints.
//!
//! - `GET /health` answers 200 while the process is up.
//! - `GET /ready` answers 200 only while startup has completed, shutdown has
//!   not begun, and the hub command loop is still running. The body reports
//!   each condition and the current connection count.
//!
//! A hub task that stops on its own (cancelled or panicked) makes the
//! service unready without anyone flipping the flag.

use crate::actors::HubHandle;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Readiness state: a startup/shutdown flag plus the hub it watches.
pub struct HealthState {
    accepting: AtomicBool,
    hub: HubHandle,
}

/// Body of `GET /ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    pub ready: bool,
    pub accepting: bool,
    pub hub_running: bool,
    pub connections: usize,
}

impl HealthState {
    /// Not ready until [`HealthState::set_ready`] is called.
    #[must_use]
    pub fn new(hub: HubHandle) -> Self {
        Self {
            accepting: AtomicBool::new(false),
            hub,
        }
    }

    /// Startup finished; connections may be accepted.
    pub fn set_ready(&self) {
        self.accepting.store(true, Ordering::SeqCst);
    }

    /// Shutdown has begun.
    pub fn set_not_ready(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.readiness().ready
    }

    #[must_use]
    pub fn readiness(&self) -> Readiness {
        let accepting = self.accepting.load(Ordering::SeqCst);
        let hub_running = self.hub.is_running();
        Readiness {
            ready: accepting && hub_running,
            accepting,
            hub_running,
            connections: self.hub.stats().connection_count(),
        }
    }
}

/// Router serving `/health` and `/ready`.
pub fn health_router(health_state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .route("/ready", get(readiness_handler))
        .with_state(health_state)
}

async fn readiness_handler(
    State(state): State<Arc<HealthState>>,
) -> (StatusCode, Json<Readiness>) {
    let readiness = state.readiness();
    let status = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(readiness))
}
