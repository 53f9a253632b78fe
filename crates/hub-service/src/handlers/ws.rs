//! Connection acceptor.
//!
//! `GET /ws` upgrades the request to a WebSocket, resolves the caller's
//! identity, registers the connection with the hub and starts its loops.
//! A caller without a resolvable identity is accepted as anonymous and only
//! receives global messages.

use crate::actors::{attach, ConnectionSettings, HubHandle};
use crate::errors::HubError;
use crate::identity::AuthenticatedUser;
use crate::routes::AppState;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
    Extension,
};
use common::types::UserId;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Handler for GET /ws
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    authenticated: Option<Extension<AuthenticatedUser>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if !state.hub.is_running() {
        return HubError::HubUnavailable.into_response();
    }

    let user_id = match authenticated {
        Some(Extension(AuthenticatedUser(user_id))) => Some(user_id),
        None => state.identity.resolve(&headers),
    };

    let hub = state.hub.clone();
    let settings = state.connection_settings;

    ws.max_message_size(state.max_message_bytes)
        .on_upgrade(move |socket| accept(socket, hub, user_id, settings))
}

#[instrument(skip_all, name = "hub.acceptor", fields(anonymous = user_id.is_none()))]
async fn accept(
    socket: WebSocket,
    hub: HubHandle,
    user_id: Option<UserId>,
    settings: ConnectionSettings,
) {
    let (sink, stream) = socket.split();
    let owner = user_id.clone();

    match attach(&hub, user_id, sink, stream, settings).await {
        Ok(tasks) => {
            info!(
                target: "hub.acceptor",
                connection_id = %tasks.connection_id,
                user_id = ?owner.as_ref().map(UserId::as_str),
                "Connection accepted"
            );
        }
        Err(e) => {
            warn!(
                target: "hub.acceptor",
                error = %e,
                "Dropping upgraded connection, hub unavailable"
            );
        }
    }
}
