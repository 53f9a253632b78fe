//! Producer endpoints.
//!
//! Out-of-process producers (the game API) hand payloads to the hub over
//! HTTP. These routes are meant for the private network only.
//!
//! Every endpoint answers 202 once the payload is queued on the hub; actual
//! delivery happens asynchronously and is never acknowledged. Payloads that
//! are not JSON are rejected here with 400 so producers find out early.

use crate::actors::HubStatus;
use crate::errors::HubError;
use crate::routes::AppState;
use crate::routing::Envelope;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use common::types::{RoomId, UserId};
use serde::de::IgnoredAny;
use std::sync::Arc;
use tracing::instrument;

/// Handler for POST /internal/route
///
/// Routes by the payload's own `type`, `target_id` and `game_id` fields.
#[instrument(skip_all, name = "hub.publish.route", fields(payload_bytes = body.len()))]
pub async fn route_payload(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<StatusCode, HubError> {
    Envelope::decode(&body).map_err(|e| HubError::InvalidPayload(e.to_string()))?;
    state.hub.route(body).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Handler for POST /internal/users/:user_id
#[instrument(skip_all, name = "hub.publish.user", fields(user_id = %user_id))]
pub async fn publish_to_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    body: Bytes,
) -> Result<StatusCode, HubError> {
    let user_id = UserId::parse(&user_id)
        .ok_or_else(|| HubError::InvalidPayload("user id must not be empty".to_string()))?;
    ensure_json(&body)?;
    state.hub.send_to_user(user_id, body).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Handler for POST /internal/rooms/:room_id
#[instrument(skip_all, name = "hub.publish.room", fields(room_id = %room_id))]
pub async fn publish_to_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    body: Bytes,
) -> Result<StatusCode, HubError> {
    let room_id = RoomId::parse(&room_id)
        .ok_or_else(|| HubError::InvalidPayload("room id must not be empty".to_string()))?;
    ensure_json(&body)?;
    state.hub.send_to_room(room_id, body).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Handler for GET /internal/status
pub async fn hub_status(State(state): State<Arc<AppState>>) -> Result<Json<HubStatus>, HubError> {
    Ok(Json(state.hub.status().await?))
}

fn ensure_json(body: &[u8]) -> Result<(), HubError> {
    serde_json::from_slice::<IgnoredAny>(body)
        .map(|_| ())
        .map_err(|e| HubError::InvalidPayload(format!("payload is not valid JSON: {e}")))
}
