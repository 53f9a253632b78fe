//! Router tests for the producer, status, health and metrics endpoints.
//!
//! Requests go straight into the axum router with `oneshot`; no listener
//! is bound.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use hub_service::actors::{ConnectionSettings, HubHandle, HubSettings};
use hub_service::observability::HealthState;
use hub_service::routes::{build_routes, AppState};
use hub_test_utils::{flush, MockMembershipStore, StaticIdentityResolver, TestConnection};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    hub: HubHandle,
    hub_task: JoinHandle<()>,
    health: Arc<HealthState>,
}

fn test_app(store: &MockMembershipStore) -> TestApp {
    let (hub, hub_task) = HubHandle::spawn(
        HubSettings::default(),
        store.shared(),
        CancellationToken::new(),
    );
    let state = Arc::new(AppState {
        hub: hub.clone(),
        identity: Arc::new(StaticIdentityResolver::anonymous()),
        connection_settings: ConnectionSettings::default(),
        max_message_bytes: 64 * 1024,
    });
    let health = Arc::new(HealthState::new(hub.clone()));
    let metrics_handle = PrometheusBuilder::new().build_recorder().handle();

    TestApp {
        router: build_routes(state, Arc::clone(&health), metrics_handle),
        hub,
        hub_task,
        health,
    }
}

fn post(uri: &str, body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================================
// Producer endpoints
// ============================================================================

#[tokio::test]
async fn test_route_endpoint_accepts_and_delivers() -> Result<()> {
    let store = MockMembershipStore::new().with_room("42", &["gm"]);
    let app = test_app(&store);
    let mut gm = TestConnection::register(&app.hub, Some("gm"), 8).await;

    let response = app
        .router
        .oneshot(post(
            "/internal/route",
            r#"{"type":"EVENT","game_id":"42","content":"Session started"}"#,
        ))
        .await?;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(gm.recv_json().await["content"], "Session started");
    Ok(())
}

#[tokio::test]
async fn test_route_endpoint_rejects_invalid_json() -> Result<()> {
    let app = test_app(&MockMembershipStore::new());
    let mut conn = TestConnection::register(&app.hub, Some("gm"), 8).await;

    let response = app
        .router
        .oneshot(post("/internal/route", "{not json"))
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "INVALID_PAYLOAD");

    flush(&app.hub).await;
    conn.assert_empty();
    Ok(())
}

#[tokio::test]
async fn test_route_endpoint_rejects_non_object_json() -> Result<()> {
    let app = test_app(&MockMembershipStore::new());

    let response = app.router.oneshot(post("/internal/route", "[1,2]")).await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_user_endpoint_delivers_to_owner_only() -> Result<()> {
    let app = test_app(&MockMembershipStore::new());
    let mut owner = TestConnection::register(&app.hub, Some("p1"), 8).await;
    let mut other = TestConnection::register(&app.hub, Some("p2"), 8).await;

    let response = app
        .router
        .oneshot(post(
            "/internal/users/p1",
            r#"{"type":"CHARACTER_UPDATE","payload":{"hp":12}}"#,
        ))
        .await?;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(owner.recv_json().await["payload"]["hp"], 12);
    flush(&app.hub).await;
    other.assert_empty();
    Ok(())
}

#[tokio::test]
async fn test_room_endpoint_delivers_to_members() -> Result<()> {
    let store = MockMembershipStore::new().with_room("42", &["gm", "p1"]);
    let app = test_app(&store);
    let mut p1 = TestConnection::register(&app.hub, Some("p1"), 8).await;
    let mut outsider = TestConnection::register(&app.hub, Some("p9"), 8).await;

    let response = app
        .router
        .oneshot(post(
            "/internal/rooms/42",
            r#"{"type":"GAME_STATE_UPDATE","game_id":"42","state":"paused"}"#,
        ))
        .await?;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(p1.recv_json().await["state"], "paused");
    flush(&app.hub).await;
    outsider.assert_empty();
    Ok(())
}

#[tokio::test]
async fn test_publish_endpoints_reject_invalid_json() -> Result<()> {
    let app = test_app(&MockMembershipStore::new());

    let user = app
        .router
        .clone()
        .oneshot(post("/internal/users/p1", "nope"))
        .await?;
    let room = app
        .router
        .oneshot(post("/internal/rooms/42", "nope"))
        .await?;

    assert_eq!(user.status(), StatusCode::BAD_REQUEST);
    assert_eq!(room.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_producer_endpoints_unavailable_after_hub_stops() -> Result<()> {
    let app = test_app(&MockMembershipStore::new());
    app.hub.cancel();
    app.hub_task.await?;

    let response = app
        .router
        .oneshot(post("/internal/route", r#"{"content":"late"}"#))
        .await?;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "HUB_UNAVAILABLE");
    Ok(())
}

// ============================================================================
// Status, health and metrics
// ============================================================================

#[tokio::test]
async fn test_status_endpoint_reports_hub_counts() -> Result<()> {
    let app = test_app(&MockMembershipStore::new());
    let _a = TestConnection::register(&app.hub, Some("p1"), 8).await;
    let _b = TestConnection::register(&app.hub, Some("p1"), 8).await;
    let _c = TestConnection::register(&app.hub, None, 8).await;
    app.hub.send_to_all("{}").await?;

    let response = app.router.oneshot(get("/internal/status")).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["connection_count"], 3);
    assert_eq!(body["user_count"], 1);
    assert_eq!(body["messages_routed"], 1);
    assert_eq!(body["evictions"], 0);
    assert_eq!(body["stale_removals"], 0);
    Ok(())
}

#[tokio::test]
async fn test_health_and_readiness_endpoints() -> Result<()> {
    let app = test_app(&MockMembershipStore::new());

    let live = app.router.clone().oneshot(get("/health")).await?;
    assert_eq!(live.status(), StatusCode::OK);

    let not_ready = app.router.clone().oneshot(get("/ready")).await?;
    assert_eq!(not_ready.status(), StatusCode::SERVICE_UNAVAILABLE);

    app.health.set_ready();
    let ready = app.router.oneshot(get("/ready")).await?;
    assert_eq!(ready.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_readiness_fails_once_hub_stops() -> Result<()> {
    let app = test_app(&MockMembershipStore::new());
    app.health.set_ready();

    app.hub.cancel();
    app.hub_task.await?;

    let response = app.router.oneshot(get("/ready")).await?;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["accepting"], true);
    assert_eq!(body["hub_running"], false);
    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint_renders() -> Result<()> {
    let app = test_app(&MockMembershipStore::new());

    let response = app.router.oneshot(get("/metrics")).await?;

    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}
