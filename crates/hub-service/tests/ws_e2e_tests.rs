//! End-to-end tests over real WebSocket connections.
//!
//! Each test spawns a `TestHubServer` on a random port and connects
//! tokio-tungstenite clients, identified by the harness's `x-user-id` header.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use hub_test_utils::{room, user, MockMembershipStore, TestHubServer, TEST_IDENTITY_HEADER};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(2);

async fn connect(server: &TestHubServer, user_id: Option<&str>) -> Result<Client> {
    let mut request = server.ws_url().into_client_request()?;
    if let Some(user_id) = user_id {
        request
            .headers_mut()
            .insert(TEST_IDENTITY_HEADER, user_id.parse()?);
    }
    let (socket, _response) = tokio_tungstenite::connect_async(request).await?;
    Ok(socket)
}

/// Next text frame as JSON, skipping control frames.
async fn recv_json(client: &mut Client) -> Value {
    loop {
        let message = tokio::time::timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket ended")
            .expect("socket error");
        match message {
            Message::Text(text) => return serde_json::from_str(&text).expect("frame is JSON"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Assert no data frame arrives within a short window.
async fn assert_silent(client: &mut Client) {
    match tokio::time::timeout(Duration::from_millis(100), client.next()).await {
        Err(_) => {}
        Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
        Ok(other) => panic!("expected silence, got {other:?}"),
    }
}

/// Whether the server closed the socket within the wait window.
async fn closed_by_server(client: &mut Client) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        match tokio::time::timeout_at(deadline, client.next()).await {
            Err(_) => return false,
            Ok(None | Some(Err(_) | Ok(Message::Close(_)))) => return true,
            Ok(Some(Ok(_))) => {}
        }
    }
}

#[tokio::test]
async fn test_room_message_reaches_member_sockets_only() -> Result<()> {
    let store = MockMembershipStore::new().with_room("42", &["gm", "p1"]);
    let server = TestHubServer::spawn(store).await?;

    let mut gm = connect(&server, Some("gm")).await?;
    let mut p1 = connect(&server, Some("p1")).await?;
    let mut outsider = connect(&server, Some("p9")).await?;
    server.wait_for_connections(3).await?;

    server
        .hub()
        .route(r#"{"type":"CHAT_GLOBAL","game_id":"42","content":"Welcome"}"#)
        .await?;

    assert_eq!(recv_json(&mut gm).await["content"], "Welcome");
    assert_eq!(recv_json(&mut p1).await["content"], "Welcome");
    assert_silent(&mut outsider).await;
    Ok(())
}

#[tokio::test]
async fn test_private_message_echoes_to_sender_socket() -> Result<()> {
    let server = TestHubServer::spawn(MockMembershipStore::new()).await?;

    let mut sender = connect(&server, Some("p1")).await?;
    let mut target = connect(&server, Some("gm")).await?;
    let mut bystander = connect(&server, Some("p2")).await?;
    server.wait_for_connections(3).await?;

    let whisper = json!({
        "type": "CHAT_PRIVATE",
        "game_id": "42",
        "sender_id": "p1",
        "target_id": "gm",
        "content": "I open the chest",
    });
    server.hub().route_json(&whisper).await?;

    assert_eq!(recv_json(&mut target).await, whisper);
    assert_eq!(recv_json(&mut sender).await, whisper);
    assert_silent(&mut bystander).await;
    Ok(())
}

#[tokio::test]
async fn test_anonymous_socket_receives_global_only() -> Result<()> {
    let store = MockMembershipStore::new().with_room("42", &["gm"]);
    let server = TestHubServer::spawn(store).await?;

    let mut anonymous = connect(&server, None).await?;
    server.wait_for_connections(1).await?;

    server.hub().send_to_room(room("42"), r#"{"n":1}"#).await?;
    server.hub().send_to_user(user("gm"), r#"{"n":2}"#).await?;
    server.hub().send_to_all(r#"{"n":3}"#).await?;

    assert_eq!(recv_json(&mut anonymous).await["n"], 3);
    Ok(())
}

#[tokio::test]
async fn test_client_frames_are_not_routed() -> Result<()> {
    let server = TestHubServer::spawn(MockMembershipStore::new()).await?;

    let mut chatty = connect(&server, Some("p1")).await?;
    let mut listener = connect(&server, Some("p2")).await?;
    server.wait_for_connections(2).await?;

    chatty
        .send(Message::Text(r#"{"type":"CHAT_GLOBAL","content":"hi"}"#.into()))
        .await?;

    assert_silent(&mut listener).await;
    assert_eq!(server.hub().status().await?.messages_routed, 0);
    Ok(())
}

#[tokio::test]
async fn test_client_close_unregisters_connection() -> Result<()> {
    let server = TestHubServer::spawn(MockMembershipStore::new()).await?;

    let mut leaving = connect(&server, Some("p1")).await?;
    let _staying = connect(&server, Some("p2")).await?;
    server.wait_for_connections(2).await?;

    leaving.close(None).await?;
    server.wait_for_connections(1).await?;

    let live = server.hub().live_connections().await?;
    assert_eq!(live.first().unwrap().user_id, Some(user("p2")));
    Ok(())
}

#[tokio::test]
async fn test_dropped_client_unregisters_connection() -> Result<()> {
    let server = TestHubServer::spawn(MockMembershipStore::new()).await?;

    let client = connect(&server, Some("p1")).await?;
    server.wait_for_connections(1).await?;

    drop(client);
    server.wait_for_connections(0).await?;
    Ok(())
}

#[tokio::test]
async fn test_hub_shutdown_closes_sockets() -> Result<()> {
    let server = TestHubServer::spawn(MockMembershipStore::new()).await?;

    let mut client = connect(&server, Some("p1")).await?;
    server.wait_for_connections(1).await?;

    server.shutdown();

    assert!(closed_by_server(&mut client).await);
    assert!(!server.health().is_ready());
    Ok(())
}

#[tokio::test]
async fn test_oversized_client_frame_drops_connection() -> Result<()> {
    let overrides = HashMap::from([("HUB_MAX_MESSAGE_BYTES".to_string(), "64".to_string())]);
    let server = TestHubServer::spawn_with_vars(MockMembershipStore::new(), overrides).await?;

    let mut client = connect(&server, Some("p1")).await?;
    server.wait_for_connections(1).await?;

    client.send(Message::Text("x".repeat(1024))).await?;

    assert!(closed_by_server(&mut client).await);
    server.wait_for_connections(0).await?;
    Ok(())
}

#[tokio::test]
async fn test_upgrade_refused_when_hub_stopped() -> Result<()> {
    let server = TestHubServer::spawn(MockMembershipStore::new()).await?;

    server.hub().cancel();
    assert!(!server.hub().is_running());

    let request = server.ws_url().into_client_request()?;
    match tokio_tungstenite::connect_async(request).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 503);
        }
        other => panic!("expected HTTP 503, got {other:?}"),
    }
    Ok(())
}
