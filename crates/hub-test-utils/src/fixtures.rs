//! Hub fixtures.
//!
//! `TestConnection` registers directly with the hub using a plain channel as
//! its outbound buffer, so routing can be tested without sockets. Because the
//! hub handles commands in order, awaiting `hub.status()` is a barrier: every
//! payload submitted before it has already been pushed into (or dropped from)
//! the connections' buffers.

use axum::http::HeaderMap;
use bytes::Bytes;
use common::types::{ConnectionId, RoomId, UserId};
use hub_service::actors::{ConnectionRegistration, HubHandle, HubSettings};
use hub_service::identity::IdentityResolver;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio_util::sync::CancellationToken;

use crate::mock_membership::MockMembershipStore;

/// How long `recv` waits before failing the test.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

#[must_use]
pub fn user(id: &str) -> UserId {
    UserId::parse(id).expect("user id must not be blank")
}

#[must_use]
pub fn room(id: &str) -> RoomId {
    RoomId::parse(id).expect("room id must not be blank")
}

/// Spawn a hub with default settings over a mock membership store.
#[must_use]
pub fn spawn_hub(store: &MockMembershipStore) -> HubHandle {
    spawn_hub_with(store, HubSettings::default())
}

#[must_use]
pub fn spawn_hub_with(store: &MockMembershipStore, settings: HubSettings) -> HubHandle {
    let (hub, _task) = HubHandle::spawn(settings, store.shared(), CancellationToken::new());
    hub
}

/// Wait until the hub has processed every command submitted so far.
pub async fn flush(hub: &HubHandle) {
    hub.status().await.expect("hub should be running");
}

/// A connection registered straight into the hub.
#[derive(Debug)]
pub struct TestConnection {
    pub connection_id: ConnectionId,
    pub user_id: Option<UserId>,
    outbound: mpsc::Receiver<Bytes>,
}

impl TestConnection {
    /// Register a connection owned by `user_id` (anonymous if `None`) with
    /// an outbound buffer of `capacity`.
    pub async fn register(hub: &HubHandle, user_id: Option<&str>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        let connection_id = ConnectionId::new();
        let user_id = user_id.map(user);

        hub.register(ConnectionRegistration {
            connection_id,
            user_id: user_id.clone(),
            outbound: tx,
        })
        .await
        .expect("hub should accept registration");

        Self {
            connection_id,
            user_id,
            outbound: rx,
        }
    }

    /// Next payload, failing the test if none arrives in time.
    pub async fn recv(&mut self) -> Bytes {
        tokio::time::timeout(RECV_TIMEOUT, self.outbound.recv())
            .await
            .expect("timed out waiting for payload")
            .expect("outbound buffer closed")
    }

    /// Next payload parsed as JSON.
    pub async fn recv_json(&mut self) -> Value {
        let payload = self.recv().await;
        serde_json::from_slice(&payload).expect("payload should be JSON")
    }

    /// Everything currently queued, without waiting.
    pub fn drain(&mut self) -> Vec<Bytes> {
        let mut payloads = Vec::new();
        while let Ok(payload) = self.outbound.try_recv() {
            payloads.push(payload);
        }
        payloads
    }

    /// Assert nothing is queued. Call after [`flush`].
    pub fn assert_empty(&mut self) {
        match self.outbound.try_recv() {
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => {}
            Ok(payload) => panic!(
                "expected no payload, got {:?}",
                String::from_utf8_lossy(&payload)
            ),
        }
    }

    /// Whether the hub has dropped this connection's buffer and it is drained.
    pub fn is_closed(&mut self) -> bool {
        matches!(self.outbound.try_recv(), Err(TryRecvError::Disconnected))
    }
}

/// Identity resolver that returns a fixed owner for every request.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityResolver(pub Option<UserId>);

impl StaticIdentityResolver {
    #[must_use]
    pub fn user(id: &str) -> Self {
        Self(Some(user(id)))
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl IdentityResolver for StaticIdentityResolver {
    fn resolve(&self, _headers: &HeaderMap) -> Option<UserId> {
        self.0.clone()
    }
}
