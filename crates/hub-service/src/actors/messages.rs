//! Messages accepted by the hub command loop.

use bytes::Bytes;
use common::types::{ConnectionId, RoomId, UserId};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

/// A connection being added to the live set.
#[derive(Debug)]
pub struct ConnectionRegistration {
    pub connection_id: ConnectionId,
    /// `None` for connections without a resolved identity.
    pub user_id: Option<UserId>,
    /// Producer side of the connection's outbound buffer.
    pub outbound: mpsc::Sender<Bytes>,
}

/// Commands processed by the hub, in arrival order.
#[derive(Debug)]
pub enum HubMessage {
    Register {
        connection: ConnectionRegistration,
    },

    /// Remove a connection and close its outbound buffer. No-op if absent.
    Unregister { connection_id: ConnectionId },

    /// Route a payload using its own routing fields.
    Route { payload: Bytes },

    SendToUser { user_id: UserId, payload: Bytes },

    SendToRoom { room_id: RoomId, payload: Bytes },

    SendToAll { payload: Bytes },

    GetStatus {
        respond_to: oneshot::Sender<HubStatus>,
    },

    ListConnections {
        respond_to: oneshot::Sender<Vec<ConnectionInfo>>,
    },
}

/// Snapshot of one live connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub connection_id: ConnectionId,
    pub user_id: Option<UserId>,
    /// Payloads waiting in the outbound buffer.
    pub queued: usize,
}

/// Hub status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HubStatus {
    pub connection_count: usize,
    /// Distinct identified users with at least one connection.
    pub user_count: usize,
    pub messages_routed: u64,
    /// Slow consumers dropped on a full buffer.
    pub evictions: u64,
    /// Entries dropped because their writer had already exited.
    pub stale_removals: u64,
}
