//! `HubActor` - connection registry and message router.
//!
//! One hub task per process owns the connection table. Every mutation and
//! every routing decision happens inside its message loop, in arrival order,
//! so the table needs no locking.
//!
//! # Delivery
//!
//! Payloads are pushed into each recipient's bounded outbound buffer with
//! `try_send`. The loop never waits on a consumer:
//! - buffer full: the connection is evicted (slow consumer)
//! - buffer closed: the connection's writer is gone, the entry is removed
//!
//! Removing an entry drops the only sender of that outbound buffer, which
//! makes the connection's writer close the transport.
//!
//! # Shutdown
//!
//! Cancelling the token stops the loop. The table is then cleared, closing
//! every outbound buffer; handles report `HubError::HubUnavailable` from then on.

use crate::errors::HubError;
use crate::membership::MembershipStore;
use crate::observability::metrics as prom;
use crate::routing::{Audience, Envelope};

use super::messages::{ConnectionInfo, ConnectionRegistration, HubMessage, HubStatus};
use super::metrics::HubStats;

use bytes::Bytes;
use common::types::{ConnectionId, RoomId, UserId};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default capacity of the hub command channel.
pub const DEFAULT_COMMAND_BUFFER: usize = 1024;

/// Default time allowed for a room membership lookup.
pub const DEFAULT_MEMBERSHIP_TIMEOUT: Duration = Duration::from_secs(2);

const EVICT_SLOW_CONSUMER: &str = "slow_consumer";

/// Tunables for the hub task.
#[derive(Debug, Clone, Copy)]
pub struct HubSettings {
    pub command_buffer: usize,
    /// Lookups exceeding this are treated as failed.
    pub membership_timeout: Duration,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            command_buffer: DEFAULT_COMMAND_BUFFER,
            membership_timeout: DEFAULT_MEMBERSHIP_TIMEOUT,
        }
    }
}

/// Handle to the hub task.
///
/// Cheap to clone; every producer and connection holds one.
#[derive(Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubMessage>,
    cancel_token: CancellationToken,
    stats: Arc<HubStats>,
}

impl HubHandle {
    /// Spawn the hub task and return a handle to it.
    ///
    /// The task stops when `cancel_token` is cancelled or every handle has
    /// been dropped.
    #[must_use]
    pub fn spawn(
        settings: HubSettings,
        membership: Arc<dyn MembershipStore>,
        cancel_token: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(settings.command_buffer.max(1));
        let stats = Arc::new(HubStats::new());

        let actor = HubActor {
            receiver,
            cancel_token: cancel_token.clone(),
            membership,
            membership_timeout: settings.membership_timeout,
            connections: HashMap::new(),
            stats: Arc::clone(&stats),
        };

        let task = tokio::spawn(actor.run());

        (
            Self {
                sender,
                cancel_token,
                stats,
            },
            task,
        )
    }

    /// Add a connection to the live set.
    ///
    /// The connection is a routing target for every command submitted after
    /// this one.
    pub async fn register(&self, connection: ConnectionRegistration) -> Result<(), HubError> {
        self.send(HubMessage::Register { connection }).await
    }

    /// Remove a connection and close its outbound buffer. Idempotent.
    pub async fn unregister(&self, connection_id: ConnectionId) -> Result<(), HubError> {
        self.send(HubMessage::Unregister { connection_id }).await
    }

    /// Submit a payload routed by its own `type`/`target_id`/`game_id` fields.
    pub async fn route(&self, payload: impl Into<Bytes>) -> Result<(), HubError> {
        self.send(HubMessage::Route {
            payload: payload.into(),
        })
        .await
    }

    /// Serialize `message` to JSON and route it.
    pub async fn route_json<T: Serialize>(&self, message: &T) -> Result<(), HubError> {
        let payload =
            serde_json::to_vec(message).map_err(|e| HubError::InvalidPayload(e.to_string()))?;
        self.route(payload).await
    }

    /// Deliver to every live connection owned by `user_id`.
    pub async fn send_to_user(
        &self,
        user_id: UserId,
        payload: impl Into<Bytes>,
    ) -> Result<(), HubError> {
        self.send(HubMessage::SendToUser {
            user_id,
            payload: payload.into(),
        })
        .await
    }

    /// Deliver to every connection whose owner is a member of `room_id`.
    pub async fn send_to_room(
        &self,
        room_id: RoomId,
        payload: impl Into<Bytes>,
    ) -> Result<(), HubError> {
        self.send(HubMessage::SendToRoom {
            room_id,
            payload: payload.into(),
        })
        .await
    }

    /// Deliver to every live connection.
    pub async fn send_to_all(&self, payload: impl Into<Bytes>) -> Result<(), HubError> {
        self.send(HubMessage::SendToAll {
            payload: payload.into(),
        })
        .await
    }

    pub async fn status(&self) -> Result<HubStatus, HubError> {
        let (tx, rx) = oneshot::channel();
        self.send(HubMessage::GetStatus { respond_to: tx }).await?;
        rx.await.map_err(|_| HubError::HubUnavailable)
    }

    /// Snapshot of the live connection table.
    pub async fn live_connections(&self) -> Result<Vec<ConnectionInfo>, HubError> {
        let (tx, rx) = oneshot::channel();
        self.send(HubMessage::ListConnections { respond_to: tx })
            .await?;
        rx.await.map_err(|_| HubError::HubUnavailable)
    }

    /// Counters maintained by the hub task.
    #[must_use]
    pub fn stats(&self) -> &HubStats {
        &self.stats
    }

    /// Whether the hub task is still accepting commands.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed() && !self.cancel_token.is_cancelled()
    }

    /// Stop the hub task.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    async fn send(&self, message: HubMessage) -> Result<(), HubError> {
        self.sender
            .send(message)
            .await
            .map_err(|_| HubError::HubUnavailable)
    }
}

struct ConnectionEntry {
    user_id: Option<UserId>,
    outbound: mpsc::Sender<Bytes>,
}

struct HubActor {
    receiver: mpsc::Receiver<HubMessage>,
    cancel_token: CancellationToken,
    membership: Arc<dyn MembershipStore>,
    membership_timeout: Duration,
    connections: HashMap<ConnectionId, ConnectionEntry>,
    stats: Arc<HubStats>,
}

impl HubActor {
    #[instrument(skip_all, name = "hub.actor")]
    async fn run(mut self) {
        info!(target: "hub.actor", "Hub started");

        loop {
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => {
                    info!(target: "hub.actor", "Hub received cancellation signal");
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message).await,
                        None => {
                            info!(target: "hub.actor", "All hub handles dropped, exiting");
                            break;
                        }
                    }
                }
            }
        }

        let remaining = self.connections.len();
        self.connections.clear();
        self.stats.set_connections(0);

        info!(
            target: "hub.actor",
            connections_closed = remaining,
            messages_routed = self.stats.messages_routed(),
            "Hub stopped"
        );
    }

    async fn handle_message(&mut self, message: HubMessage) {
        match message {
            HubMessage::Register { connection } => self.register(connection),

            HubMessage::Unregister { connection_id } => self.unregister(connection_id),

            HubMessage::Route { payload } => self.route(payload).await,

            HubMessage::SendToUser { user_id, payload } => {
                let started = Instant::now();
                let delivered = self.deliver(Audience::User(&user_id), &payload);
                self.record_routed("user", delivered, started);
            }

            HubMessage::SendToRoom { room_id, payload } => {
                let started = Instant::now();
                if let Some(delivered) = self.deliver_to_room(&room_id, &payload).await {
                    self.record_routed("room", delivered, started);
                }
            }

            HubMessage::SendToAll { payload } => {
                let started = Instant::now();
                let delivered = self.deliver(Audience::Everyone, &payload);
                self.record_routed("global", delivered, started);
            }

            HubMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.status());
            }

            HubMessage::ListConnections { respond_to } => {
                let _ = respond_to.send(self.list_connections());
            }
        }
    }

    fn register(&mut self, connection: ConnectionRegistration) {
        let ConnectionRegistration {
            connection_id,
            user_id,
            outbound,
        } = connection;

        debug!(
            target: "hub.actor",
            connection_id = %connection_id,
            user_id = ?user_id.as_ref().map(UserId::as_str),
            "Connection registered"
        );

        self.connections
            .insert(connection_id, ConnectionEntry { user_id, outbound });
        self.stats.set_connections(self.connections.len());
    }

    fn unregister(&mut self, connection_id: ConnectionId) {
        if self.connections.remove(&connection_id).is_some() {
            debug!(
                target: "hub.actor",
                connection_id = %connection_id,
                remaining = self.connections.len(),
                "Connection unregistered"
            );
            self.stats.set_connections(self.connections.len());
        }
    }

    async fn route(&mut self, payload: Bytes) {
        let started = Instant::now();

        let envelope = match Envelope::decode(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    target: "hub.routing",
                    error = %e,
                    payload_bytes = payload.len(),
                    "Dropping undecodable payload"
                );
                self.stats.record_dropped("malformed");
                return;
            }
        };

        let delivered = match &envelope {
            Envelope::Private { target, .. } => {
                let mut delivered = self.deliver(Audience::User(target), &payload);
                if let Some(sender) = envelope.echo_recipient() {
                    delivered += self.deliver(Audience::User(sender), &payload);
                }
                delivered
            }
            Envelope::Room { room_id } => match self.deliver_to_room(room_id, &payload).await {
                Some(delivered) => delivered,
                None => return,
            },
            Envelope::Global => self.deliver(Audience::Everyone, &payload),
        };

        self.record_routed(envelope.scope(), delivered, started);
    }

    /// Deliver to the members of a room.
    ///
    /// Returns `None` when membership could not be determined; the payload
    /// is dropped in that case.
    async fn deliver_to_room(&mut self, room_id: &RoomId, payload: &Bytes) -> Option<usize> {
        let started = Instant::now();
        let lookup =
            tokio::time::timeout(self.membership_timeout, self.membership.room_members(room_id))
                .await;

        let members: HashSet<UserId> = match lookup {
            Ok(Ok(members)) => {
                prom::record_membership_lookup("success", started.elapsed());
                members
            }
            Ok(Err(e)) => {
                prom::record_membership_lookup("error", started.elapsed());
                warn!(
                    target: "hub.routing",
                    room_id = %room_id,
                    error = %e,
                    "Membership lookup failed, dropping room message"
                );
                self.stats.record_dropped("membership_error");
                return None;
            }
            Err(_) => {
                prom::record_membership_lookup("timeout", started.elapsed());
                warn!(
                    target: "hub.routing",
                    room_id = %room_id,
                    timeout_ms = self.membership_timeout.as_millis(),
                    "Membership lookup timed out, dropping room message"
                );
                self.stats.record_dropped("membership_timeout");
                return None;
            }
        };

        Some(self.deliver(Audience::Members(&members), payload))
    }

    /// Push `payload` to every connection in `audience` without waiting.
    ///
    /// Returns the number of buffers the payload was enqueued to.
    fn deliver(&mut self, audience: Audience<'_>, payload: &Bytes) -> usize {
        let mut delivered = 0;
        let mut evicted: Vec<ConnectionId> = Vec::new();
        let mut stale: Vec<ConnectionId> = Vec::new();

        for (connection_id, entry) in &self.connections {
            if !audience.admits(entry.user_id.as_ref()) {
                continue;
            }
            match entry.outbound.try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => evicted.push(*connection_id),
                Err(TrySendError::Closed(_)) => stale.push(*connection_id),
            }
        }

        for connection_id in evicted {
            self.evict(connection_id);
        }
        for connection_id in stale {
            self.remove_stale(connection_id);
        }

        delivered
    }

    /// Drop a slow consumer. Closing its buffer makes its writer close the
    /// transport.
    fn evict(&mut self, connection_id: ConnectionId) {
        if let Some(entry) = self.connections.remove(&connection_id) {
            warn!(
                target: "hub.actor",
                connection_id = %connection_id,
                user_id = ?entry.user_id.as_ref().map(UserId::as_str),
                reason = EVICT_SLOW_CONSUMER,
                "Evicting connection"
            );
            self.stats.record_eviction(EVICT_SLOW_CONSUMER);
            self.stats.set_connections(self.connections.len());
        }
    }

    /// Drop an entry whose writer exited before its unregister arrived.
    fn remove_stale(&mut self, connection_id: ConnectionId) {
        if self.connections.remove(&connection_id).is_some() {
            debug!(
                target: "hub.actor",
                connection_id = %connection_id,
                "Removing connection with closed buffer"
            );
            self.stats.record_stale_removal();
            self.stats.set_connections(self.connections.len());
        }
    }

    fn record_routed(&self, scope: &'static str, delivered: usize, started: Instant) {
        self.stats.record_routed(delivered);
        prom::record_message_routed(scope, delivered, started.elapsed());

        debug!(
            target: "hub.routing",
            scope = scope,
            delivered = delivered,
            "Payload routed"
        );
    }

    fn status(&self) -> HubStatus {
        let users: HashSet<&UserId> = self
            .connections
            .values()
            .filter_map(|entry| entry.user_id.as_ref())
            .collect();

        HubStatus {
            connection_count: self.connections.len(),
            user_count: users.len(),
            messages_routed: self.stats.messages_routed(),
            evictions: self.stats.evictions(),
            stale_removals: self.stats.stale_removals(),
        }
    }

    fn list_connections(&self) -> Vec<ConnectionInfo> {
        self.connections
            .iter()
            .map(|(connection_id, entry)| ConnectionInfo {
                connection_id: *connection_id,
                user_id: entry.user_id.clone(),
                queued: entry
                    .outbound
                    .max_capacity()
                    .saturating_sub(entry.outbound.capacity()),
            })
            .collect()
    }
}
