//! Per-connection loops.
//!
//! Every accepted WebSocket is split into two halves, each driven by its own
//! task:
//! - the outbound loop drains the connection's bounded buffer onto the sink
//!   and sends keepalive pings
//! - the inbound loop watches the stream for close, errors and idleness
//!
//! Both loops end by unregistering the connection and cancelling the
//! connection's token, which stops the other half. Unregister is idempotent,
//! so whichever side notices the failure first wins and the other is a no-op.
//! Once both halves are dropped the transport is closed.
//!
//! Every write, including the closing handshake, is bounded by the write
//! timeout. A peer that stops reading is evicted by the hub when its buffer
//! fills, and its writer gives up on the stalled write instead of hanging.
//!
//! Client data frames are ignored; producers publish through the hub, not
//! through the socket.
//!
//! The loops are generic over `Sink`/`Stream` so they can be driven by an
//! axum `WebSocket` in production and by in-memory channels in tests.

use crate::errors::HubError;

use super::hub::HubHandle;
use super::messages::ConnectionRegistration;

use axum::extract::ws::Message;
use bytes::Bytes;
use common::types::{ConnectionId, UserId};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::{self, Display};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Default capacity of a connection's outbound buffer.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;

/// Default deadline for a single transport write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Transport settings applied to every connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub outbound_buffer: usize,
    /// Period between server pings; `None` disables pings.
    pub ping_interval: Option<Duration>,
    /// Longest silence tolerated from the peer; `None` waits forever.
    pub idle_timeout: Option<Duration>,
    /// Longest a single frame write may take; exceeding it is a write failure.
    pub write_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            ping_interval: Some(Duration::from_secs(54)),
            idle_timeout: Some(Duration::from_secs(60)),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Tasks driving one attached connection.
#[derive(Debug)]
pub struct ConnectionTasks {
    pub connection_id: ConnectionId,
    pub outbound: JoinHandle<()>,
    pub inbound: JoinHandle<()>,
}

/// Register a transport with the hub and start both loops.
///
/// # Errors
///
/// Returns `HubError::HubUnavailable` if the hub has stopped. The transport
/// is dropped in that case.
pub async fn attach<S, R, E>(
    hub: &HubHandle,
    user_id: Option<UserId>,
    sink: S,
    stream: R,
    settings: ConnectionSettings,
) -> Result<ConnectionTasks, HubError>
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display + Send + 'static,
    R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Display + Send + 'static,
{
    let connection_id = ConnectionId::new();
    let (outbound_tx, outbound_rx) = mpsc::channel(settings.outbound_buffer.max(1));

    hub.register(ConnectionRegistration {
        connection_id,
        user_id,
        outbound: outbound_tx,
    })
    .await?;

    let closed = CancellationToken::new();

    let outbound = tokio::spawn(run_outbound(
        connection_id,
        outbound_rx,
        sink,
        hub.clone(),
        settings,
        closed.clone(),
    ));
    let inbound = tokio::spawn(run_inbound(
        connection_id,
        stream,
        hub.clone(),
        settings.idle_timeout,
        closed,
    ));

    Ok(ConnectionTasks {
        connection_id,
        outbound,
        inbound,
    })
}

/// Why a frame could not be written.
enum WriteFailure<E> {
    Transport(E),
    TimedOut(Duration),
}

impl<E: Display> Display for WriteFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteFailure::Transport(e) => write!(f, "{e}"),
            WriteFailure::TimedOut(limit) => write!(f, "write timed out after {limit:?}"),
        }
    }
}

async fn write_frame<S>(
    sink: &mut S,
    frame: Message,
    limit: Duration,
) -> Result<(), WriteFailure<S::Error>>
where
    S: Sink<Message> + Unpin,
{
    match tokio::time::timeout(limit, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(WriteFailure::Transport(e)),
        Err(_) => Err(WriteFailure::TimedOut(limit)),
    }
}

/// Drain the outbound buffer onto the transport.
///
/// Exits when the buffer closes, when the inbound half finishes (both after
/// sending a close frame) or when a write fails or times out (after
/// unregistering).
#[instrument(skip_all, name = "hub.connection.outbound", fields(connection_id = %connection_id))]
pub async fn run_outbound<S>(
    connection_id: ConnectionId,
    mut outbound: mpsc::Receiver<Bytes>,
    mut sink: S,
    hub: HubHandle,
    settings: ConnectionSettings,
    closed: CancellationToken,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let write_timeout = settings.write_timeout;
    let mut ping = settings.ping_interval.map(|period| {
        let mut timer = tokio::time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer
    });

    let write_failed = loop {
        let frame = tokio::select! {
            () = closed.cancelled() => {
                debug!(
                    target: "hub.connection",
                    connection_id = %connection_id,
                    "Inbound half finished, closing transport"
                );
                break false;
            }
            payload = outbound.recv() => match payload {
                Some(payload) => frame_for(payload),
                None => {
                    debug!(
                        target: "hub.connection",
                        connection_id = %connection_id,
                        "Outbound buffer closed, closing transport"
                    );
                    break false;
                }
            },
            () = next_ping(&mut ping) => Message::Ping(Vec::new()),
        };

        if let Err(e) = write_frame(&mut sink, frame, write_timeout).await {
            info!(
                target: "hub.connection",
                connection_id = %connection_id,
                error = %e,
                "Transport write failed"
            );
            break true;
        }
    };

    // A failed transport gets no close frame, only a bounded shutdown
    if !write_failed {
        let _ = write_frame(&mut sink, Message::Close(None), write_timeout).await;
    }
    let _ = tokio::time::timeout(write_timeout, sink.close()).await;

    let _ = hub.unregister(connection_id).await;
    closed.cancel();
}

/// Read the transport until it closes, fails or goes idle, then unregister.
///
/// Also stops when the outbound half cancels `closed`.
#[instrument(skip_all, name = "hub.connection.inbound", fields(connection_id = %connection_id))]
pub async fn run_inbound<R, E>(
    connection_id: ConnectionId,
    mut stream: R,
    hub: HubHandle,
    idle_timeout: Option<Duration>,
    closed: CancellationToken,
) where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let read = async {
            match idle_timeout {
                Some(limit) => tokio::time::timeout(limit, stream.next()).await.ok(),
                None => Some(stream.next().await),
            }
        };

        let next = tokio::select! {
            () = closed.cancelled() => {
                debug!(
                    target: "hub.connection",
                    connection_id = %connection_id,
                    "Outbound half finished, stopping reader"
                );
                break;
            }
            read = read => match read {
                Some(next) => next,
                None => {
                    info!(
                        target: "hub.connection",
                        connection_id = %connection_id,
                        idle_timeout = ?idle_timeout,
                        "Peer idle past read deadline"
                    );
                    break;
                }
            },
        };

        match next {
            Some(Ok(Message::Close(frame))) => {
                debug!(
                    target: "hub.connection",
                    connection_id = %connection_id,
                    reason = ?frame,
                    "Peer closed connection"
                );
                break;
            }
            Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                debug!(
                    target: "hub.connection",
                    connection_id = %connection_id,
                    "Ignoring client data frame"
                );
            }
            // Pongs and pings only refresh the read deadline
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Err(e)) => {
                info!(
                    target: "hub.connection",
                    connection_id = %connection_id,
                    error = %e,
                    "Transport read failed"
                );
                break;
            }
            None => {
                debug!(
                    target: "hub.connection",
                    connection_id = %connection_id,
                    "Transport stream ended"
                );
                break;
            }
        }
    }

    if let Err(e) = hub.unregister(connection_id).await {
        // Expected during shutdown: the hub is gone and already dropped us
        debug!(
            target: "hub.connection",
            connection_id = %connection_id,
            error = %e,
            "Could not unregister connection"
        );
    }
    closed.cancel();
}

/// Text frame for UTF-8 payloads, binary otherwise.
fn frame_for(payload: Bytes) -> Message {
    match String::from_utf8(payload.to_vec()) {
        Ok(text) => Message::Text(text),
        Err(e) => Message::Binary(e.into_bytes()),
    }
}

async fn next_ping(ping: &mut Option<Interval>) {
    match ping {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
