//! Lock-free counters shared between the hub task and its handles.
//!
//! The hub loop is the only writer. Handles read these without a round
//! trip through the command channel; `HubStatus` carries the same values
//! for callers that want a consistent snapshot.

use crate::observability::metrics as prom;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct HubStats {
    connections: AtomicUsize,
    messages_routed: AtomicU64,
    messages_dropped: AtomicU64,
    deliveries: AtomicU64,
    evictions: AtomicU64,
    stale_removals: AtomicU64,
}

impl HubStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current size of the connection table.
    pub fn set_connections(&self, count: usize) {
        self.connections.store(count, Ordering::Relaxed);
        prom::set_connections_active(count);
    }

    pub fn record_routed(&self, deliveries: usize) {
        self.messages_routed.fetch_add(1, Ordering::Relaxed);
        self.deliveries
            .fetch_add(deliveries as u64, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, reason: &'static str) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
        prom::record_message_dropped(reason);
    }

    /// A slow consumer was dropped because its buffer was full.
    pub fn record_eviction(&self, reason: &'static str) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        prom::record_connection_evicted(reason);
    }

    /// An entry was removed because its writer had already gone.
    pub fn record_stale_removal(&self) {
        self.stale_removals.fetch_add(1, Ordering::Relaxed);
        prom::record_stale_connection_removed();
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_routed(&self) -> u64 {
        self.messages_routed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn deliveries(&self) -> u64 {
        self.deliveries.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn stale_removals(&self) -> u64 {
        self.stale_removals.load(Ordering::Relaxed)
    }
}
