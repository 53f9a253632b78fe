//! In-memory room membership for hub tests.
//!
//! Rooms can be edited while the hub is running, which is how tests model a
//! player leaving a table. Lookups are counted so tests can assert the hub
//! asks for a fresh snapshot on every room-scoped send.

use async_trait::async_trait;
use common::types::{RoomId, UserId};
use hub_service::errors::HubError;
use hub_service::membership::MembershipStore;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock membership store.
#[derive(Debug, Clone, Default)]
pub struct MockMembershipStore {
    inner: Arc<Mutex<MockMembershipInner>>,
}

#[derive(Debug, Default)]
struct MockMembershipInner {
    rooms: HashMap<RoomId, HashSet<UserId>>,
    failing: HashSet<RoomId>,
    delay: Option<Duration>,
    lookups: usize,
}

fn room_id(room: &str) -> RoomId {
    RoomId::parse(room).expect("room id must not be blank")
}

fn user_ids(members: &[&str]) -> HashSet<UserId> {
    members
        .iter()
        .map(|m| UserId::parse(m).expect("user id must not be blank"))
        .collect()
}

impl MockMembershipStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a room with the given members.
    #[must_use]
    pub fn with_room(self, room: &str, members: &[&str]) -> Self {
        self.set_members(room, members);
        self
    }

    /// Builder: delay every lookup (for timeout tests).
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        self.inner.lock().unwrap().delay = Some(delay);
        self
    }

    /// Replace a room's membership.
    pub fn set_members(&self, room: &str, members: &[&str]) {
        self.inner
            .lock()
            .unwrap()
            .rooms
            .insert(room_id(room), user_ids(members));
    }

    /// Remove one member from a room.
    pub fn remove_member(&self, room: &str, user: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(members) = inner.rooms.get_mut(&room_id(room)) {
            members.retain(|m| m.as_str() != user);
        }
    }

    /// Make lookups for `room` fail until `heal_room` is called.
    pub fn fail_room(&self, room: &str) {
        self.inner.lock().unwrap().failing.insert(room_id(room));
    }

    pub fn heal_room(&self, room: &str) {
        self.inner.lock().unwrap().failing.remove(&room_id(room));
    }

    /// Number of lookups served so far.
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.inner.lock().unwrap().lookups
    }

    /// Shareable trait object for `HubHandle::spawn`.
    #[must_use]
    pub fn shared(&self) -> Arc<dyn MembershipStore> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl MembershipStore for MockMembershipStore {
    async fn room_members(&self, room_id: &RoomId) -> Result<HashSet<UserId>, HubError> {
        let delay = {
            let mut inner = self.inner.lock().unwrap();
            inner.lookups += 1;
            inner.delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let inner = self.inner.lock().unwrap();
        if inner.failing.contains(room_id) {
            return Err(HubError::Membership(format!(
                "mock lookup failure for room {room_id}"
            )));
        }
        Ok(inner.rooms.get(room_id).cloned().unwrap_or_default())
    }
}
