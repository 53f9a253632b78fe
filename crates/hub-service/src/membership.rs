//! Room membership lookups.
//!
//! The hub asks the store for a fresh snapshot on every room-scoped send and
//! never caches the answer, so a player removed from a game stops receiving
//! that game's traffic on the next message.

use crate::errors::HubError;
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use common::types::{RoomId, UserId};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, instrument};

/// Source of room membership.
///
/// The returned set must include the room owner (the game master).
#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn room_members(&self, room_id: &RoomId) -> Result<HashSet<UserId>, HubError>;
}

/// Membership backed by the game tables in Postgres.
#[derive(Clone)]
pub struct PgMembershipStore {
    pool: PgPool,
}

impl PgMembershipStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool and verify the database is reachable.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Database` if the pool cannot connect.
    pub async fn connect(url: &SecretString, max_connections: u32) -> Result<Self, HubError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url.expose_secret())
            .await?;
        Ok(Self::new(pool))
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MembershipStore for PgMembershipStore {
    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn room_members(&self, room_id: &RoomId) -> Result<HashSet<UserId>, HubError> {
        // Game master plus every joined player; ids compared as text so the
        // hub stays agnostic of the key column types.
        let rows: Vec<Option<String>> = sqlx::query_scalar(
            r#"
            SELECT gm_id::text FROM games WHERE id::text = $1
            UNION
            SELECT user_id::text FROM game_players WHERE game_id::text = $1
            "#,
        )
        .bind(room_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let members: HashSet<UserId> = rows
            .into_iter()
            .flatten()
            .filter_map(|id| UserId::parse(&id))
            .collect();

        debug!(
            target: "hub.membership",
            room_id = %room_id,
            member_count = members.len(),
            "Loaded room membership"
        );

        Ok(members)
    }
}
