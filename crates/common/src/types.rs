//! Identifier types shared by the hub and its collaborators.
//!
//! User and room identifiers are opaque strings issued by the authentication
//! provider and the relational store respectively; the hub never interprets
//! them beyond equality.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Handle of one live transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of an authenticated user (the token `sub`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Build a user ID, rejecting the empty string.
    ///
    /// An empty subject means "no identity" and is represented as `None`
    /// by callers rather than as an empty `UserId`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a room (a game table).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Build a room ID, rejecting the empty string.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn test_user_id_rejects_blank() {
        assert!(UserId::parse("").is_none());
        assert!(UserId::parse("   ").is_none());
        assert_eq!(UserId::parse(" u1 ").unwrap().as_str(), "u1");
    }

    #[test]
    fn test_room_id_rejects_blank() {
        assert!(RoomId::parse("").is_none());
        assert_eq!(RoomId::parse("r1").unwrap().to_string(), "r1");
    }

    #[test]
    fn test_user_id_serializes_transparently() {
        let id = UserId::parse("user-42").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"user-42\"");
    }
}
