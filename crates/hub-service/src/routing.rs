//! Routing policy: decides who receives a payload.
//!
//! Payloads are opaque JSON objects. Only four fields are ever inspected:
//! `type`, `target_id`, `sender_id` and `game_id`. Everything else passes
//! through untouched, byte for byte.
//!
//! Decision order:
//! 1. `type == "CHAT_PRIVATE"` with a non-empty `target_id`: the target, plus
//!    the sender if known and different (self-echo). `game_id` is ignored.
//! 2. Non-empty `game_id`: members of that room.
//! 3. Otherwise: every live connection.
//!
//! Empty strings and non-string values count as absent.

use common::types::{RoomId, UserId};
use serde_json::{Map, Value};
use std::collections::HashSet;
use thiserror::Error;

/// Message kind that requests point-to-point delivery.
pub const PRIVATE_KIND: &str = "CHAT_PRIVATE";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("payload is not a JSON object")]
    NotAnObject,
}

/// Routing fields decoded from a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Point-to-point delivery with an optional echo to the sender.
    Private {
        target: UserId,
        sender: Option<UserId>,
    },
    /// Delivery to the members of one room.
    Room { room_id: RoomId },
    /// Delivery to every live connection.
    Global,
}

impl Envelope {
    /// Decode the routing fields of a payload.
    ///
    /// # Errors
    ///
    /// Returns `EnvelopeError` if the payload is not a JSON object.
    pub fn decode(payload: &[u8]) -> Result<Self, EnvelopeError> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| EnvelopeError::InvalidJson(e.to_string()))?;
        let Value::Object(fields) = value else {
            return Err(EnvelopeError::NotAnObject);
        };
        Ok(Self::from_fields(&fields))
    }

    fn from_fields(fields: &Map<String, Value>) -> Self {
        let kind = fields.get("type").and_then(Value::as_str);

        if kind == Some(PRIVATE_KIND) {
            if let Some(target) = string_field(fields, "target_id").and_then(UserId::parse) {
                let sender = string_field(fields, "sender_id").and_then(UserId::parse);
                return Envelope::Private { target, sender };
            }
        }

        match string_field(fields, "game_id").and_then(RoomId::parse) {
            Some(room_id) => Envelope::Room { room_id },
            None => Envelope::Global,
        }
    }

    /// Metric label for this routing scope.
    #[must_use]
    pub fn scope(&self) -> &'static str {
        match self {
            Envelope::Private { .. } => "private",
            Envelope::Room { .. } => "room",
            Envelope::Global => "global",
        }
    }

    /// User that should receive the self-echo of a private message, if any.
    #[must_use]
    pub fn echo_recipient(&self) -> Option<&UserId> {
        match self {
            Envelope::Private {
                target,
                sender: Some(sender),
            } if sender != target => Some(sender),
            _ => None,
        }
    }
}

fn string_field<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields.get(key).and_then(Value::as_str)
}

/// Set of connections a single delivery pass targets.
#[derive(Debug, Clone, Copy)]
pub enum Audience<'a> {
    /// Connections owned by one user.
    User(&'a UserId),
    /// Connections owned by any of these users.
    Members(&'a HashSet<UserId>),
    /// Every live connection, including anonymous ones.
    Everyone,
}

impl Audience<'_> {
    /// Whether a connection with this owner belongs to the audience.
    ///
    /// Anonymous connections only ever match `Everyone`.
    #[must_use]
    pub fn admits(&self, owner: Option<&UserId>) -> bool {
        match (self, owner) {
            (Audience::Everyone, _) => true,
            (Audience::User(user), Some(owner)) => *user == owner,
            (Audience::Members(members), Some(owner)) => members.contains(owner),
            (Audience::User(_) | Audience::Members(_), None) => false,
        }
    }
}
