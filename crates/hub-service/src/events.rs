//! Typed payloads published to game tables.
//!
//! The hub routes opaque JSON, but in-process producers build their payloads
//! from these types so that the routing fields (`type`, `game_id`,
//! `sender_id`, `target_id`) are always spelled the way the router reads
//! them.

use crate::errors::HubError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use common::types::{RoomId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A payload that can be handed to the hub.
pub trait OutboundMessage: Serialize {
    /// Serialize to the JSON bytes delivered to clients.
    ///
    /// # Errors
    ///
    /// Returns `HubError::InvalidPayload` if serialization fails.
    fn to_payload(&self) -> Result<Bytes, HubError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| HubError::InvalidPayload(e.to_string()))
    }
}

/// Kind of a chat line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatKind {
    /// Visible to the whole table.
    #[serde(rename = "CHAT_GLOBAL")]
    Global,
    /// Visible to the target and the sender.
    #[serde(rename = "CHAT_PRIVATE")]
    Private,
    /// System event (dice rolls, joins) visible to the whole table.
    #[serde(rename = "EVENT")]
    Event,
}

/// A chat line at a game table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub game_id: RoomId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: ChatKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    fn new(
        kind: ChatKind,
        game_id: RoomId,
        sender_id: UserId,
        sender_name: impl Into<String>,
        content: impl Into<String>,
        target_id: Option<UserId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            game_id,
            sender_id,
            sender_name: sender_name.into(),
            content: content.into(),
            kind,
            target_id,
            created_at: Utc::now(),
        }
    }

    /// Message for everyone at the table.
    #[must_use]
    pub fn global(
        game_id: RoomId,
        sender_id: UserId,
        sender_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(ChatKind::Global, game_id, sender_id, sender_name, content, None)
    }

    /// Whisper from `sender_id` to `target_id`.
    #[must_use]
    pub fn private(
        game_id: RoomId,
        sender_id: UserId,
        sender_name: impl Into<String>,
        target_id: UserId,
        content: impl Into<String>,
    ) -> Self {
        Self::new(
            ChatKind::Private,
            game_id,
            sender_id,
            sender_name,
            content,
            Some(target_id),
        )
    }

    /// Table event such as a player joining.
    #[must_use]
    pub fn event(
        game_id: RoomId,
        sender_id: UserId,
        sender_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(ChatKind::Event, game_id, sender_id, sender_name, content, None)
    }

    /// Result of a die roll.
    ///
    /// A secret roll is a private message addressed to the roller, so only
    /// the roller's own connections receive it.
    #[must_use]
    pub fn dice_roll(
        game_id: RoomId,
        sender_id: UserId,
        sender_name: impl Into<String>,
        sides: u32,
        result: u32,
        secret: bool,
    ) -> Self {
        let content = format!("🎲 d{sides} : {result}");
        if secret {
            let target = sender_id.clone();
            Self::private(game_id, sender_id, sender_name, target, content)
        } else {
            Self::event(game_id, sender_id, sender_name, content)
        }
    }

    /// Keep the identifier assigned by the chat history store.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

impl OutboundMessage for ChatMessage {}

/// Sheet change pushed to the owner of a character.
///
/// Carries no routing fields; deliver with `HubHandle::send_to_user`.
#[derive(Debug, Clone, Serialize)]
pub struct CharacterUpdate<T> {
    #[serde(rename = "type")]
    kind: &'static str,
    pub payload: T,
}

impl<T: Serialize> CharacterUpdate<T> {
    #[must_use]
    pub fn new(payload: T) -> Self {
        Self {
            kind: "CHARACTER_UPDATE",
            payload,
        }
    }
}

impl<T: Serialize> OutboundMessage for CharacterUpdate<T> {}

/// Whether a table is in play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableState {
    Ongoing,
    Paused,
}

/// Table state change, scoped to the table's members by its `game_id`.
#[derive(Debug, Clone, Serialize)]
pub struct GameStateUpdate {
    #[serde(rename = "type")]
    kind: &'static str,
    pub game_id: RoomId,
    pub state: TableState,
}

impl GameStateUpdate {
    #[must_use]
    pub fn new(game_id: RoomId, state: TableState) -> Self {
        Self {
            kind: "GAME_STATE_UPDATE",
            game_id,
            state,
        }
    }
}

impl OutboundMessage for GameStateUpdate {}
