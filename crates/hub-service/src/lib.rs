//! QuestHub realtime hub.
//!
//! Holds the live WebSocket connections of game table participants and
//! routes table events and chat to the right subset of them.
//!
//! # Architecture
//!
//! ```text
//! GET /ws ──► acceptor ──register──► HubActor (one task, owns the table)
//!                │                       │ try_send per recipient
//!                ├─ outbound loop ◄──────┘ bounded buffer per connection
//!                └─ inbound loop ──unregister on close/error/idle──► HubActor
//!
//! producers ──route / send_to_user / send_to_room / send_to_all──► HubActor
//! ```
//!
//! Routing reads at most four payload fields (`type`, `target_id`,
//! `sender_id`, `game_id`); everything else is delivered untouched. Room
//! membership is looked up through a [`membership::MembershipStore`] on
//! every room-scoped send.
//!
//! # Modules
//!
//! - [`actors`] - hub command loop and per-connection loops
//! - [`routing`] - routing policy
//! - [`membership`] - room membership lookups
//! - [`identity`] - connection owner resolution
//! - [`events`] - typed producer payloads
//! - [`handlers`], [`routes`] - HTTP surface
//! - [`config`], [`errors`], [`observability`]

#![warn(clippy::pedantic)]

pub mod actors;
pub mod config;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod identity;
pub mod membership;
pub mod observability;
pub mod routes;
pub mod routing;
