//! Common utilities and types shared across QuestHub realtime components.

#![warn(clippy::pedantic)]

/// Module for identifier newtypes (connections, users, rooms)
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;
