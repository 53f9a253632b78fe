//! # Hub Test Utilities
//!
//! Shared test utilities for the QuestHub realtime hub.
//!
//! - `mock_membership` - in-memory room membership store
//! - `fixtures` - hub spawning, in-process connections, identity stubs
//! - `server_harness` - real HTTP/WebSocket server on a random port
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hub_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_room_message() {
//!     let store = MockMembershipStore::new().with_room("g1", &["alice"]);
//!     let hub = spawn_hub(&store);
//!
//!     let mut alice = TestConnection::register(&hub, Some("alice"), 8).await;
//!     hub.route(r#"{"game_id":"g1","content":"hi"}"#).await.unwrap();
//!
//!     assert_eq!(alice.recv_json().await["content"], "hi");
//! }
//! ```

pub mod fixtures;
pub mod mock_membership;
pub mod server_harness;

pub use fixtures::*;
pub use mock_membership::*;
pub use server_harness::*;
