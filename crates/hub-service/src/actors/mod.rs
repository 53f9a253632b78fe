//! Hub actor system.
//!
//! - [`hub`]: the single command loop owning the connection table
//! - [`connection`]: outbound and inbound loops for one transport
//! - [`messages`]: commands and status types exchanged with the hub
//! - [`metrics`]: counters shared between the hub task and its handles

pub mod connection;
pub mod hub;
pub mod messages;
pub mod metrics;

pub use connection::{attach, ConnectionSettings, ConnectionTasks};
pub use hub::{HubHandle, HubSettings};
pub use messages::{ConnectionInfo, ConnectionRegistration, HubMessage, HubStatus};
pub use metrics::HubStats;
