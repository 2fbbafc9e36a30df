//! # Nexus Networking Layer
//!
//! Tokio-based listeners and per-connection drivers for both tiers.
//!
//! ## Modules
//!
//! - [`config`] - Networking options
//! - [`sts_session`] - Login handshake state machine (text tier)
//! - [`realm_session`] - Token handoff and world entry state machine (binary tier)
//! - [`connection`] - Async drivers that feed sockets through the state machines
//! - [`handlers`] - World packet handler registry
//! - [`server`] - Listeners and connection supervision

pub mod config;
pub mod connection;
pub mod handlers;
pub mod realm_session;
pub mod server;
pub mod sts_session;

// Re-export commonly used items
pub use config::NetworkConfig;
pub use connection::{RealmConnection, StsConnection};
pub use handlers::{HandlerRegistry, WorldContext, WorldHandler};
pub use realm_session::{RealmAction, RealmSession, RealmSettings, RealmState};
pub use server::{ConnectionInfo, NexusServer};
pub use sts_session::{StsAction, StsSession, StsState};
