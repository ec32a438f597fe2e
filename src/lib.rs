//! Entity Sync Server Library
//!
//! Entity visibility tracking and delta-encoded state synchronization for a
//! multiplayer game server. Every tick, each entity decides which connected
//! clients can see it and sends them the smallest set of messages that keeps
//! their copy of the entity current.
//!
//! ## Modules
//!
//! - `config` - Server configuration management
//! - `error` - Error types and result definitions
//! - `game` - Entities, viewers, the game world and entity synchronization
//! - `net` - Packet buffers and client connections
//! - `protocol` - Wire codecs and outgoing entity messages
//! - `state` - Shared application state

pub mod config;
pub mod error;
pub mod game;
pub mod net;
pub mod protocol;
pub mod state;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::{Result, SyncError};
pub use state::AppState;

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
