//! Networking module
//!
//! - Packet buffers for encoding and decoding messages
//! - Per-client outbound sessions and the connection registry

pub mod buffer;
pub mod session;
