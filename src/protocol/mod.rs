//! Protocol module
//!
//! - Fixed-point and angle codecs shared by all entity messages
//! - Outgoing entity messages (spawn, move, rotate, metadata, destroy)

pub mod codec;
pub mod messages;
