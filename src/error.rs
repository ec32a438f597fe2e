//! Error handling module
//!
//! Defines the error types for the entity synchronization server.

use std::io;

use thiserror::Error;

use crate::game::entity::EntityId;
use crate::game::viewer::PlayerId;

/// Main error type for the entity synchronization server
#[derive(Error, Debug)]
pub enum SyncError {
    /// Wire encoding/decoding errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Entity protocol configuration errors (raised at attach time)
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Delivery errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Server configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Encoding and decoding errors.
///
/// These are programming errors: they abort the message being built, never
/// the tick.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Parameter {index} written twice in one list")]
    DuplicateParameter { index: u8 },

    #[error("Parameter {index} expects {expected} but got {actual}")]
    ValueTypeMismatch {
        index: u8,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Unknown parameter value type: {0}")]
    UnknownValueType(u8),

    #[error("Buffer underflow: needed {needed} bytes, {remaining} remaining")]
    BufferUnderflow { needed: usize, remaining: usize },

    #[error("VarInt is too long")]
    VarIntTooLong,

    #[error("String too long: {length} bytes (max: {max})")]
    StringTooLong { length: usize, max: usize },

    #[error("Invalid UTF-8 in string")]
    InvalidUtf8,

    #[error("Malformed formatted text: {0}")]
    MalformedText(String),

    #[error("Parameter list is missing its terminator")]
    UnterminatedParameterList,

    #[error("Unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),
}

/// Attach-time configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Protocol {protocol} is not applicable to entity {entity_id}: {reason}")]
    IncompatibleProtocol {
        protocol: &'static str,
        entity_id: EntityId,
        reason: &'static str,
    },

    #[error("Invalid tick rate: {0} (must be at least 1)")]
    InvalidTickRate(u32),

    #[error("Invalid tracking range: {0}")]
    InvalidTrackingRange(f64),
}

/// Delivery errors for a single tracker's connection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Connection closed for player {0}")]
    ConnectionClosed(PlayerId),

    #[error("Write buffer full for player {0}")]
    WriteBufferFull(PlayerId),
}

/// Result type alias for entity synchronization operations
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::DuplicateParameter { index: 7 };
        assert_eq!(err.to_string(), "Parameter 7 written twice in one list");

        let err = ProtocolError::UnknownOpcode(0x2a);
        assert_eq!(err.to_string(), "Unknown opcode: 0x2a");

        let err = NetworkError::WriteBufferFull(3);
        assert_eq!(err.to_string(), "Write buffer full for player 3");
    }

    #[test]
    fn test_error_conversion() {
        let err: SyncError = ConfigError::InvalidTickRate(0).into();
        assert!(matches!(
            err,
            SyncError::Configuration(ConfigError::InvalidTickRate(0))
        ));

        let err: SyncError = ProtocolError::VarIntTooLong.into();
        assert_eq!(err.to_string(), "Protocol error: VarInt is too long");
    }
}
