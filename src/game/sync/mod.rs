//! Entity synchronization module
//!
//! Decides every tick which clients track which entities, and encodes the
//! smallest set of messages that keeps each client's view in sync:
//! - Parameter types and per-kind parameter tables
//! - Parameter lists (attribute state on the wire)
//! - Entity protocols (spawn / update / destroy message builders)
//! - Per-entity tracking state machine
//! - Per-world protocol manager driven by the tick loop

pub mod context;
pub mod manager;
pub mod parameter;
pub mod parameter_list;
pub mod parameters;
pub mod protocol;
pub mod tracker;

pub use context::EntityUpdateContext;
pub use manager::{EntityProtocolManager, TickSummary};
pub use parameter::{ParameterType, ParameterTypeCollection, ParameterValue, ParameterValueType};
pub use parameter_list::{ByteBufParameterList, ParameterList};
pub use protocol::{EntityProtocolSpec, EntityProtocolType, LastSent};
pub use tracker::{EntityTracker, TrackerChanges};
