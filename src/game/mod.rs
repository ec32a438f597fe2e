//! Game module
//!
//! This module contains the game-side model the server synchronizes:
//! - Entities and their attribute state
//! - Viewers (connected players and where they stand)
//! - World management (game tick, entity lifecycle)
//! - Entity synchronization (tracking and delta updates)

pub mod entity;
pub mod sync;
pub mod viewer;
pub mod world;
