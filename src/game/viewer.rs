//! Viewer module
//!
//! Candidate viewers are the connected players that could potentially see
//! an entity this tick. Computing them (world and chunk membership) is the
//! job of the world's visibility system; this module only models the result.

use std::collections::BTreeMap;

use dashmap::DashMap;
use glam::DVec3;
use tracing::debug;

/// Identity of a connected player
pub type PlayerId = u32;

/// A player that may track entities
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewer {
    /// Player identity
    pub id: PlayerId,
    /// Current eye position of the player
    pub position: DVec3,
}

impl Viewer {
    /// Create a new viewer
    pub fn new(id: PlayerId, position: DVec3) -> Self {
        Self { id, position }
    }
}

/// The candidate viewer set for one tick, ordered by player id
#[derive(Debug, Clone, Default)]
pub struct ViewerSet {
    viewers: BTreeMap<PlayerId, Viewer>,
}

impl ViewerSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a viewer
    pub fn insert(&mut self, viewer: Viewer) {
        self.viewers.insert(viewer.id, viewer);
    }

    /// Look up a viewer by player id
    pub fn get(&self, id: PlayerId) -> Option<&Viewer> {
        self.viewers.get(&id)
    }

    /// Check whether a player is a candidate
    pub fn contains(&self, id: PlayerId) -> bool {
        self.viewers.contains_key(&id)
    }

    /// Iterate viewers in ascending player id order
    pub fn iter(&self) -> impl Iterator<Item = &Viewer> {
        self.viewers.values()
    }

    /// Get the number of viewers
    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }
}

impl FromIterator<Viewer> for ViewerSet {
    fn from_iter<I: IntoIterator<Item = Viewer>>(iter: I) -> Self {
        let mut set = Self::new();
        for viewer in iter {
            set.insert(viewer);
        }
        set
    }
}

/// Supplies the candidate viewer set each tick
pub trait ViewerSupplier: Send + Sync {
    /// Get the players eligible to see entities of this world
    fn candidates(&self) -> ViewerSet;
}

/// Thread-safe registry of viewer positions, updated by connection handlers
/// and read by the tick loop
#[derive(Default)]
pub struct ViewerRegistry {
    viewers: DashMap<PlayerId, Viewer>,
}

impl ViewerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a player at a position
    pub fn register(&self, id: PlayerId, position: DVec3) {
        self.viewers.insert(id, Viewer::new(id, position));
        debug!(player_id = id, "Registered viewer");
    }

    /// Move a registered player. Returns false if the player is unknown.
    pub fn update_position(&self, id: PlayerId, position: DVec3) -> bool {
        match self.viewers.get_mut(&id) {
            Some(mut viewer) => {
                viewer.position = position;
                true
            }
            None => false,
        }
    }

    /// Remove a player
    pub fn unregister(&self, id: PlayerId) -> bool {
        let removed = self.viewers.remove(&id).is_some();
        if removed {
            debug!(player_id = id, "Unregistered viewer");
        }
        removed
    }

    /// Get the number of registered viewers
    pub fn count(&self) -> usize {
        self.viewers.len()
    }
}

impl ViewerSupplier for ViewerRegistry {
    fn candidates(&self) -> ViewerSet {
        self.viewers.iter().map(|entry| *entry.value()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewer_set_ordering() {
        let set: ViewerSet = [
            Viewer::new(9, DVec3::ZERO),
            Viewer::new(2, DVec3::ZERO),
            Viewer::new(5, DVec3::ZERO),
        ]
        .into_iter()
        .collect();

        let ids: Vec<PlayerId> = set.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![2, 5, 9]);
        assert!(set.contains(5));
        assert!(!set.contains(1));
    }

    #[test]
    fn test_registry_candidates() {
        let registry = ViewerRegistry::new();
        registry.register(1, DVec3::ZERO);
        registry.register(2, DVec3::new(10.0, 0.0, 0.0));
        assert!(registry.update_position(2, DVec3::new(20.0, 0.0, 0.0)));
        assert!(!registry.update_position(3, DVec3::ZERO));

        let candidates = registry.candidates();
        assert_eq!(candidates.len(), 2);
        assert_eq!(
            candidates.get(2).map(|v| v.position),
            Some(DVec3::new(20.0, 0.0, 0.0))
        );

        assert!(registry.unregister(1));
        assert_eq!(registry.count(), 1);
    }
}
