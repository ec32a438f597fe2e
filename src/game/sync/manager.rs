//! Entity protocol manager
//!
//! Owns the entity → tracker map of one world. Attaching and removing
//! trackers is safe from any thread; reconciliation runs on the tick loop.
//! Replaced or removed trackers are queued and destroyed at the start of the
//! next tick pass, never while another pass may still be using them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::protocol::{EntityProtocolSpec, EntityProtocolType};
use super::tracker::EntityTracker;
use crate::config::TrackingConfig;
use crate::error::ConfigError;
use crate::game::entity::{Entity, EntityId};
use crate::game::viewer::{PlayerId, ViewerSet};
use crate::net::session::ConnectionRegistry;

type SharedTracker = Arc<Mutex<EntityTracker>>;

/// Statistics of one tick pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// World tick the pass ran on
    pub tick: u64,
    /// Trackers destroyed from the removal queue
    pub destroyed: usize,
    /// Trackers that were due and reconciled
    pub reconciled: usize,
    /// Spawn messages sent
    pub spawned: usize,
    /// Destroy messages sent by reconciliation
    pub despawned: usize,
    /// Update messages sent
    pub updates: usize,
}

/// Manages the entity trackers of a world
pub struct EntityProtocolManager {
    /// Tracking configuration
    config: TrackingConfig,
    /// Live connections of all players
    connections: Arc<ConnectionRegistry>,
    /// Live trackers by entity id
    protocols: DashMap<EntityId, SharedTracker>,
    /// Trackers waiting to be destroyed
    queued_for_removal: Mutex<VecDeque<SharedTracker>>,
    /// Number of completed tick passes
    world_tick: AtomicU64,
}

impl EntityProtocolManager {
    /// Create a new manager
    pub fn new(config: TrackingConfig, connections: Arc<ConnectionRegistry>) -> Self {
        Self {
            config,
            connections,
            protocols: DashMap::new(),
            queued_for_removal: Mutex::new(VecDeque::new()),
            world_tick: AtomicU64::new(0),
        }
    }

    /// Get the tracking spec configured for a protocol type
    pub fn spec_for(&self, protocol: EntityProtocolType) -> EntityProtocolSpec {
        self.config.spec_for(protocol)
    }

    /// Start tracking an entity with the default protocol of its kind.
    ///
    /// Returns `Ok(false)` if the entity is already tracked.
    pub fn add(&self, entity: Arc<Entity>) -> Result<bool, ConfigError> {
        let spec = self.spec_for(EntityProtocolType::for_kind(entity.kind));
        match self.protocols.entry(entity.id) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                let tracker = self.construct(&spec, entity)?;
                entry.insert(tracker);
                Ok(true)
            }
        }
    }

    /// Track an entity with a specific protocol type, replacing any current
    /// tracker
    pub fn add_with_protocol(
        &self,
        entity: Arc<Entity>,
        protocol: EntityProtocolType,
    ) -> Result<(), ConfigError> {
        let spec = self.spec_for(protocol);
        self.add_with_spec(entity, &spec)
    }

    /// Track an entity with a specific spec, replacing any current tracker.
    ///
    /// The replaced tracker is destroyed on the next tick pass; the new one
    /// spawns the entity for its viewers from scratch.
    pub fn add_with_spec(
        &self,
        entity: Arc<Entity>,
        spec: &EntityProtocolSpec,
    ) -> Result<(), ConfigError> {
        let entity_id = entity.id;
        let tracker = self.construct(spec, entity)?;
        match self.protocols.entry(entity_id) {
            Entry::Occupied(mut entry) => {
                // Queued under the entry lock so no pass sees the new tracker
                // without also seeing the old one queued
                self.queued_for_removal.lock().push_back(entry.get().clone());
                entry.insert(tracker);
                debug!(
                    entity_id = entity_id,
                    protocol = spec.protocol.name(),
                    "Replaced entity protocol"
                );
            }
            Entry::Vacant(entry) => {
                entry.insert(tracker);
            }
        }
        Ok(())
    }

    /// Stop tracking an entity. Returns false if it was not tracked.
    pub fn remove(&self, entity_id: EntityId) -> bool {
        match self.protocols.entry(entity_id) {
            Entry::Occupied(entry) => {
                self.queued_for_removal.lock().push_back(entry.get().clone());
                entry.remove();
                debug!(entity_id = entity_id, "Queued entity protocol for removal");
                true
            }
            Entry::Vacant(_) => false,
        }
    }

    fn construct(
        &self,
        spec: &EntityProtocolSpec,
        entity: Arc<Entity>,
    ) -> Result<SharedTracker, ConfigError> {
        let entity_id = entity.id;
        let mut tracker = spec.construct(entity)?;
        tracker.set_tick_counter(self.world_tick());
        debug!(
            entity_id = entity_id,
            protocol = spec.protocol.name(),
            range = spec.tracking_range,
            update_rate = spec.tracking_update_rate,
            "Attached entity protocol"
        );
        Ok(Arc::new(Mutex::new(tracker)))
    }

    /// Run one tick pass against this tick's candidate viewers.
    ///
    /// Live trackers are collected first, then every queued tracker is
    /// destroyed, so a replacement never spawns before its predecessor's
    /// destroy. Live trackers are then reconciled in ascending entity id
    /// order if they are due on this world tick; a tracker destroyed in the
    /// meantime is skipped.
    pub fn update_trackers(&self, candidates: &ViewerSet) -> TickSummary {
        let tick = self.world_tick();
        let mut summary = TickSummary {
            tick,
            ..Default::default()
        };

        let mut protocols: Vec<(EntityId, SharedTracker)> = self
            .protocols
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        protocols.sort_unstable_by_key(|(entity_id, _)| *entity_id);

        let queued: Vec<SharedTracker> = self.queued_for_removal.lock().drain(..).collect();
        for tracker in queued {
            tracker.lock().destroy(&self.connections);
            summary.destroyed += 1;
        }

        for (entity_id, tracker) in &protocols {
            let mut tracker = tracker.lock();
            if tracker.is_destroyed() {
                continue;
            }
            // The world clock decides the phase, whenever the tracker attached
            tracker.set_tick_counter(tick);
            if tracker.is_due() {
                let changes = tracker.update_trackers(candidates, &self.connections);
                summary.reconciled += 1;
                summary.spawned += changes.added.len();
                summary.despawned += changes.removed.len();
                summary.updates += changes.updates;
                if !changes.is_empty() {
                    trace!(
                        entity_id = entity_id,
                        added = changes.added.len(),
                        removed = changes.removed.len(),
                        updates = changes.updates,
                        "Reconciled entity trackers"
                    );
                }
            }
            tracker.advance_tick();
        }

        self.world_tick.fetch_add(1, Ordering::SeqCst);
        summary
    }

    /// Get the number of completed tick passes
    pub fn world_tick(&self) -> u64 {
        self.world_tick.load(Ordering::SeqCst)
    }

    /// Get the number of tracked entities
    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    /// Check if no entity is tracked
    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }

    /// Check whether an entity is tracked
    pub fn contains(&self, entity_id: EntityId) -> bool {
        self.protocols.contains_key(&entity_id)
    }

    /// Get the protocol type tracking an entity
    pub fn protocol_of(&self, entity_id: EntityId) -> Option<EntityProtocolType> {
        self.protocols
            .get(&entity_id)
            .map(|tracker| tracker.lock().protocol())
    }

    /// Get the clients currently tracking an entity, in ascending id order
    pub fn trackers_of(&self, entity_id: EntityId) -> Option<Vec<PlayerId>> {
        self.protocols
            .get(&entity_id)
            .map(|tracker| tracker.lock().trackers().iter().copied().collect())
    }

    /// Get the number of trackers waiting to be destroyed
    pub fn pending_removals(&self) -> usize {
        self.queued_for_removal.lock().len()
    }

    /// Get the connection registry messages are delivered through
    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::{EntityKind, Transform};
    use crate::game::viewer::Viewer;
    use glam::DVec3;

    fn manager() -> EntityProtocolManager {
        let config = TrackingConfig {
            default_update_rate: 1,
            ..Default::default()
        };
        EntityProtocolManager::new(config, Arc::new(ConnectionRegistry::new()))
    }

    fn entity(id: EntityId, kind: EntityKind) -> Arc<Entity> {
        Arc::new(Entity::new(id, kind, Transform::at(DVec3::ZERO)))
    }

    fn near(id: PlayerId) -> ViewerSet {
        std::iter::once(Viewer::new(id, DVec3::ZERO)).collect()
    }

    #[test]
    fn test_add_is_idempotent() {
        let manager = manager();
        let zombie = entity(1, EntityKind::Insentient { mob_type: 54 });
        assert_eq!(manager.add(zombie.clone()), Ok(true));
        assert_eq!(manager.add(zombie), Ok(false));
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.protocol_of(1), Some(EntityProtocolType::Insentient));
    }

    #[test]
    fn test_incompatible_protocol_rejected_at_attach() {
        let manager = manager();
        let arrow = entity(2, EntityKind::Object { object_type: 60 });
        assert!(matches!(
            manager.add_with_protocol(arrow, EntityProtocolType::Living),
            Err(ConfigError::IncompatibleProtocol { .. })
        ));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_replaced_protocol_destroyed_next_tick() {
        let manager = manager();
        let (_session, mut rx) = manager.connections().create_session(9, 16);
        let zombie = entity(3, EntityKind::Insentient { mob_type: 54 });
        manager.add(zombie.clone()).unwrap();
        manager.update_trackers(&near(9));
        assert_eq!(rx.try_recv().unwrap().name(), "spawn_mob");

        manager
            .add_with_protocol(zombie, EntityProtocolType::Living)
            .unwrap();
        assert_eq!(manager.pending_removals(), 1);

        let summary = manager.update_trackers(&near(9));
        assert_eq!(summary.destroyed, 1);
        assert_eq!(summary.spawned, 1);
        assert_eq!(rx.try_recv().unwrap().name(), "destroy_entities");
        assert_eq!(rx.try_recv().unwrap().name(), "spawn_mob");
        assert_eq!(manager.trackers_of(3), Some(vec![9]));
    }

    #[test]
    fn test_remove_destroys_on_next_tick() {
        let manager = manager();
        let (_session, mut rx) = manager.connections().create_session(1, 16);
        manager.add(entity(4, EntityKind::Slime)).unwrap();
        manager.update_trackers(&near(1));
        rx.try_recv().unwrap();

        assert!(manager.remove(4));
        assert!(!manager.remove(4));
        assert!(!manager.contains(4));
        assert!(rx.try_recv().is_err());

        manager.update_trackers(&near(1));
        assert_eq!(rx.try_recv().unwrap().name(), "destroy_entities");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_update_rate_follows_world_clock() {
        let manager = EntityProtocolManager::new(
            TrackingConfig::default(),
            Arc::new(ConnectionRegistry::new()),
        );
        for _ in 0..2 {
            manager.update_trackers(&ViewerSet::new());
        }

        // Attached on world tick 2 with rate 4: first due on world tick 4
        manager.add(entity(5, EntityKind::Living { mob_type: 90 })).unwrap();
        let reconciled: Vec<usize> = (0..5)
            .map(|_| manager.update_trackers(&near(1)).reconciled)
            .collect();
        assert_eq!(reconciled, vec![0, 0, 1, 0, 0]);
    }

    #[test]
    fn test_late_attach_keeps_world_phase() {
        let manager = EntityProtocolManager::new(
            TrackingConfig::default(),
            Arc::new(ConnectionRegistry::new()),
        );
        for _ in 0..3 {
            manager.update_trackers(&ViewerSet::new());
        }

        // Seeded from the clock one tick before this pass reads it, as when
        // attached from another thread while the previous pass finished
        manager.add(entity(6, EntityKind::Living { mob_type: 90 })).unwrap();
        manager
            .protocols
            .get(&6)
            .unwrap()
            .lock()
            .set_tick_counter(manager.world_tick() - 1);

        // World ticks 3..=8 with rate 4: due on 4 and 8
        let reconciled: Vec<usize> = (0..6)
            .map(|_| manager.update_trackers(&near(1)).reconciled)
            .collect();
        assert_eq!(reconciled, vec![0, 1, 0, 0, 0, 1]);
    }
}
