//! Entity tracker
//!
//! Per-entity tracking state machine. For every (entity, client) pair the
//! client is either untracked, or has been sent a spawn and receives
//! incremental updates until it is sent a destroy. A client that starts
//! tracking again is treated as a fresh spawn.
//!
//! Only the tick loop mutates a tracker; the manager hands it out behind a
//! lock so that removal from other threads is safe.

use std::collections::BTreeSet;
use std::sync::Arc;

use glam::DVec3;
use tracing::{debug, error, trace};

use super::context::EntityUpdateContext;
use super::protocol::{EntityProtocolType, LastSent};
use crate::game::entity::{Entity, EntityId};
use crate::game::viewer::{PlayerId, Viewer, ViewerSet};
use crate::net::session::ConnectionRegistry;

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerChanges {
    /// Clients that were sent a spawn message
    pub added: Vec<PlayerId>,
    /// Clients that were sent a destroy message
    pub removed: Vec<PlayerId>,
    /// Number of update messages sent to the remaining clients
    pub updates: usize,
}

impl TrackerChanges {
    /// Whether the pass changed nothing and sent nothing
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updates == 0
    }
}

/// Tracking state of one entity
pub struct EntityTracker {
    entity: Arc<Entity>,
    protocol: EntityProtocolType,
    /// Clients currently tracking the entity, by id
    trackers: BTreeSet<PlayerId>,
    /// What every current tracker was last told
    last_sent: LastSent,
    tick_counter: u64,
    tick_rate: u32,
    tracking_range: f64,
    destroyed: bool,
}

impl EntityTracker {
    /// Create a tracker; use [`EntityProtocolSpec::construct`] to validate
    /// the protocol pairing first
    ///
    /// [`EntityProtocolSpec::construct`]: super::protocol::EntityProtocolSpec::construct
    pub(crate) fn new(
        entity: Arc<Entity>,
        protocol: EntityProtocolType,
        tracking_range: f64,
        tick_rate: u32,
    ) -> Self {
        Self {
            entity,
            protocol,
            trackers: BTreeSet::new(),
            last_sent: LastSent::default(),
            tick_counter: 0,
            tick_rate: tick_rate.max(1),
            tracking_range,
            destroyed: false,
        }
    }

    /// Get the tracked entity
    pub fn entity(&self) -> &Arc<Entity> {
        &self.entity
    }

    /// Get the id of the tracked entity
    pub fn entity_id(&self) -> EntityId {
        self.entity.id
    }

    /// Get the protocol type
    pub fn protocol(&self) -> EntityProtocolType {
        self.protocol
    }

    /// Get the clients currently tracking the entity
    pub fn trackers(&self) -> &BTreeSet<PlayerId> {
        &self.trackers
    }

    /// Check whether a client is tracking the entity
    pub fn is_tracked_by(&self, player_id: PlayerId) -> bool {
        self.trackers.contains(&player_id)
    }

    /// Get the last sent snapshot
    pub fn last_sent(&self) -> &LastSent {
        &self.last_sent
    }

    /// Get the number of ticks between tracking passes
    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    /// Get the tracking range
    pub fn tracking_range(&self) -> f64 {
        self.tracking_range
    }

    /// Get the tick counter
    pub fn tick_counter(&self) -> u64 {
        self.tick_counter
    }

    /// Seed the tick counter, keeping the update phase aligned with the world clock
    pub fn set_tick_counter(&mut self, tick: u64) {
        self.tick_counter = tick;
    }

    /// Whether a tracking pass is due this tick
    pub fn is_due(&self) -> bool {
        self.tick_counter % self.tick_rate as u64 == 0
    }

    /// Advance the tick counter by one tick
    pub fn advance_tick(&mut self) {
        self.tick_counter = self.tick_counter.wrapping_add(1);
    }

    /// Whether the tracker has been destroyed
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Whether a viewer can see the entity at `position`
    pub fn is_visible(&self, position: DVec3, viewer: &Viewer) -> bool {
        is_visible(
            position,
            viewer,
            self.entity.controller(),
            self.tracking_range,
        )
    }

    /// Reconcile the tracker set against this tick's candidate viewers and
    /// send the resulting messages.
    ///
    /// Existing trackers receive updates first, then new trackers receive the
    /// spawn, then dropped trackers receive the destroy. A dropped tracker
    /// never receives an update in the same pass.
    pub fn update_trackers(
        &mut self,
        candidates: &ViewerSet,
        connections: &ConnectionRegistry,
    ) -> TrackerChanges {
        let mut changes = TrackerChanges::default();
        if self.destroyed {
            return changes;
        }

        let position = self.entity.position();
        let controller = self.entity.controller();
        let range = self.tracking_range;

        self.trackers.retain(|&player_id| {
            let keep = candidates
                .get(player_id)
                .is_some_and(|viewer| is_visible(position, viewer, controller, range));
            if !keep {
                changes.removed.push(player_id);
            }
            keep
        });

        changes.added = candidates
            .iter()
            .filter(|viewer| !self.trackers.contains(&viewer.id))
            .filter(|viewer| is_visible(position, viewer, controller, range))
            .map(|viewer| viewer.id)
            .collect();

        if !self.trackers.is_empty() {
            let updates = self
                .protocol
                .build_update_messages(&self.entity, &mut self.last_sent);
            changes.updates = updates.len();
            let ctx = EntityUpdateContext::new(&self.trackers, controller, connections);
            for update in updates {
                ctx.send(update);
            }
        }

        if !changes.added.is_empty() {
            match self
                .protocol
                .build_spawn_message(&self.entity, &mut self.last_sent)
            {
                Ok(message) => {
                    let added: BTreeSet<PlayerId> = changes.added.iter().copied().collect();
                    let ctx = EntityUpdateContext::new(&added, controller, connections);
                    ctx.send_to_all_except_self(Arc::new(message));
                    for player_id in &changes.added {
                        trace!(entity_id = self.entity.id, player_id = player_id, "Tracker added");
                    }
                    self.trackers.extend(added);
                }
                Err(e) => {
                    error!(
                        entity_id = self.entity.id,
                        protocol = self.protocol.name(),
                        error = %e,
                        "Failed to build spawn message"
                    );
                    changes.added.clear();
                }
            }
        }

        if !changes.removed.is_empty() {
            let removed: BTreeSet<PlayerId> = changes.removed.iter().copied().collect();
            let ctx = EntityUpdateContext::new(&removed, controller, connections);
            ctx.send_to_all_except_self(Arc::new(
                self.protocol.build_destroy_message(self.entity.id),
            ));
            for player_id in &changes.removed {
                trace!(entity_id = self.entity.id, player_id = player_id, "Tracker removed");
            }
        }

        changes
    }

    /// Remove every tracker, sending each a destroy message.
    ///
    /// Calling this more than once has no further effect.
    pub fn destroy(&mut self, connections: &ConnectionRegistry) -> Vec<PlayerId> {
        if self.destroyed {
            return Vec::new();
        }
        self.destroyed = true;

        let removed: Vec<PlayerId> = self.trackers.iter().copied().collect();
        if !self.trackers.is_empty() {
            let ctx = EntityUpdateContext::new(&self.trackers, self.entity.controller(), connections);
            ctx.send_to_all_except_self(Arc::new(
                self.protocol.build_destroy_message(self.entity.id),
            ));
            self.trackers.clear();
        }
        debug!(
            entity_id = self.entity.id,
            protocol = self.protocol.name(),
            trackers = removed.len(),
            "Entity tracker destroyed"
        );
        removed
    }
}

impl std::fmt::Debug for EntityTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityTracker")
            .field("entity_id", &self.entity.id)
            .field("protocol", &self.protocol)
            .field("trackers", &self.trackers)
            .field("tick_counter", &self.tick_counter)
            .field("tick_rate", &self.tick_rate)
            .field("tracking_range", &self.tracking_range)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

fn is_visible(
    position: DVec3,
    viewer: &Viewer,
    controller: Option<PlayerId>,
    range: f64,
) -> bool {
    controller != Some(viewer.id) && viewer.position.distance_squared(position) <= range * range
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::{EntityKind, Transform};
    use crate::game::sync::protocol::EntityProtocolSpec;
    use crate::protocol::messages::Message;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    fn drain(rx: &mut mpsc::Receiver<Arc<Message>>) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(message) = rx.try_recv() {
            names.push(message.name());
        }
        names
    }

    fn tracker(entity: Entity) -> EntityTracker {
        EntityProtocolSpec::new(EntityProtocolType::for_kind(entity.kind))
            .construct(Arc::new(entity))
            .unwrap()
    }

    fn viewers(list: &[(PlayerId, DVec3)]) -> ViewerSet {
        list.iter().map(|&(id, pos)| Viewer::new(id, pos)).collect()
    }

    #[test]
    fn test_spawn_update_destroy_cycle() {
        let connections = ConnectionRegistry::new();
        let (_session, mut rx) = connections.create_session(1, 16);
        let entity = Entity::new(
            10,
            EntityKind::Living { mob_type: 90 },
            Transform::at(DVec3::new(0.0, 64.0, 0.0)),
        );
        let mut tracker = tracker(entity);
        let near = viewers(&[(1, DVec3::new(4.0, 64.0, 0.0))]);

        let changes = tracker.update_trackers(&near, &connections);
        assert_eq!(changes.added, vec![1]);
        assert_eq!(drain(&mut rx), vec!["spawn_mob"]);

        // Nothing changed
        let changes = tracker.update_trackers(&near, &connections);
        assert!(changes.is_empty());
        assert!(drain(&mut rx).is_empty());

        tracker.entity().set_position(DVec3::new(2.0, 64.0, 0.0));
        let changes = tracker.update_trackers(&near, &connections);
        assert_eq!(changes.updates, 1);
        assert_eq!(drain(&mut rx), vec!["relative_move"]);

        let changes = tracker.update_trackers(&ViewerSet::new(), &connections);
        assert_eq!(changes.removed, vec![1]);
        assert!(tracker.trackers().is_empty());
        assert_eq!(drain(&mut rx), vec!["destroy_entities"]);
    }

    #[test]
    fn test_out_of_range_viewer_not_tracked() {
        let connections = ConnectionRegistry::new();
        let entity = Entity::new(1, EntityKind::Object { object_type: 2 }, Transform::default());
        let mut tracker = tracker(entity);

        let exactly_at_range = viewers(&[(1, DVec3::new(64.0, 0.0, 0.0))]);
        let beyond = viewers(&[(1, DVec3::new(64.5, 0.0, 0.0))]);

        assert_eq!(tracker.update_trackers(&beyond, &connections).added, Vec::<PlayerId>::new());
        assert_eq!(tracker.update_trackers(&exactly_at_range, &connections).added, vec![1]);
        assert_eq!(tracker.update_trackers(&beyond, &connections).removed, vec![1]);
    }

    #[test]
    fn test_controller_never_tracks_itself() {
        let connections = ConnectionRegistry::new();
        let (_own, mut own_rx) = connections.create_session(5, 16);
        let (_other, mut other_rx) = connections.create_session(6, 16);
        let entity = Entity::new(3, EntityKind::Humanoid, Transform::default()).with_controller(5);
        let mut tracker = tracker(entity);
        let both = viewers(&[(5, DVec3::ZERO), (6, DVec3::ZERO)]);

        let changes = tracker.update_trackers(&both, &connections);
        assert_eq!(changes.added, vec![6]);
        assert_eq!(drain(&mut other_rx), vec!["spawn_player"]);
        assert!(drain(&mut own_rx).is_empty());

        // Velocity reaches the controller, movement does not
        tracker.entity().set_position(DVec3::new(1.0, 0.0, 0.0));
        tracker.entity().set_velocity(DVec3::new(0.1, 0.0, 0.0));
        tracker.update_trackers(&both, &connections);
        assert_eq!(drain(&mut other_rx), vec!["relative_move", "velocity"]);
        assert_eq!(drain(&mut own_rx), vec!["velocity"]);
    }

    #[test]
    fn test_removed_tracker_gets_only_destroy() {
        let connections = ConnectionRegistry::new();
        let (_a, mut rx_a) = connections.create_session(1, 16);
        let (_b, mut rx_b) = connections.create_session(2, 16);
        let entity = Entity::new(
            7,
            EntityKind::Living { mob_type: 90 },
            Transform::at(DVec3::ZERO),
        );
        let mut tracker = tracker(entity);
        tracker.update_trackers(
            &viewers(&[(1, DVec3::ZERO), (2, DVec3::ZERO)]),
            &connections,
        );
        drain(&mut rx_a);
        drain(&mut rx_b);

        tracker.entity().set_position(DVec3::new(1.0, 0.0, 0.0));
        let changes = tracker.update_trackers(&viewers(&[(1, DVec3::ZERO)]), &connections);
        assert_eq!(changes.removed, vec![2]);
        assert_eq!(drain(&mut rx_a), vec!["relative_move"]);
        assert_eq!(drain(&mut rx_b), vec!["destroy_entities"]);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let connections = ConnectionRegistry::new();
        let (_session, mut rx) = connections.create_session(1, 16);
        let entity = Entity::new(2, EntityKind::Slime, Transform::default());
        let mut tracker = tracker(entity);
        tracker.update_trackers(&viewers(&[(1, DVec3::ZERO)]), &connections);
        drain(&mut rx);

        assert_eq!(tracker.destroy(&connections), vec![1]);
        assert!(tracker.destroy(&connections).is_empty());
        assert_eq!(drain(&mut rx), vec!["destroy_entities"]);
        assert!(tracker.is_destroyed());

        // A destroyed tracker never reconciles again
        assert!(tracker
            .update_trackers(&viewers(&[(1, DVec3::ZERO)]), &connections)
            .is_empty());
    }

    #[test]
    fn test_tick_phase() {
        let entity = Entity::new(1, EntityKind::Lightning, Transform::default());
        let mut tracker = EntityProtocolSpec::new(EntityProtocolType::Lightning)
            .with_update_rate(3)
            .construct(Arc::new(entity))
            .unwrap();
        tracker.set_tick_counter(7);

        let due: Vec<bool> = (0..6)
            .map(|_| {
                let due = tracker.is_due();
                tracker.advance_tick();
                due
            })
            .collect();
        assert_eq!(due, vec![false, false, true, false, false, true]);
    }
}
