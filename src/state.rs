//! Application state module
//!
//! Contains the shared state used by the tick loop and the client-facing side
//! of the server.

use std::sync::Arc;

use dashmap::DashMap;
use glam::DVec3;
use tokio::sync::{broadcast, mpsc};
use tracing::info;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::game::entity::{Entity, EntityId, EntityKind, Transform};
use crate::game::viewer::{PlayerId, ViewerRegistry};
use crate::game::world::{GameWorld, WorldSettings};
use crate::net::session::{ConnectionRegistry, Session};
use crate::protocol::messages::Message;

/// Namespace the unique ids of player avatars are derived in
const AVATAR_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2b7e_94d3_4a58_b0e1_5c8d_2a47_f903);

/// Application state shared across all connections
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Live client connections
    pub connections: Arc<ConnectionRegistry>,
    /// Viewer positions of connected players
    pub viewers: Arc<ViewerRegistry>,
    /// Game world state
    pub world: Arc<GameWorld>,
    /// Avatar entity of each connected player
    avatars: DashMap<PlayerId, EntityId>,
    /// Shutdown signal sender
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: ServerConfig, shutdown_tx: broadcast::Sender<()>) -> Self {
        let connections = Arc::new(ConnectionRegistry::new());
        let viewers = Arc::new(ViewerRegistry::new());
        let world = Arc::new(GameWorld::new(
            WorldSettings::from_config(&config),
            connections.clone(),
            viewers.clone(),
        ));

        Self {
            config,
            connections,
            viewers,
            world,
            avatars: DashMap::new(),
            shutdown_tx,
        }
    }

    /// Connect a player: open its outbound session, place it as a viewer and
    /// give it a humanoid avatar it controls.
    ///
    /// The returned receiver yields every message sent to the player.
    pub fn connect_player(
        &self,
        player_id: PlayerId,
        position: DVec3,
    ) -> Result<(Arc<Session>, mpsc::Receiver<Arc<Message>>)> {
        let (session, rx) = self
            .connections
            .create_session(player_id, self.config.outbound_queue_capacity);
        self.viewers.register(player_id, position);

        let entity_id = self.world.next_entity_id();
        let avatar = Entity::new(entity_id, EntityKind::Humanoid, Transform::at(position))
            .with_unique_id(Self::avatar_unique_id(player_id))
            .with_controller(player_id);
        if let Err(e) = self.world.add_entity(avatar) {
            self.viewers.unregister(player_id);
            self.connections.unregister(player_id);
            return Err(e);
        }
        self.avatars.insert(player_id, entity_id);

        info!(
            player_id = player_id,
            entity_id = entity_id,
            players = self.connections.count(),
            "Player connected"
        );
        Ok((session, rx))
    }

    /// Move a connected player and its avatar
    pub fn move_player(&self, player_id: PlayerId, position: DVec3) -> bool {
        if !self.viewers.update_position(player_id, position) {
            return false;
        }
        if let Some(entity) = self.avatar_of(player_id).and_then(|id| self.world.entity(id)) {
            entity.set_position(position);
        }
        true
    }

    /// Disconnect a player. Its avatar is destroyed for the remaining
    /// trackers on the next tick.
    pub fn disconnect_player(&self, player_id: PlayerId) -> bool {
        let had_viewer = self.viewers.unregister(player_id);
        let had_connection = self.connections.unregister(player_id);
        if let Some((_, entity_id)) = self.avatars.remove(&player_id) {
            self.world.despawn_entity(entity_id);
        }
        let removed = had_viewer || had_connection;
        if removed {
            info!(
                player_id = player_id,
                players = self.connections.count(),
                "Player disconnected"
            );
        }
        removed
    }

    /// Get the avatar entity id of a connected player
    pub fn avatar_of(&self, player_id: PlayerId) -> Option<EntityId> {
        self.avatars.get(&player_id).map(|id| *id.value())
    }

    /// Get the ids of all connected players, in ascending order
    pub fn player_ids(&self) -> Vec<PlayerId> {
        let mut ids: Vec<PlayerId> = self.avatars.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Stable unique id of a player's avatar, the same across reconnects
    pub fn avatar_unique_id(player_id: PlayerId) -> Uuid {
        Uuid::new_v5(&AVATAR_NAMESPACE, &player_id.to_be_bytes())
    }
}
