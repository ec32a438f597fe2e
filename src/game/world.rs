//! World module
//!
//! Manages the game world including:
//! - Game tick loop
//! - Entity lifecycle (spawn, despawn, id allocation)
//! - Entity tracking, driven once per tick against the candidate viewers

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{ServerConfig, TrackingConfig};
use crate::error::Result;
use crate::game::entity::{Entity, EntityId, EntityKind, Transform};
use crate::game::sync::{EntityProtocolManager, EntityProtocolType, TickSummary};
use crate::game::viewer::ViewerSupplier;
use crate::net::session::ConnectionRegistry;

/// Default game tick rate in milliseconds
pub const TICK_RATE_MS: u64 = 50;

/// World settings
#[derive(Debug, Clone)]
pub struct WorldSettings {
    /// World ID (1-255)
    pub world_id: u8,
    /// World name
    pub name: String,
    /// Tick rate in milliseconds
    pub tick_rate_ms: u64,
    /// Entity tracking configuration
    pub tracking: TrackingConfig,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            world_id: 1,
            name: "entity-sync".to_string(),
            tick_rate_ms: TICK_RATE_MS,
            tracking: TrackingConfig::default(),
        }
    }
}

impl WorldSettings {
    /// Create new world settings with a specific ID
    pub fn new(world_id: u8) -> Self {
        Self {
            world_id,
            ..Default::default()
        }
    }

    /// Create world settings from the server configuration
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            world_id: config.world_id,
            name: config.server_name.clone(),
            tick_rate_ms: config.tick_rate_ms,
            tracking: config.tracking.clone(),
        }
    }

    /// Set the world name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the tracking configuration
    pub fn with_tracking(mut self, tracking: TrackingConfig) -> Self {
        self.tracking = tracking;
        self
    }
}

/// World state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldState {
    /// World is initializing
    Initializing,
    /// World is running normally
    Running,
    /// World is shutting down
    ShuttingDown,
    /// World has stopped
    Stopped,
}

impl WorldState {
    /// Check if the world is processing ticks
    pub fn is_active(&self) -> bool {
        matches!(self, WorldState::Running)
    }
}

/// Game world - drives the tick and owns the entities it synchronizes
pub struct GameWorld {
    /// World settings
    pub settings: WorldSettings,
    /// Current world state
    state: RwLock<WorldState>,
    /// Current tick number
    tick: AtomicU64,
    /// Whether the world is running
    running: AtomicBool,
    /// Time the world started
    start_time: RwLock<Option<Instant>>,
    /// Live entities by id
    entities: DashMap<EntityId, Arc<Entity>>,
    /// Next entity id to assign
    next_entity_id: AtomicI32,
    /// Entity trackers of this world
    pub protocols: EntityProtocolManager,
    /// Source of the candidate viewers each tick
    viewers: Arc<dyn ViewerSupplier>,
}

impl GameWorld {
    /// Create a new game world
    pub fn new(
        settings: WorldSettings,
        connections: Arc<ConnectionRegistry>,
        viewers: Arc<dyn ViewerSupplier>,
    ) -> Self {
        info!(
            world_id = settings.world_id,
            name = %settings.name,
            "Creating game world"
        );

        let protocols = EntityProtocolManager::new(settings.tracking.clone(), connections);
        Self {
            settings,
            state: RwLock::new(WorldState::Initializing),
            tick: AtomicU64::new(0),
            running: AtomicBool::new(false),
            start_time: RwLock::new(None),
            entities: DashMap::new(),
            next_entity_id: AtomicI32::new(1),
            protocols,
            viewers,
        }
    }

    /// Get the current world state
    pub fn state(&self) -> WorldState {
        *self.state.read()
    }

    /// Set the world state
    pub fn set_state(&self, new_state: WorldState) {
        let mut state = self.state.write();
        let old_state = *state;
        *state = new_state;
        info!(
            old_state = ?old_state,
            new_state = ?new_state,
            "World state changed"
        );
    }

    /// Get the current tick number
    pub fn tick(&self) -> u64 {
        self.tick.load(Ordering::SeqCst)
    }

    /// Check if the world is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Request the tick loop to stop after the current tick
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Get the uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time
            .read()
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    // ============ Entities ============

    /// Allocate a fresh entity id
    pub fn next_entity_id(&self) -> EntityId {
        self.next_entity_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Create an entity of a kind and start tracking it
    pub fn spawn_entity(&self, kind: EntityKind, transform: Transform) -> Result<Arc<Entity>> {
        let entity = Entity::new(self.next_entity_id(), kind, transform);
        self.add_entity(entity)
    }

    /// Add a prepared entity and start tracking it with its default protocol
    pub fn add_entity(&self, entity: Entity) -> Result<Arc<Entity>> {
        let entity = Arc::new(entity);
        self.protocols.add(entity.clone())?;
        self.entities.insert(entity.id, entity.clone());
        debug!(entity_id = entity.id, kind = ?entity.kind, "Entity spawned");
        Ok(entity)
    }

    /// Switch the protocol an entity is tracked with
    pub fn set_entity_protocol(
        &self,
        entity_id: EntityId,
        protocol: EntityProtocolType,
    ) -> Result<bool> {
        let Some(entity) = self.entity(entity_id) else {
            return Ok(false);
        };
        self.protocols.add_with_protocol(entity, protocol)?;
        Ok(true)
    }

    /// Remove an entity; its trackers are sent a destroy on the next tick
    pub fn despawn_entity(&self, entity_id: EntityId) -> bool {
        let removed = self.entities.remove(&entity_id).is_some();
        if removed {
            self.protocols.remove(entity_id);
            debug!(entity_id = entity_id, "Entity despawned");
        }
        removed
    }

    /// Get an entity by id
    pub fn entity(&self, entity_id: EntityId) -> Option<Arc<Entity>> {
        self.entities.get(&entity_id).map(|e| e.value().clone())
    }

    /// Get the number of live entities
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Iterate over all entities
    pub fn for_each_entity<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<Entity>),
    {
        for entity in self.entities.iter() {
            f(entity.value());
        }
    }

    // ============ Tick Loop ============

    /// Run the game world tick loop without a simulation step
    pub async fn run(&self, shutdown_rx: &mut broadcast::Receiver<()>) {
        self.run_with(shutdown_rx, |_, _| {}).await
    }

    /// Run the game world tick loop, calling `simulate` at the start of
    /// every tick before entities are synchronized
    pub async fn run_with<F>(&self, shutdown_rx: &mut broadcast::Receiver<()>, mut simulate: F)
    where
        F: FnMut(&GameWorld, u64),
    {
        info!(
            world_id = self.settings.world_id,
            tick_rate_ms = self.settings.tick_rate_ms,
            "Starting game world"
        );

        // Mark as running
        self.running.store(true, Ordering::SeqCst);
        *self.start_time.write() = Some(Instant::now());
        self.set_state(WorldState::Running);

        // Create tick interval
        let mut tick_interval = interval(Duration::from_millis(self.settings.tick_rate_ms));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Main game loop
        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    if !self.is_running() {
                        break;
                    }
                    let started = Instant::now();
                    self.process_tick(&mut simulate);
                    let elapsed = started.elapsed();
                    if elapsed.as_millis() as u64 > self.settings.tick_rate_ms {
                        warn!(
                            tick = self.tick(),
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Tick took longer than the tick rate"
                        );
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        self.set_state(WorldState::ShuttingDown);
        let ids: Vec<EntityId> = self.entities.iter().map(|e| *e.key()).collect();
        for entity_id in ids {
            self.despawn_entity(entity_id);
        }
        // Flush destroy messages of everything still tracked
        self.protocols.update_trackers(&self.viewers.candidates());

        // Cleanup
        self.running.store(false, Ordering::SeqCst);
        self.set_state(WorldState::Stopped);

        info!(
            total_ticks = self.tick(),
            uptime_secs = self.uptime_secs(),
            "Game world stopped"
        );
    }

    /// Process a single game tick
    pub fn process_tick<F>(&self, simulate: &mut F) -> TickSummary
    where
        F: FnMut(&GameWorld, u64),
    {
        let tick_num = self.tick.fetch_add(1, Ordering::SeqCst);

        // 1. Advance the simulation
        simulate(self, tick_num);

        // 2. Reconcile trackers against this tick's viewers
        let candidates = self.viewers.candidates();
        let summary = self.protocols.update_trackers(&candidates);

        // Log periodically
        if tick_num % 1000 == 0 {
            debug!(
                tick = tick_num,
                entities = self.entity_count(),
                viewers = candidates.len(),
                spawned = summary.spawned,
                despawned = summary.despawned,
                updates = summary.updates,
                "Game tick milestone"
            );
        }

        summary
    }

    /// Get world info as a string
    pub fn info(&self) -> String {
        format!(
            "World {} ({}) - {} entities - Tick {} - Uptime {}s",
            self.settings.world_id,
            self.settings.name,
            self.entity_count(),
            self.tick(),
            self.uptime_secs()
        )
    }
}

impl std::fmt::Debug for GameWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameWorld")
            .field("settings", &self.settings)
            .field("state", &self.state())
            .field("tick", &self.tick())
            .field("running", &self.is_running())
            .field("entities", &self.entity_count())
            .field("tracked", &self.protocols.len())
            .field("uptime_secs", &self.uptime_secs())
            .finish()
    }
}
