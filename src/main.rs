//! Entity Sync Server
//!
//! Runs a game world whose entities are tracked by and synchronized to a set
//! of simulated players. Entities and players wander around the origin so the
//! tick loop exercises spawns, delta moves, teleports, metadata and destroys.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use glam::DVec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use entity_sync::config::{DemoConfig, ServerConfig};
use entity_sync::game::entity::{EntityKind, Transform};
use entity_sync::game::sync::parameters;
use entity_sync::game::viewer::PlayerId;
use entity_sync::game::world::GameWorld;
use entity_sync::protocol::messages::Message;
use entity_sync::state::AppState;
use entity_sync::VERSION;

/// Mob types the demo picks from
const DEMO_MOB_TYPES: [i32; 3] = [54, 51, 90];

/// Object type of a dropped item
const DEMO_OBJECT_TYPE: u8 = 2;

/// Id of the first simulated player
const FIRST_PLAYER_ID: PlayerId = 1000;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    dotenv::dotenv().ok();

    // Initialize logging
    init_logging();

    info!("Entity Sync Server v{}", VERSION);

    // Load configuration
    let config = ServerConfig::load().await?;
    info!(
        "Configuration loaded from: {}",
        config.config_path.display()
    );

    // Build the parameter tables before the first tick needs them
    parameters::init();

    // Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let state = Arc::new(AppState::new(config.clone(), shutdown_tx.clone()));
    info!("Application state initialized");

    populate_world(&state.world, &config.demo)?;
    let receivers = connect_players(&state, &config.demo)?;

    // Drain every player's outbound queue
    let mut drain_handles = Vec::with_capacity(receivers.len());
    for (player_id, rx) in receivers {
        drain_handles.push(tokio::spawn(drain_messages(player_id, rx)));
    }

    // Start the game world tick
    let world_state = state.clone();
    let mut world_shutdown_rx = shutdown_tx.subscribe();
    let world_handle = tokio::spawn(async move {
        let mut rng = StdRng::from_entropy();
        let players: Vec<PlayerId> = world_state.player_ids();
        let radius = world_state.config.demo.radius;
        world_state
            .world
            .run_with(&mut world_shutdown_rx, |world, tick| {
                simulate(world, &world_state, &players, radius, tick, &mut rng)
            })
            .await;
    });

    info!("Server startup complete!");
    info!(
        world = %state.world.info(),
        players = state.connections.count(),
        "World {} is running",
        config.world_id
    );

    // Wait for shutdown signal
    wait_for_shutdown(shutdown_tx.clone()).await;

    info!("Shutting down server...");
    let _ = world_handle.await;

    // Closing the connections ends every drain task
    for player_id in state.player_ids() {
        state.disconnect_player(player_id);
    }
    for handle in drain_handles {
        let _ = handle.await;
    }

    info!("Server shutdown complete. Goodbye!");
    Ok(())
}

/// Initialize the logging/tracing system
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,entity_sync=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();
}

/// Spawn the demo entities at random positions
fn populate_world(world: &GameWorld, demo: &DemoConfig) -> Result<()> {
    let mut rng = StdRng::from_entropy();
    for _ in 0..demo.entities {
        let kind = match rng.gen_range(0..4) {
            0 => EntityKind::Insentient {
                mob_type: DEMO_MOB_TYPES[rng.gen_range(0..DEMO_MOB_TYPES.len())],
            },
            1 => EntityKind::Slime,
            2 => EntityKind::Living {
                mob_type: DEMO_MOB_TYPES[rng.gen_range(0..DEMO_MOB_TYPES.len())],
            },
            _ => EntityKind::Object {
                object_type: DEMO_OBJECT_TYPE,
            },
        };
        let position = random_position(&mut rng, demo.radius);
        let entity = world.spawn_entity(kind, Transform::at(position))?;
        debug!(entity_id = entity.id, kind = ?kind, "Demo entity spawned");
    }
    info!(entities = world.entity_count(), "Demo world populated");
    Ok(())
}

/// Connect the simulated players
fn connect_players(
    state: &AppState,
    demo: &DemoConfig,
) -> Result<Vec<(PlayerId, mpsc::Receiver<Arc<Message>>)>> {
    let mut rng = StdRng::from_entropy();
    let mut receivers = Vec::with_capacity(demo.viewers as usize);
    for i in 0..demo.viewers {
        let player_id = FIRST_PLAYER_ID + i;
        let (_session, rx) =
            state.connect_player(player_id, random_position(&mut rng, demo.radius))?;
        receivers.push((player_id, rx));
    }
    Ok(receivers)
}

/// One simulation step: wander entities and players, hurt and heal mobs,
/// and now and then strike lightning
fn simulate(
    world: &GameWorld,
    state: &AppState,
    players: &[PlayerId],
    radius: f64,
    tick: u64,
    rng: &mut StdRng,
) {
    world.for_each_entity(|entity| {
        if entity.controller().is_some() || entity.kind == EntityKind::Lightning {
            return;
        }
        // Mostly small steps, sometimes a jump too far for a relative move
        let step = if rng.gen_bool(0.01) { 12.0 } else { 0.3 };
        let delta = DVec3::new(rng.gen_range(-step..=step), 0.0, rng.gen_range(-step..=step));
        let position =
            (entity.position() + delta).clamp(DVec3::splat(-radius), DVec3::splat(radius));
        entity.update_transform(|transform| {
            transform.velocity = position - transform.position;
            transform.position = position;
            transform.rotation.y = (transform.rotation.y + rng.gen_range(-15.0..=15.0)) % 360.0;
            if let Some(head) = transform.head_rotation.as_mut() {
                head.y = transform.rotation.y + rng.gen_range(-30.0..=30.0);
            }
        });
        if entity.kind.is_living() && rng.gen_bool(0.02) {
            entity.set_health(rng.gen_range(1.0..=20.0));
        }
    });

    for &player_id in players {
        let position = random_position(rng, radius);
        if rng.gen_bool(0.05) {
            state.move_player(player_id, position);
        }
    }

    if tick % 200 == 199 {
        let position = random_position(rng, radius);
        match world.spawn_entity(EntityKind::Lightning, Transform::at(position)) {
            Ok(bolt) => debug!(entity_id = bolt.id, "Lightning struck"),
            Err(e) => warn!(error = %e, "Failed to spawn lightning"),
        }
    }
    if tick % 200 == 0 {
        let mut bolts = Vec::new();
        world.for_each_entity(|entity| {
            if entity.kind == EntityKind::Lightning {
                bolts.push(entity.id);
            }
        });
        for bolt in bolts {
            world.despawn_entity(bolt);
        }
    }
}

fn random_position(rng: &mut StdRng, radius: f64) -> DVec3 {
    DVec3::new(
        rng.gen_range(-radius..=radius),
        64.0,
        rng.gen_range(-radius..=radius),
    )
}

/// Consume a player's messages until its connection closes
async fn drain_messages(player_id: PlayerId, mut rx: mpsc::Receiver<Arc<Message>>) {
    let mut counts: HashMap<&'static str, u64> = HashMap::new();
    while let Some(message) = rx.recv().await {
        *counts.entry(message.name()).or_default() += 1;
        if message.is_spawn() {
            debug!(player_id = player_id, message = message.name(), "Entity spawned for player");
        }
    }
    let mut summary: Vec<(&str, u64)> = counts.into_iter().collect();
    summary.sort_unstable();
    info!(player_id = player_id, messages = ?summary, "Player connection closed");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn wait_for_shutdown(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    // Signal all tasks to shut down
    let _ = shutdown_tx.send(());
}
