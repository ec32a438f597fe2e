//! Session management module
//!
//! Manages the outbound side of connected clients:
//! - The `Connection` collaborator the synchronization layer sends through
//! - Channel-backed sessions with bounded, non-blocking queues
//! - Thread-safe registry from player id to live connection

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::error::NetworkError;
use crate::game::viewer::PlayerId;
use crate::protocol::messages::Message;

/// A live client connection.
///
/// `send` is fire-and-forget and must never block the caller. Delivery
/// failures are the connection's own concern.
pub trait Connection: Send + Sync {
    /// Queue a message for delivery
    fn send(&self, message: Arc<Message>);
}

/// A connected client session backed by a bounded outbound channel
pub struct Session {
    /// Player this session belongs to
    pub player_id: PlayerId,
    /// Outbound message channel
    outbound_tx: mpsc::Sender<Arc<Message>>,
    /// Whether the session has been closed
    closed: AtomicBool,
    /// Messages accepted by the channel
    sent: AtomicU64,
    /// Messages dropped because the channel was full or closed
    dropped: AtomicU64,
    /// Time of session creation
    pub created_at: Instant,
}

impl Session {
    /// Create a new session with an outbound channel
    pub fn new(player_id: PlayerId, outbound_tx: mpsc::Sender<Arc<Message>>) -> Self {
        Self {
            player_id,
            outbound_tx,
            closed: AtomicBool::new(false),
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    /// Try to queue a message without blocking
    pub fn try_send(&self, message: Arc<Message>) -> Result<(), NetworkError> {
        if self.is_closed() {
            return Err(NetworkError::ConnectionClosed(self.player_id));
        }
        match self.outbound_tx.try_send(message) {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(NetworkError::WriteBufferFull(self.player_id)),
            Err(TrySendError::Closed(_)) => {
                self.closed.store(true, Ordering::SeqCst);
                Err(NetworkError::ConnectionClosed(self.player_id))
            }
        }
    }

    /// Mark the session as closed; further sends are dropped
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(player_id = self.player_id, "Session closed");
        }
    }

    /// Check if the session has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.outbound_tx.is_closed()
    }

    /// Number of messages accepted for delivery
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Number of messages dropped
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Connection for Session {
    fn send(&self, message: Arc<Message>) {
        let name = message.name();
        if let Err(e) = self.try_send(message) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                player_id = self.player_id,
                message = name,
                error = %e,
                "Dropped outbound message"
            );
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("player_id", &self.player_id)
            .field("closed", &self.is_closed())
            .field("sent", &self.sent_count())
            .field("dropped", &self.dropped_count())
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Thread-safe registry of live connections, keyed by player id.
///
/// Tracker sets only hold player ids; connections are resolved here at send
/// time so a disconnected client is never kept alive by an entity.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<PlayerId, Arc<dyn Connection>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a channel-backed session for a player and register it
    pub fn create_session(
        &self,
        player_id: PlayerId,
        capacity: usize,
    ) -> (Arc<Session>, mpsc::Receiver<Arc<Message>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let session = Arc::new(Session::new(player_id, tx));
        self.register(player_id, session.clone());
        info!(player_id = player_id, capacity = capacity, "Session created");
        (session, rx)
    }

    /// Register a connection, replacing any previous one for the player
    pub fn register(&self, player_id: PlayerId, connection: Arc<dyn Connection>) {
        if self.connections.insert(player_id, connection).is_some() {
            debug!(player_id = player_id, "Replaced existing connection");
        }
    }

    /// Look up the live connection of a player
    pub fn get(&self, player_id: PlayerId) -> Option<Arc<dyn Connection>> {
        self.connections.get(&player_id).map(|c| c.value().clone())
    }

    /// Check whether a player has a live connection
    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.connections.contains_key(&player_id)
    }

    /// Remove a player's connection
    pub fn unregister(&self, player_id: PlayerId) -> bool {
        let removed = self.connections.remove(&player_id).is_some();
        if removed {
            info!(player_id = player_id, "Session removed");
        }
        removed
    }

    /// Get the number of live connections
    pub fn count(&self) -> usize {
        self.connections.len()
    }
}
