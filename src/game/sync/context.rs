//! Message fan-out for one reconciliation step

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::trace;

use super::protocol::{Audience, UpdateMessage};
use crate::game::viewer::PlayerId;
use crate::net::session::ConnectionRegistry;
use crate::protocol::messages::Message;

/// Delivers messages to one group of trackers of an entity and, where the
/// message concerns it, to the entity's own controlling client
pub struct EntityUpdateContext<'a> {
    trackers: &'a BTreeSet<PlayerId>,
    controller: Option<PlayerId>,
    connections: &'a ConnectionRegistry,
}

impl<'a> EntityUpdateContext<'a> {
    pub fn new(
        trackers: &'a BTreeSet<PlayerId>,
        controller: Option<PlayerId>,
        connections: &'a ConnectionRegistry,
    ) -> Self {
        Self {
            trackers,
            controller,
            connections,
        }
    }

    /// Send to the controlling client only
    pub fn send_to_self(&self, message: Arc<Message>) {
        if let Some(controller) = self.controller {
            self.deliver(controller, message);
        }
    }

    /// Send to the controlling client, building the message only if there is one
    pub fn send_to_self_with<F>(&self, build: F)
    where
        F: FnOnce() -> Message,
    {
        if self.controller.is_some() {
            self.send_to_self(Arc::new(build()));
        }
    }

    /// Send to every tracker and the controlling client
    pub fn send_to_all(&self, message: Arc<Message>) {
        self.send_to_all_except_self(message.clone());
        if let Some(controller) = self.controller {
            if !self.trackers.contains(&controller) {
                self.deliver(controller, message);
            }
        }
    }

    /// Send to every tracker
    pub fn send_to_all_except_self(&self, message: Arc<Message>) {
        for &tracker in self.trackers {
            self.deliver(tracker, message.clone());
        }
    }

    /// Send to every tracker, building the message only if there are any
    pub fn send_to_all_except_self_with<F>(&self, build: F)
    where
        F: FnOnce() -> Message,
    {
        if !self.trackers.is_empty() {
            self.send_to_all_except_self(Arc::new(build()));
        }
    }

    /// Send an update message to its audience
    pub fn send(&self, update: UpdateMessage) {
        let message = Arc::new(update.message);
        match update.audience {
            Audience::Trackers => self.send_to_all_except_self(message),
            Audience::Everyone => self.send_to_all(message),
        }
    }

    fn deliver(&self, player_id: PlayerId, message: Arc<Message>) {
        match self.connections.get(player_id) {
            Some(connection) => connection.send(message),
            None => trace!(
                player_id = player_id,
                message = message.name(),
                "No live connection, skipping"
            ),
        }
    }
}
