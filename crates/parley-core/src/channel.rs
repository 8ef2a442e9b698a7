//! Channel layer for Parley.
//!
//! The registry never talks to sockets directly. It routes through a
//! [`ChannelLayer`], which owns per-connection delivery and room
//! membership. [`Hub`] is the in-process implementation used by the server.

use crate::connection::ConnectionId;
use dashmap::DashMap;
use parley_protocol::ServerEvent;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// A room identifier. Any string a client supplies.
pub type RoomId = String;

/// Send primitives the registry routes through.
///
/// Every method is fire-and-forget: it hands events to outbound queues and
/// returns without waiting for delivery. The returned counts are the
/// number of queues the event was handed to.
pub trait ChannelLayer: Send + Sync {
    /// Send an event to a single connection.
    fn emit(&self, to: &ConnectionId, event: ServerEvent) -> bool;

    /// Send an event to every connected client.
    fn broadcast(&self, event: ServerEvent) -> usize;

    /// Send an event to every member of a room except `except`.
    fn broadcast_to_room(&self, room: &str, except: &ConnectionId, event: ServerEvent) -> usize;

    /// Add a connection to a room.
    fn join(&self, connection: &ConnectionId, room: &str);
}

/// In-process channel layer.
///
/// Each connection gets an unbounded outbound queue. Rooms are sets of
/// connection IDs, created on first join and dropped once empty. Every
/// connection is a member of the room named by its own identifier, so a
/// peer can be addressed directly by sending to its connection ID.
#[derive(Debug, Default)]
pub struct Hub {
    /// Outbound queues indexed by connection.
    connections: DashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>,
    /// Room members indexed by room name.
    rooms: DashMap<RoomId, HashSet<ConnectionId>>,
    /// Rooms each connection belongs to (connection_id -> set of room names).
    memberships: DashMap<ConnectionId, HashSet<RoomId>>,
}

impl Hub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a connection and return the receiving end of its queue.
    ///
    /// Attaching an ID that is already connected replaces its queue.
    pub fn connect(&self, connection: ConnectionId) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(connection.clone(), tx);
        self.join(&connection, connection.as_str());

        debug!(connection = %connection, "Hub: connection attached");
        rx
    }

    /// Detach a connection, dropping its queue and every room membership.
    pub fn disconnect(&self, connection: &ConnectionId) {
        self.connections.remove(connection);

        if let Some((_, rooms)) = self.memberships.remove(connection) {
            for room in &rooms {
                let now_empty = match self.rooms.get_mut(room.as_str()) {
                    Some(mut members) => {
                        members.remove(connection);
                        members.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    self.rooms.remove_if(room.as_str(), |_, members| members.is_empty());
                    trace!(room = %room, "Hub: deleted empty room");
                }
            }
        }

        debug!(connection = %connection, "Hub: connection detached");
    }

    /// Check if a connection is attached.
    #[must_use]
    pub fn is_connected(&self, connection: &ConnectionId) -> bool {
        self.connections.contains_key(connection)
    }

    /// Check if a connection is a member of a room.
    #[must_use]
    pub fn is_member(&self, connection: &ConnectionId, room: &str) -> bool {
        self.rooms
            .get(room)
            .map(|members| members.contains(connection))
            .unwrap_or(false)
    }

    /// Get the member count of a room.
    #[must_use]
    pub fn room_size(&self, room: &str) -> usize {
        self.rooms.get(room).map(|members| members.len()).unwrap_or(0)
    }

    /// Get the rooms a connection belongs to.
    #[must_use]
    pub fn connection_rooms(&self, connection: &ConnectionId) -> Vec<RoomId> {
        self.memberships
            .get(connection)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Get hub statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.connections.len(),
            rooms: self.rooms.len(),
        }
    }

    fn send(&self, to: &ConnectionId, event: ServerEvent) -> bool {
        match self.connections.get(to) {
            // A closed queue means the socket task is already gone.
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

impl ChannelLayer for Hub {
    fn emit(&self, to: &ConnectionId, event: ServerEvent) -> bool {
        trace!(connection = %to, event = event.name(), "Hub: emit");
        self.send(to, event)
    }

    fn broadcast(&self, event: ServerEvent) -> usize {
        let delivered = self
            .connections
            .iter()
            .filter(|entry| entry.value().send(event.clone()).is_ok())
            .count();

        trace!(event = event.name(), recipients = delivered, "Hub: broadcast");
        delivered
    }

    fn broadcast_to_room(&self, room: &str, except: &ConnectionId, event: ServerEvent) -> usize {
        // Snapshot members so no room lock is held while sending.
        let members: Vec<ConnectionId> = match self.rooms.get(room) {
            Some(members) => members.iter().filter(|id| *id != except).cloned().collect(),
            None => return 0,
        };

        let delivered = members
            .iter()
            .filter(|id| self.send(id, event.clone()))
            .count();

        trace!(room = %room, event = event.name(), recipients = delivered, "Hub: room broadcast");
        delivered
    }

    fn join(&self, connection: &ConnectionId, room: &str) {
        if !self.connections.contains_key(connection) {
            debug!(connection = %connection, room = %room, "Hub: join from detached connection ignored");
            return;
        }

        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(connection.clone());
        self.memberships
            .entry(connection.clone())
            .or_default()
            .insert(room.to_string());

        trace!(connection = %connection, room = %room, "Hub: joined room");
    }
}

/// Hub statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubStats {
    /// Number of attached connections.
    pub connections: usize,
    /// Number of non-empty rooms, including each connection's own room.
    pub rooms: usize,
}
