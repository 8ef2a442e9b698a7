//! Presence and routing registry.
//!
//! The registry maps connections to registered users, pushes the user list
//! to everyone whenever it changes, and relays chat events to their
//! recipients through a [`ChannelLayer`].

use crate::channel::ChannelLayer;
use crate::connection::ConnectionId;
use crate::message::stamp;
use crate::user::User;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parley_protocol::{
    ChatPayload, ClientEvent, ReadReceipt, ServerEvent, StampedMessage, UserInfo,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Registry errors.
///
/// The display text is what the requesting client receives in its
/// `username_error` notification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Another registered user already holds this exact name.
    #[error("Username already taken")]
    NameTaken(String),

    /// The requested name was empty.
    #[error("Username cannot be empty")]
    EmptyName,
}

/// A registered user plus its position in registration order.
#[derive(Debug)]
struct Registered {
    user: User,
    seq: u64,
}

/// The presence and routing registry.
///
/// Names are claimed through a sharded name index, so the check for a
/// taken name and the insert happen under one entry lock even when events
/// from different connections are handled in parallel.
pub struct Registry<C> {
    /// Users indexed by connection.
    users: DashMap<ConnectionId, Registered>,
    /// Owning connection indexed by display name.
    names: DashMap<String, ConnectionId>,
    /// Registration order counter.
    sequence: AtomicU64,
    /// Where events are sent.
    channel: Arc<C>,
}

impl<C: ChannelLayer> Registry<C> {
    /// Create an empty registry that routes through `channel`.
    #[must_use]
    pub fn new(channel: Arc<C>) -> Self {
        Self {
            users: DashMap::new(),
            names: DashMap::new(),
            sequence: AtomicU64::new(0),
            channel,
        }
    }

    /// The channel layer this registry routes through.
    #[must_use]
    pub fn channel(&self) -> &Arc<C> {
        &self.channel
    }

    /// Dispatch an inbound client event to the matching operation.
    ///
    /// # Errors
    ///
    /// Returns the registration error for a rejected `register`. The
    /// client has already been notified by the time this returns.
    pub fn handle(&self, connection: &ConnectionId, event: ClientEvent) -> Result<(), RegistryError> {
        match event {
            ClientEvent::Register(name) => self.register(connection, &name).map(|_| ()),
            ClientEvent::ChatMessage(payload) => {
                self.route_message(connection, payload);
                Ok(())
            }
            ClientEvent::JoinRoom(room) => {
                self.join_room(connection, &room);
                Ok(())
            }
            ClientEvent::MessageRead(message_id) => {
                self.mark_read(connection, &message_id);
                Ok(())
            }
        }
    }

    /// Register a display name for a connection.
    ///
    /// On success the updated user list goes to every client, then the
    /// requester gets `registration_success`. On failure only the requester
    /// hears about it and nothing changes.
    ///
    /// A connection that is already registered is renamed in place.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::EmptyName`] for an empty name and
    /// [`RegistryError::NameTaken`] if any registered user has exactly
    /// this name (case-sensitive, no trimming).
    pub fn register(&self, connection: &ConnectionId, name: &str) -> Result<UserInfo, RegistryError> {
        if name.is_empty() {
            return Err(self.reject(connection, RegistryError::EmptyName));
        }

        let claimed = match self.names.entry(name.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(connection.clone());
                true
            }
        };
        if !claimed {
            return Err(self.reject(connection, RegistryError::NameTaken(name.to_string())));
        }

        let (user, previous_name) = match self.users.entry(connection.clone()) {
            Entry::Occupied(mut entry) => {
                let registered = entry.get_mut();
                let previous = std::mem::replace(&mut registered.user.username, name.to_string());
                (registered.user.clone(), Some(previous))
            }
            Entry::Vacant(entry) => {
                let user = User::new(connection.clone(), name);
                let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
                entry.insert(Registered {
                    user: user.clone(),
                    seq,
                });
                (user, None)
            }
        };

        if let Some(previous) = previous_name {
            self.names.remove_if(&previous, |_, owner| owner == connection);
            info!(connection = %connection, from = %previous, to = %name, "User renamed");
        } else {
            info!(connection = %connection, username = %name, "User registered");
        }

        self.channel.broadcast(ServerEvent::UserList(self.user_list()));
        self.channel
            .emit(connection, ServerEvent::RegistrationSuccess(user.registration()));

        Ok(user.info())
    }

    /// Stamp and relay a chat message.
    ///
    /// With a room target the message goes to every room member except the
    /// sender. Without one it goes to every connected client, sender
    /// included.
    ///
    /// Messages from unregistered connections are dropped without any
    /// notification; `None` is returned in that case.
    pub fn route_message(
        &self,
        connection: &ConnectionId,
        payload: ChatPayload,
    ) -> Option<StampedMessage> {
        let Some(sender) = self.username(connection) else {
            debug!(connection = %connection, "Dropping message from unregistered connection");
            return None;
        };

        let room = payload.room().map(str::to_owned);
        let message = stamp(payload, &sender, connection);
        let event = ServerEvent::ChatMessage(message.clone());

        let recipients = match room.as_deref() {
            Some(room) => self.channel.broadcast_to_room(room, connection, event),
            None => self.channel.broadcast(event),
        };

        debug!(
            connection = %connection,
            sender = %sender,
            room = room.as_deref().unwrap_or("*"),
            recipients,
            "Routed message"
        );

        Some(message)
    }

    /// Add a connection to a room and confirm it back.
    ///
    /// The room name is not validated and memberships are unlimited.
    pub fn join_room(&self, connection: &ConnectionId, room: &str) {
        self.channel.join(connection, room);
        self.channel
            .emit(connection, ServerEvent::RoomJoined(room.to_string()));

        debug!(connection = %connection, room = %room, "Joined room");
    }

    /// Fan out a read receipt to every client.
    ///
    /// The message ID is passed through as-is.
    pub fn mark_read(&self, connection: &ConnectionId, message_id: &str) {
        self.channel
            .broadcast(ServerEvent::MessageReadReceipt(ReadReceipt {
                message_id: message_id.to_string(),
                read_by: connection.to_string(),
            }));
    }

    /// Remove a disconnected connection.
    ///
    /// If it was registered, the remaining clients receive the updated user
    /// list. Returns the removed user, if any.
    pub fn deregister(&self, connection: &ConnectionId) -> Option<UserInfo> {
        let (_, registered) = self.users.remove(connection)?;
        let user = registered.user;

        self.names
            .remove_if(&user.username, |_, owner| owner == connection);
        self.channel.broadcast(ServerEvent::UserList(self.user_list()));

        info!(connection = %connection, username = %user.username, "User disconnected");
        Some(user.info())
    }

    /// Registered users in registration order.
    #[must_use]
    pub fn user_list(&self) -> Vec<UserInfo> {
        let mut users: Vec<(u64, UserInfo)> = self
            .users
            .iter()
            .map(|entry| (entry.seq, entry.user.info()))
            .collect();
        users.sort_by_key(|(seq, _)| *seq);
        users.into_iter().map(|(_, info)| info).collect()
    }

    /// Get the user registered on a connection.
    #[must_use]
    pub fn user(&self, connection: &ConnectionId) -> Option<User> {
        self.users.get(connection).map(|entry| entry.user.clone())
    }

    /// Check if a connection is registered.
    #[must_use]
    pub fn is_registered(&self, connection: &ConnectionId) -> bool {
        self.users.contains_key(connection)
    }

    /// Number of registered users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Check if nobody is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Forget every user. Nothing is broadcast.
    pub fn clear(&self) {
        self.users.clear();
        self.names.clear();
        info!("Registry cleared");
    }

    fn username(&self, connection: &ConnectionId) -> Option<String> {
        self.users
            .get(connection)
            .map(|entry| entry.user.username.clone())
    }

    fn reject(&self, connection: &ConnectionId, error: RegistryError) -> RegistryError {
        warn!(connection = %connection, error = %error, "Registration rejected");
        self.channel
            .emit(connection, ServerEvent::UsernameError(error.to_string()));
        error
    }
}
