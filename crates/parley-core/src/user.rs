//! Registered chat participants.

use crate::connection::ConnectionId;
use parley_protocol::{Registration, UserInfo};

/// One registered chat participant.
///
/// A user exists only while its connection is registered; there is no
/// offline-but-known state, so `online` is always `true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Connection the user registered from.
    pub id: ConnectionId,
    /// Display name, unique among registered users.
    pub username: String,
    /// Always `true` while the user is registered.
    pub online: bool,
}

impl User {
    /// Create a new online user.
    #[must_use]
    pub fn new(id: ConnectionId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            online: true,
        }
    }

    /// Wire form used in `user_list`.
    #[must_use]
    pub fn info(&self) -> UserInfo {
        UserInfo {
            id: self.id.to_string(),
            username: self.username.clone(),
            online: self.online,
        }
    }

    /// Wire form used in `registration_success`.
    #[must_use]
    pub fn registration(&self) -> Registration {
        Registration {
            id: self.id.to_string(),
            username: self.username.clone(),
        }
    }
}
