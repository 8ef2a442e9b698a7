//! Shared fixtures for Parley benchmarks.

use parley_core::{ConnectionId, Hub, Registry};
use parley_protocol::ServerEvent;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// A registry with `users` registered connections.
pub struct Fixture {
    pub hub: Arc<Hub>,
    pub registry: Registry<Hub>,
    pub connections: Vec<ConnectionId>,
    pub inboxes: Vec<UnboundedReceiver<ServerEvent>>,
}

impl Fixture {
    /// Connect and register `users` clients named `user-0`, `user-1`, ...
    #[must_use]
    pub fn populated(users: usize) -> Self {
        let hub = Arc::new(Hub::new());
        let registry = Registry::new(Arc::clone(&hub));
        let mut connections = Vec::with_capacity(users);
        let mut inboxes = Vec::with_capacity(users);

        for i in 0..users {
            let id = ConnectionId::new(format!("conn-{}", i));
            inboxes.push(hub.connect(id.clone()));
            // Names are distinct, so registration cannot fail.
            let _ = registry.register(&id, &format!("user-{}", i));
            connections.push(id);
        }

        let mut fixture = Self {
            hub,
            registry,
            connections,
            inboxes,
        };
        fixture.drain();
        fixture
    }

    /// Discard everything queued for every connection.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        for inbox in &mut self.inboxes {
            while inbox.try_recv().is_ok() {
                drained += 1;
            }
        }
        drained
    }
}
