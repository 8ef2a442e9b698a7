//! # parley-core
//!
//! Presence tracking and message routing for the Parley chat server.
//!
//! This crate provides the building blocks:
//!
//! - **Registry** - Who is online, and where their messages go
//! - **ChannelLayer** - The send primitives the registry routes through
//! - **Hub** - In-process channel layer with per-connection queues and rooms
//! - **Message** - Stamping inbound chat payloads
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Connection │────▶│  Registry   │────▶│     Hub     │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲                                       │
//!        └───────────── outbound queue ──────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use parley_core::{ConnectionId, Hub, Registry};
//!
//! let hub = Arc::new(Hub::new());
//! let registry = Registry::new(Arc::clone(&hub));
//!
//! let alice = ConnectionId::generate();
//! let mut inbox = hub.connect(alice.clone());
//! registry.register(&alice, "alice").unwrap();
//!
//! assert!(inbox.try_recv().is_ok());
//! ```

pub mod channel;
pub mod connection;
pub mod message;
pub mod registry;
pub mod user;

pub use channel::{ChannelLayer, Hub, HubStats, RoomId};
pub use connection::ConnectionId;
pub use message::stamp;
pub use registry::{Registry, RegistryError};
pub use user::User;
