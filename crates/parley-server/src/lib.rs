//! # parley-server
//!
//! WebSocket front end for the Parley presence and routing registry.

pub mod config;
pub mod handlers;
pub mod metrics;

pub use config::Config;
pub use handlers::{app, run_server, serve, AppState, WireFormat};
