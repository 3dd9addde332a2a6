//! # Chatter Server
//!
//! HTTP and WebSocket front end for the chat hub: handshake verification,
//! the per-connection session loop, configuration and metrics.

#![warn(clippy::all)]

pub mod config;
pub mod handlers;
pub mod metrics;

pub use config::Config;
pub use handlers::{app, run_connection, run_server, serve, AppState};
