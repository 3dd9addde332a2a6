//! # chatter-transport
//!
//! Transport layer for the Chatter realtime chat engine.
//!
//! - **Handshake** - Pull the bearer token out of an upgrade request
//! - **Connection** - Transport-agnostic send/receive of protocol events
//! - **WebSocket** - The axum WebSocket implementation
//!
//! ```rust,ignore
//! use chatter_transport::Connection;
//!
//! async fn pump(mut conn: impl Connection) {
//!     while let Ok(Some(event)) = conn.recv().await {
//!         // Dispatch event
//!     }
//! }
//! ```

pub mod handshake;
pub mod traits;
pub mod websocket;

pub use handshake::{bearer_token, handshake_from_request};
pub use traits::{Connection, TransportError};
pub use websocket::WsConnection;
