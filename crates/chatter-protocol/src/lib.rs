//! # chatter-protocol
//!
//! Wire event contract for the Chatter realtime chat engine.
//!
//! Clients and the server exchange named events. Browser clients use JSON
//! text frames shaped `{"event": "<kind>", "data": <payload>}`; native
//! clients may send the same events as length-prefixed MessagePack binary
//! frames.
//!
//! ## Events
//!
//! Inbound (client → server):
//! - `sendMessage` - Persist and broadcast a chat message
//! - `typing` - Ephemeral typing indicator
//!
//! Outbound (server → clients):
//! - `newMessage` - A persisted chat message
//! - `userTyping` - Display name of someone typing
//! - `updateUsers` - Full roster of online display names
//! - `userNotification` - Transient join/leave line
//!
//! ## Example
//!
//! ```rust
//! use chatter_protocol::{codec, InboundEvent};
//!
//! let event: InboundEvent =
//!     codec::decode_json(r#"{"event":"sendMessage","data":{"content":"hi"}}"#).unwrap();
//! assert_eq!(event, InboundEvent::send_message("hi"));
//! ```

pub mod codec;
pub mod events;

pub use codec::{decode, encode, Encoding, ProtocolError, WireFrame};
pub use events::{ChatMessage, EventKind, InboundEvent, OutboundEvent, SendMessage, Sender};
