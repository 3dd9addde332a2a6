//! # chatter-core
//!
//! The realtime presence and broadcast engine behind Chatter.
//!
//! This crate provides the building blocks:
//!
//! - **Identity** - Verified identity claims and connection ids
//! - **Gatekeeper** - Admission of connection attempts via a credential verifier
//! - **Registry** - Who is online, keyed by live connection
//! - **Broadcaster** - Fan-out of events to admitted connections
//! - **Relay** - Persist-then-broadcast for chat messages
//! - **Hub** - Connection lifecycle and event dispatch
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Gatekeeper  │────▶│     Hub     │────▶│ Broadcaster │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                        │       │
//!                        ▼       ▼
//!              ┌─────────────┐ ┌─────────────┐
//!              │  Registry   │ │ Dispatcher  │──▶ Relay ──▶ MessageStore
//!              └─────────────┘ └─────────────┘
//! ```

pub mod auth;
pub mod broadcast;
pub mod dispatch;
pub mod gatekeeper;
pub mod hub;
pub mod identity;
pub mod registry;
pub mod relay;
pub mod store;

pub use auth::{AuthenticationError, Claims, CredentialVerifier, JwtVerifier};
pub use broadcast::{Audience, Broadcaster, DeliveryReport, EventReceiver};
pub use dispatch::{Dispatcher, Publication};
pub use gatekeeper::{Gatekeeper, Handshake};
pub use hub::{ConnectionContext, Hub, HubConfig, HubError, Session, SessionState};
pub use identity::{ConnectionId, IdentityClaim, UserId};
pub use registry::{PresenceEntry, PresenceRegistry, RegistryError};
pub use relay::{MessageRelay, RelayError, ValidationError};
pub use store::{
    InMemoryMessageStore, InMemoryUserDirectory, MessageStore, StoreError, StoredMessage,
    UserDirectory, UserProfile, DEFAULT_HISTORY_LIMIT,
};
