//! Connection lifecycle and event routing.
//!
//! The hub owns the presence registry and the broadcaster for the lifetime
//! of the server. A connection moves through `Pending → Admitted → Closed`:
//!
//! - [`Hub::open`] creates a pending session for an identity the gatekeeper
//!   already verified.
//! - [`Hub::join`] admits it: registry entry, outbox, roster broadcast.
//! - [`Hub::leave`] closes it: registry removal, roster broadcast.
//!
//! Join and leave run under one membership lock that spans "mutate, snapshot,
//! publish", so rosters are published in mutation order and the last roster
//! each client receives reflects the latest join or leave.

use crate::broadcast::{
    Audience, Broadcaster, DeliveryReport, EventReceiver, DEFAULT_OUTBOX_CAPACITY,
};
use crate::dispatch::{Dispatcher, Publication};
use crate::identity::{ConnectionId, IdentityClaim};
use crate::registry::{PresenceEntry, PresenceRegistry, RegistryError};
use crate::relay::{MessageRelay, RelayError, DEFAULT_MAX_CONTENT_LENGTH};
use crate::store::MessageStore;
use chatter_protocol::{InboundEvent, OutboundEvent};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Hub errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    /// Registry invariant violated.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A send request failed.
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// `join` on a session that is not pending.
    #[error("Session is {0:?}, expected Pending")]
    NotPending(SessionState),

    /// An event from a session that is not admitted.
    #[error("Session is {0:?}, expected Admitted")]
    NotAdmitted(SessionState),
}

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Per-connection outbox capacity.
    pub outbox_capacity: usize,
    /// Maximum chat message length, in characters.
    pub max_content_length: usize,
    /// Whether to send "joined"/"left" notifications.
    pub announce_presence: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            announce_presence: true,
        }
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Admitted,
    Closed,
}

/// Immutable per-connection context passed to every handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    id: ConnectionId,
    identity: Arc<IdentityClaim>,
}

impl ConnectionContext {
    /// Create a context.
    #[must_use]
    pub fn new(id: ConnectionId, identity: IdentityClaim) -> Self {
        Self {
            id,
            identity: Arc::new(identity),
        }
    }

    /// Connection id.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Verified identity.
    #[must_use]
    pub fn identity(&self) -> &IdentityClaim {
        &self.identity
    }
}

/// One connection's lifecycle instance.
#[derive(Debug)]
pub struct Session {
    context: ConnectionContext,
    state: SessionState,
    events: Option<EventReceiver>,
}

impl Session {
    /// Connection context.
    #[must_use]
    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }

    /// Connection id.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        self.context.id()
    }

    /// Verified identity.
    #[must_use]
    pub fn identity(&self) -> &IdentityClaim {
        self.context.identity()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Wait for the next event addressed to this connection.
    ///
    /// Returns `None` once the session is no longer admitted.
    pub async fn recv(&mut self) -> Option<Arc<OutboundEvent>> {
        match self.events.as_mut() {
            Some(events) => events.recv().await,
            None => None,
        }
    }

    /// Take the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<OutboundEvent>> {
        self.events.as_mut().and_then(|events| events.try_recv().ok())
    }
}

/// Presence and broadcast engine.
pub struct Hub {
    registry: PresenceRegistry,
    broadcaster: Broadcaster,
    dispatcher: Dispatcher,
    config: HubConfig,
    membership: Mutex<()>,
}

impl Hub {
    /// Create a hub with default configuration.
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self::with_config(store, HubConfig::default())
    }

    /// Create a hub with custom configuration.
    #[must_use]
    pub fn with_config(store: Arc<dyn MessageStore>, config: HubConfig) -> Self {
        info!("Creating hub with config: {:?}", config);
        let relay = MessageRelay::with_max_content_length(store, config.max_content_length);
        Self {
            registry: PresenceRegistry::new(),
            broadcaster: Broadcaster::with_capacity(config.outbox_capacity),
            dispatcher: Dispatcher::new(relay),
            config,
            membership: Mutex::new(()),
        }
    }

    /// Start a pending session for a verified identity.
    #[must_use]
    pub fn open(&self, identity: IdentityClaim) -> Session {
        let context = ConnectionContext::new(ConnectionId::generate(), identity);
        debug!(connection = %context.id(), user = %context.identity().name(), "Session pending");
        Session {
            context,
            state: SessionState::Pending,
            events: None,
        }
    }

    /// Admit a pending session.
    ///
    /// Registers the presence entry, attaches the outbox, then publishes the
    /// new roster to everyone and a join notice to everyone else.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotPending`] if the session was already admitted
    /// or closed, or [`HubError::Registry`] if its id is already registered.
    pub async fn join(&self, session: &mut Session) -> Result<(), HubError> {
        if session.state != SessionState::Pending {
            return Err(HubError::NotPending(session.state));
        }

        let id = session.id().clone();
        let name = session.identity().name().to_string();
        let _membership = self.membership.lock().await;

        if let Err(e) = self.registry.add(id.clone(), session.identity().clone()) {
            error!(connection = %id, error = %e, "Admission failed");
            return Err(e.into());
        }
        session.events = Some(self.broadcaster.attach(id.clone()));
        session.state = SessionState::Admitted;

        self.publish_roster();
        if self.config.announce_presence {
            self.broadcaster
                .publish(OutboundEvent::joined(&name), &Audience::AllExcept(id.clone()));
        }

        info!(connection = %id, user = %name, online = self.registry.len(), "User connected");
        Ok(())
    }

    /// Close a session.
    ///
    /// Idempotent. A pending session closes without touching the registry.
    pub async fn leave(&self, session: &mut Session) {
        let previous = session.state;
        session.state = SessionState::Closed;
        session.events = None;

        if previous == SessionState::Admitted {
            self.disconnect(session.id()).await;
        }
    }

    /// Remove a connection and announce the new roster.
    ///
    /// Disconnecting an id that is not registered is a no-op and publishes
    /// nothing.
    pub async fn disconnect(&self, connection_id: &ConnectionId) -> Option<PresenceEntry> {
        let _membership = self.membership.lock().await;

        self.broadcaster.detach(connection_id);
        let entry = self.registry.remove(connection_id)?;

        self.publish_roster();
        if self.config.announce_presence {
            self.broadcaster
                .publish(OutboundEvent::left(entry.identity.name()), &Audience::All);
        }

        info!(
            connection = %connection_id,
            user = %entry.identity.name(),
            online = self.registry.len(),
            "User disconnected"
        );
        Some(entry)
    }

    /// Handle an inbound event from an admitted session.
    ///
    /// Rejected and failed sends are logged here and returned to the caller;
    /// they are never reported to other clients.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotAdmitted`] for sessions that are not admitted
    /// and [`HubError::Relay`] when a message is rejected or not persisted.
    pub async fn dispatch(
        &self,
        session: &Session,
        event: InboundEvent,
    ) -> Result<DeliveryReport, HubError> {
        if session.state != SessionState::Admitted {
            warn!(
                connection = %session.id(),
                state = ?session.state,
                "Event from non-admitted session"
            );
            return Err(HubError::NotAdmitted(session.state));
        }

        let kind = event.kind();
        let publications = match self.dispatcher.handle(session.context(), event).await {
            Ok(publications) => publications,
            Err(RelayError::Validation(e)) => {
                debug!(connection = %session.id(), error = %e, "Message rejected");
                return Err(HubError::Relay(RelayError::Validation(e)));
            }
            Err(RelayError::Persistence(e)) => {
                error!(connection = %session.id(), error = %e, "Error in sendMessage");
                return Err(HubError::Relay(RelayError::Persistence(e)));
            }
        };

        let mut report = DeliveryReport::default();
        for publication in publications {
            let delivered = self.publish(publication);
            report.delivered += delivered.delivered;
            report.dropped += delivered.dropped;
        }

        debug!(
            connection = %session.id(),
            event = %kind,
            delivered = report.delivered,
            "Dispatched"
        );
        Ok(report)
    }

    /// Apply a publication.
    pub fn publish(&self, publication: Publication) -> DeliveryReport {
        self.broadcaster
            .publish(publication.event, &publication.audience)
    }

    /// Current roster.
    #[must_use]
    pub fn roster(&self) -> Vec<String> {
        self.registry.snapshot()
    }

    /// Number of admitted connections.
    #[must_use]
    pub fn online(&self) -> usize {
        self.registry.len()
    }

    /// The presence registry.
    #[must_use]
    pub fn registry(&self) -> &PresenceRegistry {
        &self.registry
    }

    fn publish_roster(&self) {
        let roster = self.registry.snapshot();
        self.broadcaster
            .publish(OutboundEvent::UpdateUsers(roster), &Audience::All);
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("online", &self.registry.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
