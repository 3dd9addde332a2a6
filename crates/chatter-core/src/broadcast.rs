//! Broadcast coordination.
//!
//! Every admitted connection owns a bounded outbox. Publishing walks the
//! current recipients and does a non-blocking `try_send` into each outbox,
//! so one slow or dead connection can never hold up the others. Delivery is
//! at most once: a full or closed outbox drops the event for that recipient.

use crate::identity::ConnectionId;
use chatter_protocol::OutboundEvent;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace, warn};

/// Default per-connection outbox capacity.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// Receiving half of a connection's outbox.
pub type EventReceiver = mpsc::Receiver<Arc<OutboundEvent>>;

/// Who should receive a publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every admitted connection.
    All,
    /// Every admitted connection except one (typically the originator).
    AllExcept(ConnectionId),
}

impl Audience {
    /// Whether the audience includes the given connection.
    #[must_use]
    pub fn includes(&self, connection_id: &ConnectionId) -> bool {
        match self {
            Audience::All => true,
            Audience::AllExcept(excluded) => excluded != connection_id,
        }
    }
}

/// Outcome of a single publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Recipients whose outbox accepted the event.
    pub delivered: usize,
    /// Recipients that were skipped because their outbox was full or closed.
    pub dropped: usize,
}

/// Fans events out to admitted connections.
#[derive(Debug)]
pub struct Broadcaster {
    recipients: DashMap<ConnectionId, mpsc::Sender<Arc<OutboundEvent>>>,
    outbox_capacity: usize,
}

impl Broadcaster {
    /// Create a broadcaster with the default outbox capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_OUTBOX_CAPACITY)
    }

    /// Create a broadcaster with a specific outbox capacity.
    #[must_use]
    pub fn with_capacity(outbox_capacity: usize) -> Self {
        Self {
            recipients: DashMap::new(),
            outbox_capacity: outbox_capacity.max(1),
        }
    }

    /// Attach a connection, returning the receiving half of its outbox.
    ///
    /// Attaching an id that is already attached replaces its outbox; the
    /// previous receiver sees its channel close.
    pub fn attach(&self, connection_id: ConnectionId) -> EventReceiver {
        let (tx, rx) = mpsc::channel(self.outbox_capacity);
        if self.recipients.insert(connection_id.clone(), tx).is_some() {
            warn!(connection = %connection_id, "Replaced existing outbox");
        }
        debug!(connection = %connection_id, "Recipient attached");
        rx
    }

    /// Detach a connection. Returns `true` if it was attached.
    pub fn detach(&self, connection_id: &ConnectionId) -> bool {
        let removed = self.recipients.remove(connection_id).is_some();
        if removed {
            debug!(connection = %connection_id, "Recipient detached");
        }
        removed
    }

    /// Deliver an event to every recipient in the audience.
    ///
    /// All recipients share the same event value. Failures are logged and
    /// counted, never returned.
    pub fn publish(&self, event: OutboundEvent, audience: &Audience) -> DeliveryReport {
        let kind = event.kind();
        let event = Arc::new(event);
        let mut report = DeliveryReport::default();

        for recipient in self.recipients.iter() {
            if !audience.includes(recipient.key()) {
                continue;
            }

            match recipient.value().try_send(Arc::clone(&event)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        connection = %recipient.key(),
                        event = %kind,
                        "Outbox full, dropping event"
                    );
                    report.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(
                        connection = %recipient.key(),
                        event = %kind,
                        "Outbox closed, dropping event"
                    );
                    report.dropped += 1;
                }
            }
        }

        trace!(
            event = %kind,
            delivered = report.delivered,
            dropped = report.dropped,
            "Published"
        );
        report
    }

    /// Number of attached recipients.
    #[cfg(test)]
    pub(crate) fn recipient_count(&self) -> usize {
        self.recipients.len()
    }

    /// Check if a connection is attached.
    #[cfg(test)]
    pub(crate) fn is_attached(&self, connection_id: &ConnectionId) -> bool {
        self.recipients.contains_key(connection_id)
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}
