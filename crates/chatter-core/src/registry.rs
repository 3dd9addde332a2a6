//! Presence registry.
//!
//! The registry is the single source of truth for who is online. It maps
//! each live connection id to the identity admitted on it. Every operation
//! is atomic on its own; callers that need "mutate then snapshot" ordering
//! serialize above this layer (see [`Hub`](crate::Hub)).

use crate::identity::{ConnectionId, IdentityClaim};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, error};

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The connection id is already registered.
    ///
    /// A correct transport never reuses ids; this indicates a bug.
    #[error("Duplicate connection: {0}")]
    DuplicateConnection(ConnectionId),
}

/// A registry record linking a live connection to an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    /// Connection id.
    pub connection_id: ConnectionId,
    /// Identity admitted on the connection.
    pub identity: IdentityClaim,
    /// Admission order.
    pub sequence: u64,
}

/// Concurrency-safe map of live connections to identities.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: DashMap<ConnectionId, PresenceEntry>,
    next_sequence: AtomicU64,
}

impl PresenceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateConnection`] if the id is already
    /// present. The existing entry is left untouched.
    pub fn add(
        &self,
        connection_id: ConnectionId,
        identity: IdentityClaim,
    ) -> Result<(), RegistryError> {
        match self.entries.entry(connection_id) {
            Entry::Occupied(occupied) => {
                error!(
                    connection = %occupied.key(),
                    "Duplicate connection id in presence registry"
                );
                Err(RegistryError::DuplicateConnection(occupied.key().clone()))
            }
            Entry::Vacant(vacant) => {
                let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
                debug!(connection = %vacant.key(), user = %identity.name(), "Presence: joined");
                let connection_id = vacant.key().clone();
                vacant.insert(PresenceEntry {
                    connection_id,
                    identity,
                    sequence,
                });
                Ok(())
            }
        }
    }

    /// Remove a connection.
    ///
    /// Removing an absent id is a no-op and returns `None`.
    pub fn remove(&self, connection_id: &ConnectionId) -> Option<PresenceEntry> {
        let removed = self.entries.remove(connection_id).map(|(_, entry)| entry);
        if removed.is_some() {
            debug!(connection = %connection_id, "Presence: left");
        }
        removed
    }

    /// Display names of everyone online, in admission order.
    ///
    /// A user with several connections appears once per connection.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        let mut present: Vec<(u64, String)> = self
            .entries
            .iter()
            .map(|e| (e.sequence, e.identity.name().to_string()))
            .collect();
        present.sort_unstable_by_key(|(sequence, _)| *sequence);
        present.into_iter().map(|(_, name)| name).collect()
    }

    /// Look up the entry for a connection.
    #[must_use]
    pub fn get(&self, connection_id: &ConnectionId) -> Option<PresenceEntry> {
        self.entries.get(connection_id).map(|e| e.value().clone())
    }

    /// Check if a connection is registered.
    #[must_use]
    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.entries.contains_key(connection_id)
    }

    /// All live connections of a user.
    #[cfg(test)]
    pub(crate) fn connections_of(&self, user_id: &crate::identity::UserId) -> Vec<ConnectionId> {
        self.entries
            .iter()
            .filter(|e| e.identity.user_id() == user_id)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nobody is online.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
