//! Message persistence interfaces.
//!
//! The engine only consumes these traits. Durable implementations live
//! outside this crate; the in-memory versions here back the standalone
//! server and the tests.

use crate::identity::{IdentityClaim, UserId};
use async_trait::async_trait;
use chatter_protocol::Sender;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Persistence errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backing store failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The sender is unknown to the user directory.
    #[error("Unknown user: {0}")]
    UnknownUser(UserId),
}

/// A message as confirmed by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Store-assigned id.
    pub id: u64,
    /// Message text.
    pub content: String,
    /// Author's durable id.
    pub sender: UserId,
    /// Creation time assigned by the store.
    pub created_at: DateTime<Utc>,
}

/// Public profile of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    /// Display name.
    pub name: String,
    /// Avatar reference.
    pub avatar: Option<String>,
}

/// Durable message storage.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message.
    async fn create(&self, content: &str, sender: &UserId) -> Result<StoredMessage, StoreError>;

    /// Resolve the public sender details of a stored message.
    async fn enrich(&self, message: &StoredMessage) -> Result<Sender, StoreError>;
}

/// Lookup of user profiles by durable id.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Find a user's profile.
    async fn profile(&self, user_id: &UserId) -> Result<Option<UserProfile>, StoreError>;
}

/// In-memory user directory.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: DashMap<UserId, UserProfile>,
}

impl InMemoryUserDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a profile.
    pub fn insert(&self, user_id: UserId, profile: UserProfile) {
        self.users.insert(user_id, profile);
    }

    /// Record the name carried by a verified claim, keeping any known avatar.
    pub fn remember(&self, identity: &IdentityClaim) {
        self.users
            .entry(identity.user_id().clone())
            .and_modify(|profile| profile.name = identity.name().to_string())
            .or_insert_with(|| UserProfile {
                name: identity.name().to_string(),
                avatar: None,
            });
    }

    /// Number of known users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Check if the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn profile(&self, user_id: &UserId) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.users.get(user_id).map(|p| p.value().clone()))
    }
}

/// Default number of messages the in-memory store retains.
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// In-memory message store.
///
/// Keeps the most recent `history_limit` messages in creation order; older
/// ones are evicted. Ids keep increasing across evictions.
pub struct InMemoryMessageStore {
    messages: RwLock<VecDeque<StoredMessage>>,
    directory: Arc<dyn UserDirectory>,
    next_id: AtomicU64,
    history_limit: usize,
}

impl InMemoryMessageStore {
    /// Create a store that enriches senders from the given directory.
    #[must_use]
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self::with_history_limit(directory, DEFAULT_HISTORY_LIMIT)
    }

    /// Create a store that retains at most `history_limit` messages.
    #[must_use]
    pub fn with_history_limit(directory: Arc<dyn UserDirectory>, history_limit: usize) -> Self {
        Self {
            messages: RwLock::new(VecDeque::with_capacity(history_limit.min(1024))),
            directory,
            next_id: AtomicU64::new(1),
            history_limit,
        }
    }

    #[cfg(test)]
    pub(crate) async fn history(&self) -> Vec<StoredMessage> {
        self.messages.read().await.iter().cloned().collect()
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.messages.read().await.len()
    }
}

impl std::fmt::Debug for InMemoryMessageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryMessageStore")
            .field("next_id", &self.next_id)
            .field("history_limit", &self.history_limit)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create(&self, content: &str, sender: &UserId) -> Result<StoredMessage, StoreError> {
        let mut messages = self.messages.write().await;
        let message = StoredMessage {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            content: content.to_string(),
            sender: sender.clone(),
            created_at: Utc::now(),
        };
        if self.history_limit == 0 {
            return Ok(message);
        }
        if messages.len() == self.history_limit {
            messages.pop_front();
        }
        messages.push_back(message.clone());
        Ok(message)
    }

    async fn enrich(&self, message: &StoredMessage) -> Result<Sender, StoreError> {
        let profile = self
            .directory
            .profile(&message.sender)
            .await?
            .ok_or_else(|| StoreError::UnknownUser(message.sender.clone()))?;

        Ok(Sender {
            name: profile.name,
            avatar: profile.avatar,
        })
    }
}
