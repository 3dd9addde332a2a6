//! Message relay: validate, persist, enrich.
//!
//! The relay never publishes on its own; it turns a send request into the
//! public [`ChatMessage`] that the dispatcher then broadcasts.

use crate::identity::IdentityClaim;
use crate::store::{MessageStore, StoreError};
use chatter_protocol::ChatMessage;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Default maximum message length, in characters.
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 4096;

/// Content rejected before reaching the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Content is empty or only whitespace.
    #[error("message content is empty")]
    Empty,

    /// Content exceeds the configured maximum length.
    #[error("message content is {len} characters, maximum is {max}")]
    TooLong { len: usize, max: usize },
}

/// Relay errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// The content was rejected.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The store could not save or enrich the message.
    #[error(transparent)]
    Persistence(#[from] StoreError),
}

/// Bridges send requests to the message store.
#[derive(Clone)]
pub struct MessageRelay {
    store: Arc<dyn MessageStore>,
    max_content_length: usize,
}

impl MessageRelay {
    /// Create a relay with the default content limit.
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self::with_max_content_length(store, DEFAULT_MAX_CONTENT_LENGTH)
    }

    /// Create a relay with a specific content limit.
    #[must_use]
    pub fn with_max_content_length(
        store: Arc<dyn MessageStore>,
        max_content_length: usize,
    ) -> Self {
        Self {
            store,
            max_content_length,
        }
    }

    /// Check content without touching the store.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for empty or oversized content.
    pub fn validate(&self, content: &str) -> Result<(), ValidationError> {
        if content.trim().is_empty() {
            return Err(ValidationError::Empty);
        }
        let len = content.chars().count();
        if len > self.max_content_length {
            return Err(ValidationError::TooLong {
                len,
                max: self.max_content_length,
            });
        }
        Ok(())
    }

    /// Persist a message from `identity` and build its public form.
    ///
    /// The author is always taken from the verified identity.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Validation`] without calling the store if the
    /// content is rejected, or [`RelayError::Persistence`] if the store fails.
    pub async fn relay(
        &self,
        content: &str,
        identity: &IdentityClaim,
    ) -> Result<ChatMessage, RelayError> {
        self.validate(content)?;

        let stored = self.store.create(content, identity.user_id()).await?;
        let sender = self.store.enrich(&stored).await?;

        debug!(user = %identity.name(), message_id = stored.id, "Message persisted");

        Ok(ChatMessage {
            content: stored.content,
            sender,
            created_at: stored.created_at,
        })
    }
}

impl std::fmt::Debug for MessageRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRelay")
            .field("max_content_length", &self.max_content_length)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::identity::UserId;
    use crate::store::{InMemoryMessageStore, InMemoryUserDirectory, StoredMessage};
    use async_trait::async_trait;
    use chatter_protocol::Sender;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store that counts calls and can be told to fail.
    #[derive(Default)]
    pub(crate) struct CountingStore {
        pub(crate) creates: AtomicUsize,
        pub(crate) fail: bool,
    }

    #[async_trait]
    impl MessageStore for CountingStore {
        async fn create(
            &self,
            content: &str,
            sender: &UserId,
        ) -> Result<StoredMessage, StoreError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StoreError::Persistence("database unavailable".into()));
            }
            Ok(StoredMessage {
                id: 1,
                content: content.to_string(),
                sender: sender.clone(),
                created_at: Utc::now(),
            })
        }

        async fn enrich(&self, message: &StoredMessage) -> Result<Sender, StoreError> {
            Ok(Sender {
                name: format!("name-of-{}", message.sender),
                avatar: None,
            })
        }
    }

    fn alice() -> IdentityClaim {
        IdentityClaim::new("u1", "Alice")
    }

    #[tokio::test]
    async fn test_relay_builds_public_message() {
        let directory = Arc::new(InMemoryUserDirectory::new());
        directory.remember(&alice());
        let relay = MessageRelay::new(Arc::new(InMemoryMessageStore::new(directory)));

        let sent_at = Utc::now();
        let message = relay.relay("hello", &alice()).await.unwrap();

        assert_eq!(message.content, "hello");
        assert_eq!(message.sender.name, "Alice");
        assert!(message.created_at >= sent_at);
    }

    #[tokio::test]
    async fn test_author_comes_from_identity() {
        let store = Arc::new(CountingStore::default());
        let relay = MessageRelay::new(store);

        let message = relay.relay("hi", &alice()).await.unwrap();
        assert_eq!(message.sender.name, "name-of-u1");
    }

    #[tokio::test]
    async fn test_whitespace_never_reaches_store() {
        let store = Arc::new(CountingStore::default());
        let relay = MessageRelay::new(Arc::clone(&store) as Arc<dyn MessageStore>);

        for content in ["", "   ", "\n\t "] {
            assert_eq!(
                relay.relay(content, &alice()).await,
                Err(RelayError::Validation(ValidationError::Empty))
            );
        }
        assert_eq!(store.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_too_long_is_rejected() {
        let store = Arc::new(CountingStore::default());
        let relay =
            MessageRelay::with_max_content_length(Arc::clone(&store) as Arc<dyn MessageStore>, 5);

        assert!(relay.relay("héllo", &alice()).await.is_ok());
        assert_eq!(
            relay.relay("hello!", &alice()).await,
            Err(RelayError::Validation(ValidationError::TooLong { len: 6, max: 5 }))
        );
        assert_eq!(store.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_persistence_failure() {
        let store = Arc::new(CountingStore {
            fail: true,
            ..Default::default()
        });
        let relay = MessageRelay::new(store);

        assert!(matches!(
            relay.relay("hello", &alice()).await,
            Err(RelayError::Persistence(StoreError::Persistence(_)))
        ));
    }
}
