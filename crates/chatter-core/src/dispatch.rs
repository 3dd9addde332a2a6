//! Inbound event dispatch.
//!
//! Each inbound event kind maps to a handler that takes the connection
//! context and the payload and returns the publications it wants made. The
//! handlers never touch a socket or the broadcaster, which keeps them
//! testable without a live connection.

use crate::broadcast::Audience;
use crate::hub::ConnectionContext;
use crate::relay::{MessageRelay, RelayError};
use chatter_protocol::{InboundEvent, OutboundEvent, SendMessage};

/// An event together with the audience that should receive it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    /// Event to publish.
    pub event: OutboundEvent,
    /// Recipients.
    pub audience: Audience,
}

impl Publication {
    /// Publish to every admitted connection.
    #[must_use]
    pub fn to_all(event: OutboundEvent) -> Self {
        Self {
            event,
            audience: Audience::All,
        }
    }

    /// Publish to every admitted connection except the originator.
    #[must_use]
    pub fn to_others(event: OutboundEvent, context: &ConnectionContext) -> Self {
        Self {
            event,
            audience: Audience::AllExcept(context.id().clone()),
        }
    }
}

/// Routes inbound events to their handlers.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    relay: MessageRelay,
}

impl Dispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(relay: MessageRelay) -> Self {
        Self { relay }
    }

    /// Handle one inbound event.
    ///
    /// # Errors
    ///
    /// Returns the relay error when a message is rejected or cannot be
    /// persisted; nothing is published in that case.
    pub async fn handle(
        &self,
        context: &ConnectionContext,
        event: InboundEvent,
    ) -> Result<Vec<Publication>, RelayError> {
        match event {
            InboundEvent::SendMessage(payload) => self.on_send_message(context, payload).await,
            InboundEvent::Typing => Ok(on_typing(context)),
        }
    }

    async fn on_send_message(
        &self,
        context: &ConnectionContext,
        payload: SendMessage,
    ) -> Result<Vec<Publication>, RelayError> {
        let message = self.relay.relay(&payload.content, context.identity()).await?;
        // The sender's own client renders the message from this broadcast.
        Ok(vec![Publication::to_all(OutboundEvent::NewMessage(message))])
    }
}

fn on_typing(context: &ConnectionContext) -> Vec<Publication> {
    vec![Publication::to_others(
        OutboundEvent::UserTyping(context.identity().name().to_string()),
        context,
    )]
}
