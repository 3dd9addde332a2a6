//! Transport abstraction traits for Chatter.
//!
//! The server drives every connection through [`Connection`], so the session
//! loop does not depend on a particular socket implementation.

use async_trait::async_trait;
use chatter_protocol::{InboundEvent, OutboundEvent, ProtocolError};
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Inbound message exceeds the configured limit.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// A frame could not be encoded or decoded.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl TransportError {
    /// Whether the connection must be dropped after this error.
    ///
    /// Undecodable frames are skipped; everything else ends the session.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::Protocol(ProtocolError::Json(_)))
            && !matches!(self, TransportError::Protocol(ProtocolError::Decode(_)))
    }
}

/// An admitted connection carrying protocol events.
#[async_trait]
pub trait Connection: Send {
    /// Receive the next inbound event.
    ///
    /// Returns `Ok(None)` when the peer closes the connection cleanly.
    /// Implementations must be cancel safe: dropping the future must not lose
    /// a decoded event.
    async fn recv(&mut self) -> Result<Option<InboundEvent>, TransportError>;

    /// Send an event to the peer.
    async fn send(&mut self, event: &OutboundEvent) -> Result<(), TransportError>;

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Get the remote address of the connection, if available.
    fn remote_addr(&self) -> Option<String> {
        None
    }

    /// Check if the connection is still open.
    fn is_open(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_errors_are_not_fatal() {
        let json = serde_json_error();
        assert!(!TransportError::Protocol(ProtocolError::Json(json)).is_fatal());
        assert!(TransportError::Protocol(ProtocolError::FrameTooLarge(1)).is_fatal());
        assert!(TransportError::ConnectionClosed.is_fatal());
        assert!(TransportError::MessageTooLarge { size: 2, max: 1 }.is_fatal());
    }

    fn serde_json_error() -> serde_json::Error {
        chatter_protocol::codec::decode_json::<InboundEvent>("{")
            .err()
            .and_then(|e| match e {
                ProtocolError::Json(inner) => Some(inner),
                _ => None,
            })
            .unwrap()
    }
}
