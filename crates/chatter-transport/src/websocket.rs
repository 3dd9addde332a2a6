//! WebSocket connection over axum.
//!
//! Text frames carry JSON events, binary frames carry length-prefixed
//! MessagePack. Replies use whichever encoding the client last sent.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::BytesMut;
use chatter_protocol::{codec, Encoding, InboundEvent, OutboundEvent, WireFrame};
use std::net::SocketAddr;
use tracing::{debug, trace, warn};

use crate::traits::{Connection, TransportError};

/// Default maximum inbound message size (64 KiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// An upgraded WebSocket.
pub struct WsConnection {
    socket: WebSocket,
    remote_addr: Option<SocketAddr>,
    encoding: Encoding,
    read_buffer: BytesMut,
    max_message_size: usize,
    is_open: bool,
}

impl WsConnection {
    /// Wrap an upgraded socket.
    #[must_use]
    pub fn new(socket: WebSocket, max_message_size: usize) -> Self {
        Self {
            socket,
            remote_addr: None,
            encoding: Encoding::default(),
            read_buffer: BytesMut::with_capacity(4096),
            max_message_size,
            is_open: true,
        }
    }

    /// Record the peer address.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }
}

/// Reject inbound messages larger than `max`.
fn check_size(size: usize, max: usize) -> Result<(), TransportError> {
    if size > max {
        warn!("Message too large: {} bytes (max: {})", size, max);
        return Err(TransportError::MessageTooLarge { size, max });
    }
    Ok(())
}

/// Append a binary slice to the read buffer.
///
/// Partial frames accumulate across messages, so the limit applies to the
/// buffered total rather than to each slice.
fn buffer_binary(buffer: &mut BytesMut, data: &[u8], max: usize) -> Result<(), TransportError> {
    check_size(buffer.len() + data.len(), max)?;
    buffer.extend_from_slice(data);
    Ok(())
}

fn to_message(frame: WireFrame) -> Message {
    match frame {
        WireFrame::Text(text) => Message::Text(text),
        WireFrame::Binary(data) => Message::Binary(data.to_vec()),
    }
}

#[async_trait]
impl Connection for WsConnection {
    async fn recv(&mut self) -> Result<Option<InboundEvent>, TransportError> {
        loop {
            // Drain complete binary frames before reading more.
            if let Some(event) = codec::decode_from(&mut self.read_buffer)? {
                return Ok(Some(event));
            }

            let Some(message) = self.socket.recv().await else {
                debug!("WebSocket stream ended");
                self.is_open = false;
                return Ok(None);
            };

            match message {
                Ok(Message::Text(text)) => {
                    check_size(text.len(), self.max_message_size)?;
                    self.encoding = Encoding::Json;
                    trace!(bytes = text.len(), "Text frame");
                    return Ok(Some(codec::decode_json(&text)?));
                }
                Ok(Message::Binary(data)) => {
                    buffer_binary(&mut self.read_buffer, &data, self.max_message_size)?;
                    self.encoding = Encoding::MessagePack;
                    trace!(bytes = data.len(), buffered = self.read_buffer.len(), "Binary frame");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // Pings are answered by the WebSocket layer.
                }
                Ok(Message::Close(_)) => {
                    debug!("Received close frame");
                    self.is_open = false;
                    return Ok(None);
                }
                Err(e) => {
                    self.is_open = false;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }

    async fn send(&mut self, event: &OutboundEvent) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }

        let frame = codec::encode_as(event, self.encoding)?;
        self.socket.send(to_message(frame)).await.map_err(|e| {
            self.is_open = false;
            TransportError::SendFailed(e.to_string())
        })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.is_open {
            return Ok(());
        }
        self.is_open = false;

        self.socket
            .send(Message::Close(None))
            .await
            .map_err(|e| TransportError::SendFailed(format!("Failed to close: {}", e)))
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.map(|addr| addr.to_string())
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}
