//! Event types for the Chatter protocol.
//!
//! Every event travels as an `{"event", "data"}` pair. Inbound events are
//! parsed leniently: extra fields (such as a client-supplied `senderId`) are
//! ignored, and `typing` accepts any payload since the sender is always taken
//! from the connection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event name identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SendMessage,
    Typing,
    NewMessage,
    UserTyping,
    UpdateUsers,
    UserNotification,
}

impl EventKind {
    /// The event name as it appears on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SendMessage => "sendMessage",
            EventKind::Typing => "typing",
            EventKind::NewMessage => "newMessage",
            EventKind::UserTyping => "userTyping",
            EventKind::UpdateUsers => "updateUsers",
            EventKind::UserNotification => "userNotification",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for EventKind {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "sendMessage" => Ok(EventKind::SendMessage),
            "typing" => Ok(EventKind::Typing),
            "newMessage" => Ok(EventKind::NewMessage),
            "userTyping" => Ok(EventKind::UserTyping),
            "updateUsers" => Ok(EventKind::UpdateUsers),
            "userNotification" => Ok(EventKind::UserNotification),
            other => Err(format!("Unknown event: {other}")),
        }
    }
}

/// Payload of a `sendMessage` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessage {
    /// Raw message text.
    pub content: String,
}

/// An event sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
#[serde(try_from = "RawEvent")]
pub enum InboundEvent {
    /// Persist and broadcast a chat message.
    SendMessage(SendMessage),
    /// The sender is typing.
    Typing,
}

impl InboundEvent {
    /// Create a `sendMessage` event.
    #[must_use]
    pub fn send_message(content: impl Into<String>) -> Self {
        InboundEvent::SendMessage(SendMessage {
            content: content.into(),
        })
    }

    /// Get the event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            InboundEvent::SendMessage(_) => EventKind::SendMessage,
            InboundEvent::Typing => EventKind::Typing,
        }
    }
}

/// Untyped `{"event", "data"}` envelope used to parse inbound events.
#[derive(Debug, Deserialize)]
struct RawEvent {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl TryFrom<RawEvent> for InboundEvent {
    type Error = String;

    fn try_from(raw: RawEvent) -> Result<Self, Self::Error> {
        match EventKind::try_from(raw.event.as_str())? {
            EventKind::SendMessage => serde_json::from_value(raw.data)
                .map(InboundEvent::SendMessage)
                .map_err(|e| format!("Invalid sendMessage payload: {e}")),
            EventKind::Typing => Ok(InboundEvent::Typing),
            other => Err(format!("Event {other} is not accepted from clients")),
        }
    }
}

/// Public identity of a message author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    /// Display name.
    pub name: String,
    /// Avatar reference, if the user has one.
    #[serde(
        rename = "profilePic",
        alias = "avatarRef",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub avatar: Option<String>,
}

/// A persisted chat message as broadcast to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message text.
    pub content: String,
    /// Author.
    pub sender: Sender,
    /// When the store created the message.
    pub created_at: DateTime<Utc>,
}

/// An event sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum OutboundEvent {
    /// A persisted chat message.
    NewMessage(ChatMessage),
    /// Display name of a user who is typing.
    UserTyping(String),
    /// Current roster of online display names.
    UpdateUsers(Vec<String>),
    /// Free-text line for transient display.
    UserNotification(String),
}

impl OutboundEvent {
    /// Get the event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            OutboundEvent::NewMessage(_) => EventKind::NewMessage,
            OutboundEvent::UserTyping(_) => EventKind::UserTyping,
            OutboundEvent::UpdateUsers(_) => EventKind::UpdateUsers,
            OutboundEvent::UserNotification(_) => EventKind::UserNotification,
        }
    }

    /// Create a `userNotification` announcing a join.
    #[must_use]
    pub fn joined(name: &str) -> Self {
        OutboundEvent::UserNotification(format!("{name} joined the chat"))
    }

    /// Create a `userNotification` announcing a departure.
    #[must_use]
    pub fn left(name: &str) -> Self {
        OutboundEvent::UserNotification(format!("{name} left the chat"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_send_message_ignores_client_sender_id() {
        let event: InboundEvent = serde_json::from_value(json!({
            "event": "sendMessage",
            "data": { "content": "hello", "senderId": "someone-else" }
        }))
        .unwrap();

        assert_eq!(event, InboundEvent::send_message("hello"));
    }

    #[test]
    fn test_typing_accepts_any_payload() {
        let bare: InboundEvent = serde_json::from_value(json!({ "event": "typing" })).unwrap();
        let named: InboundEvent =
            serde_json::from_value(json!({ "event": "typing", "data": "Alice" })).unwrap();

        assert_eq!(bare, InboundEvent::Typing);
        assert_eq!(named, InboundEvent::Typing);
    }

    #[test]
    fn test_rejects_outbound_and_unknown_events() {
        assert!(serde_json::from_value::<InboundEvent>(json!({ "event": "updateUsers" })).is_err());
        assert!(serde_json::from_value::<InboundEvent>(json!({ "event": "shout" })).is_err());
        assert!(serde_json::from_value::<InboundEvent>(
            json!({ "event": "sendMessage", "data": {} })
        )
        .is_err());
    }

    #[test]
    fn test_new_message_wire_shape() {
        let created_at = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let event = OutboundEvent::NewMessage(ChatMessage {
            content: "hello".into(),
            sender: Sender {
                name: "Alice".into(),
                avatar: Some("alice.png".into()),
            },
            created_at,
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "event": "newMessage",
                "data": {
                    "content": "hello",
                    "sender": { "name": "Alice", "profilePic": "alice.png" },
                    "createdAt": "2024-05-01T12:00:00Z"
                }
            })
        );
    }

    #[test]
    fn test_roster_and_notification_shape() {
        let roster = OutboundEvent::UpdateUsers(vec!["Alice".into(), "Bob".into()]);
        assert_eq!(
            serde_json::to_value(&roster).unwrap(),
            json!({ "event": "updateUsers", "data": ["Alice", "Bob"] })
        );

        assert_eq!(
            OutboundEvent::joined("Bob"),
            OutboundEvent::UserNotification("Bob joined the chat".into())
        );
        assert_eq!(OutboundEvent::left("Bob").kind(), EventKind::UserNotification);
    }

    #[test]
    fn test_event_kind_names() {
        assert_eq!(EventKind::UserTyping.to_string(), "userTyping");
        assert_eq!(EventKind::try_from("typing"), Ok(EventKind::Typing));
        assert!(EventKind::try_from("nope").is_err());
    }
}
