//! Event types exchanged between chat clients and the server.
//!
//! Event names are kept byte-for-byte compatible with existing chat
//! frontends, including the space in `chat message`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields the server stamps onto every outbound chat message.
///
/// Client-supplied values under these keys are discarded when stamping.
pub const STAMPED_FIELDS: [&str; 4] = ["sender", "senderId", "timestamp", "status"];

/// Delivery status of a chat message.
///
/// The server only ever stamps [`MessageStatus::Sent`]; the other values
/// belong to the client's vocabulary and are accepted when decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

/// Key of the message body inside a chat payload.
pub const TEXT_FIELD: &str = "text";

/// Body of an inbound `chat message` event.
///
/// Nothing here is validated. The body lives in `extra` with every other
/// client field, so it is relayed as whatever JSON the client sent: a
/// string, a number, `null`, or missing entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    /// Room to address. Absent or empty means everyone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    /// Every other client-supplied field, the body included.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatPayload {
    /// Create a payload with just a text body.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        let mut extra = Map::new();
        extra.insert(TEXT_FIELD.to_string(), Value::String(text.into()));
        Self {
            room_id: None,
            extra,
        }
    }

    /// The message body as sent.
    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        self.extra.get(TEXT_FIELD)
    }

    /// Address the payload to a room.
    #[must_use]
    pub fn to_room(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    /// The room this payload targets, if any.
    ///
    /// An empty `roomId` counts as no room at all.
    #[must_use]
    pub fn room(&self) -> Option<&str> {
        self.room_id.as_deref().filter(|room| !room.is_empty())
    }
}

/// A chat message after the server has stamped sender details onto it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StampedMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    /// Display name of the sender.
    pub sender: String,
    /// Connection identifier of the sender.
    pub sender_id: String,
    /// When the server accepted the message.
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
    /// Client-supplied fields passed through from the payload, body included.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StampedMessage {
    /// The message body as the sender supplied it.
    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        self.extra.get(TEXT_FIELD)
    }
}

/// One entry of a `user_list` snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Connection identifier.
    pub id: String,
    /// Display name.
    pub username: String,
    /// Always `true` while the user is registered.
    pub online: bool,
}

/// Identity confirmed to a freshly registered connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub id: String,
    pub username: String,
}

/// Read receipt fanned out to every connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub message_id: String,
    /// Connection identifier of the reader.
    pub read_by: String,
}

/// Events a client sends to the server.
///
/// Disconnection is not an event on the wire; the transport reports it by
/// closing the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Claim a display name.
    #[serde(rename = "register")]
    Register(String),

    /// Send a chat message.
    #[serde(rename = "chat message")]
    ChatMessage(ChatPayload),

    /// Join a room.
    #[serde(rename = "join_room")]
    JoinRoom(String),

    /// Mark a message as read.
    #[serde(rename = "message_read")]
    MessageRead(String),
}

impl ClientEvent {
    /// Wire name of the event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Register(_) => "register",
            ClientEvent::ChatMessage(_) => "chat message",
            ClientEvent::JoinRoom(_) => "join_room",
            ClientEvent::MessageRead(_) => "message_read",
        }
    }
}

/// Events the server sends to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Sent once when the socket opens, carrying the connection identifier.
    #[serde(rename = "connected")]
    Connected { id: String },

    /// The requested display name was rejected.
    #[serde(rename = "username_error")]
    UsernameError(String),

    /// Full list of registered users, in registration order.
    #[serde(rename = "user_list")]
    UserList(Vec<UserInfo>),

    /// The requesting connection is now registered.
    #[serde(rename = "registration_success")]
    RegistrationSuccess(Registration),

    /// A stamped chat message.
    #[serde(rename = "chat message")]
    ChatMessage(StampedMessage),

    /// The requesting connection joined a room.
    #[serde(rename = "room_joined")]
    RoomJoined(String),

    /// Someone read a message.
    #[serde(rename = "message_read_receipt")]
    MessageReadReceipt(ReadReceipt),
}

impl ServerEvent {
    /// Wire name of the event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::UsernameError(_) => "username_error",
            ServerEvent::UserList(_) => "user_list",
            ServerEvent::RegistrationSuccess(_) => "registration_success",
            ServerEvent::ChatMessage(_) => "chat message",
            ServerEvent::RoomJoined(_) => "room_joined",
            ServerEvent::MessageReadReceipt(_) => "message_read_receipt",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_event_names() {
        let event: ClientEvent =
            serde_json::from_value(json!({"event": "chat message", "data": {"text": "hi"}}))
                .unwrap();
        assert_eq!(event.name(), "chat message");
        assert_eq!(event, ClientEvent::ChatMessage(ChatPayload::text("hi")));

        let event: ClientEvent =
            serde_json::from_value(json!({"event": "join_room", "data": "lobby"})).unwrap();
        assert_eq!(event, ClientEvent::JoinRoom("lobby".into()));
    }

    #[test]
    fn test_chat_payload_keeps_unknown_fields() {
        let payload: ChatPayload = serde_json::from_value(json!({
            "id": "m-1",
            "text": "hello",
            "roomId": "conn_1",
        }))
        .unwrap();

        assert_eq!(payload.body(), Some(&json!("hello")));
        assert_eq!(payload.room(), Some("conn_1"));
        assert_eq!(payload.extra.get("id"), Some(&json!("m-1")));
    }

    #[test]
    fn test_chat_payload_missing_fields() {
        let payload: ChatPayload = serde_json::from_value(json!({})).unwrap();
        assert!(payload.body().is_none());
        assert!(payload.room().is_none());
    }

    #[test]
    fn test_empty_room_means_broadcast() {
        let payload = ChatPayload::text("hi").to_room("");
        assert!(payload.room().is_none());
    }

    #[test]
    fn test_server_event_shape() {
        let event = ServerEvent::MessageReadReceipt(ReadReceipt {
            message_id: "m-1".into(),
            read_by: "conn_2".into(),
        });
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "event": "message_read_receipt",
                "data": {"messageId": "m-1", "readBy": "conn_2"}
            })
        );
    }

    #[test]
    fn test_stamped_message_shape() {
        let mut extra = Map::new();
        extra.insert("id".into(), json!("m-1"));
        extra.insert("text".into(), json!("hi"));
        let message = StampedMessage {
            room_id: None,
            sender: "alice".into(),
            sender_id: "conn_1".into(),
            timestamp: "2024-01-01T00:00:00Z".parse().unwrap(),
            status: MessageStatus::Sent,
            extra,
        };

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["senderId"], json!("conn_1"));
        assert_eq!(value["status"], json!("sent"));
        assert_eq!(value["id"], json!("m-1"));
        assert_eq!(value["text"], json!("hi"));
        assert!(value.get("roomId").is_none());
    }

    #[test]
    fn test_chat_payload_body_is_opaque() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "chat message",
            "data": {"text": 42, "id": "m-1"}
        }))
        .unwrap();
        let ClientEvent::ChatMessage(payload) = event else {
            panic!("Expected chat message");
        };
        assert_eq!(payload.body(), Some(&json!(42)));

        let payload: ChatPayload =
            serde_json::from_value(json!({"text": {"rich": true}})).unwrap();
        assert_eq!(payload.body(), Some(&json!({"rich": true})));
    }

    #[test]
    fn test_chat_payload_null_body_is_kept() {
        let payload: ChatPayload = serde_json::from_value(json!({"text": null})).unwrap();
        assert_eq!(payload.body(), Some(&Value::Null));
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"text": null})
        );
    }
}
