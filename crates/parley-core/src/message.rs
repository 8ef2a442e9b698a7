//! Stamping inbound chat payloads.

use crate::connection::ConnectionId;
use chrono::Utc;
use parley_protocol::events::STAMPED_FIELDS;
use parley_protocol::{ChatPayload, MessageStatus, StampedMessage};

/// Stamp sender details onto a client payload.
///
/// Body, room and any extra client fields are kept as sent, whatever
/// their JSON type. Sender name, sender id, timestamp and status always come
/// from the server, overriding whatever the client put under those keys.
#[must_use]
pub fn stamp(payload: ChatPayload, sender: &str, sender_id: &ConnectionId) -> StampedMessage {
    let ChatPayload { room_id, mut extra } = payload;

    for field in STAMPED_FIELDS {
        extra.remove(field);
    }

    StampedMessage {
        room_id,
        sender: sender.to_string(),
        sender_id: sender_id.to_string(),
        timestamp: Utc::now(),
        status: MessageStatus::Sent,
        extra,
    }
}
