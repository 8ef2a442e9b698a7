//! # parley-protocol
//!
//! Wire events for the Parley chat server.
//!
//! Clients and the server exchange named events. Text WebSocket frames carry
//! JSON, binary frames carry length-prefixed MessagePack; both encode the same
//! adjacently tagged shape:
//!
//! ```json
//! {"event": "chat message", "data": {"text": "hi", "roomId": "lobby"}}
//! ```
//!
//! ## Events
//!
//! - `register` / `registration_success` / `username_error` - Claiming a display name
//! - `user_list` - Presence snapshot pushed to everyone
//! - `chat message` - Chat utterances, broadcast or addressed to a room
//! - `join_room` / `room_joined` - Room addressing
//! - `message_read` / `message_read_receipt` - Read receipts
//!
//! ## Example
//!
//! ```rust
//! use parley_protocol::{codec, ClientEvent};
//!
//! let event: ClientEvent = codec::decode_text(r#"{"event":"register","data":"alice"}"#).unwrap();
//! assert_eq!(event, ClientEvent::Register("alice".into()));
//! ```

pub mod codec;
pub mod events;

pub use codec::{decode, decode_text, encode, encode_text, ProtocolError};
pub use events::{
    ChatPayload, ClientEvent, MessageStatus, ReadReceipt, Registration, ServerEvent,
    StampedMessage, UserInfo,
};
