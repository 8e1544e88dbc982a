//! Wire protocol: JSON `{type, data}` envelopes exchanged over a duplex connection.
//!
//! [`Message`] is the wire unit. [`MessageType`] enumerates every tag the hub
//! and clients understand; the typed payloads in [`payloads`] describe the
//! `data` shape of each one.
//!
//! ```rust
//! use simrelay::protocol::{Message, MessageType};
//!
//! let message = Message::decode(r#"{"type":"heartbeat","data":{"timestamp":1}}"#).unwrap();
//! assert_eq!(message.message_type(), Some(MessageType::Heartbeat));
//! ```

mod message;
mod message_type;
pub mod payloads;

pub use message::Message;
pub use message_type::MessageType;
pub use payloads::ErrorCode;
