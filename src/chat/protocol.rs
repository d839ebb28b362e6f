//! # Chat Wire Protocol
//!
//! JSON message shapes exchanged over `/ws/chat`.
//!
//! ## Message Format:
//! - **Client → Server**: `{"message": "...", "generate_speech": bool}`
//!   (`generate_speech` optional, defaults to false)
//! - **Server → Client**: `{"type": "system"|"bot"|"error", "message": "..."}`
//!
//! Synthesized speech is delivered as a separate binary frame, not JSON.

use serde::{Deserialize, Serialize};

/// Error text sent when an inbound message does not parse as the expected
/// JSON shape.
pub const INVALID_JSON: &str = "Invalid JSON format";

/// System greeting sent once after a successful connection.
pub const GREETING: &str = "Connected to chatbot server";

/// Inbound chat message from the client.
///
/// Unknown fields are rejected so malformed payloads surface as protocol
/// errors instead of being silently half-read.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientMessage {
    /// User's chat text
    pub message: String,

    /// When true, the reply is also synthesized and pushed as binary PCM
    #[serde(default)]
    pub generate_speech: bool,
}

/// Outbound chat message to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Connection lifecycle notices
    System { message: String },

    /// Generated bot reply
    Bot { message: String },

    /// Recoverable protocol or processing errors
    Error { message: String },
}

impl ServerMessage {
    pub fn system(message: impl Into<String>) -> Self {
        ServerMessage::System {
            message: message.into(),
        }
    }

    pub fn bot(message: impl Into<String>) -> Self {
        ServerMessage::Bot {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// Serialize for the wire. The shapes above cannot fail to serialize,
    /// so this is infallible for callers.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            "{\"type\":\"error\",\"message\":\"internal serialization error\"}".to_string()
        })
    }
}
