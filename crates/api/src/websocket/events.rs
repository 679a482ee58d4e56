//! WebSocket event types and serialization
//!
//! Defines all client-to-server and server-to-client event types
//! with type-safe serde serialization. Every event is a JSON object tagged
//! by `type`, with camelCase payload fields.

use roomchat_shared::{ChatMessage, ConnectionId, RoomId, UserId};
use serde::{Deserialize, Serialize};

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events sent from client to server
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Open a room on this connection
    JoinRoom {
        room_id: RoomId,
        user_id: UserId,
        /// Set by clients re-emitting their joins after a reconnect.
        /// Informational only.
        #[serde(default, alias = "isReconnect")]
        reconnect_hint: bool,
    },

    /// Close a room on this connection
    LeaveRoom { room_id: RoomId },

    /// Post a message to a room
    SendMessage {
        room_id: RoomId,
        user_id: UserId,
        message: String,
    },

    /// Heartbeat ping to keep connection alive
    Ping,
}

impl ClientEvent {
    /// Reject payloads that parse but carry unusable values
    pub fn validate(&self) -> Result<(), &'static str> {
        match self {
            ClientEvent::SendMessage { message, .. } if message.trim().is_empty() => {
                Err("Message text cannot be empty")
            }
            _ => Ok(()),
        }
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom { .. } => "join-room",
            ClientEvent::LeaveRoom { .. } => "leave-room",
            ClientEvent::SendMessage { .. } => "send-message",
            ClientEvent::Ping => "ping",
        }
    }
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// New message posted to a room (echoed to the sender too)
    ReceiveMessage(ChatMessage),

    /// Durable participant count of a room changed or was re-announced
    RoomUpdate {
        room_id: RoomId,
        participant_count: u64,
    },

    /// Connection acknowledged
    Connected { connection_id: ConnectionId },

    /// Heartbeat response
    Pong,

    /// Error message, sent only to the connection that caused it
    Error { message: String },
}
