//! Common types used across Roomchat

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// ID Wrappers
// =============================================================================

macro_rules! id_wrapper {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_wrapper!(
    /// User ID wrapper
    UserId
);
id_wrapper!(
    /// Room ID wrapper
    RoomId
);
id_wrapper!(
    /// Chat message ID wrapper
    MessageId
);
id_wrapper!(
    /// Transport connection ID wrapper (one per live socket)
    ConnectionId
);

// =============================================================================
// Users
// =============================================================================

/// A chat user. The nickname doubles as the sender name on messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub nickname: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, FromRow)]
pub(crate) struct UserRow {
    pub id: Uuid,
    pub nickname: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId(row.id),
            nickname: row.nickname,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// =============================================================================
// Rooms
// =============================================================================

/// A chat room.
///
/// `participant_count` is never stored: every read computes it from the
/// participant rows of the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub owner_id: UserId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<OffsetDateTime>,
    pub participant_count: u64,
}

impl Room {
    /// Whether joining requires a password
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct RoomRow {
    pub id: Uuid,
    pub name: String,
    pub password: Option<String>,
    pub owner_id: Uuid,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
    pub participant_count: i64,
}

impl From<RoomRow> for Room {
    fn from(row: RoomRow) -> Self {
        Self {
            id: RoomId(row.id),
            name: row.name,
            password: row.password,
            owner_id: UserId(row.owner_id),
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
            participant_count: u64::try_from(row.participant_count).unwrap_or(0),
        }
    }
}

/// Data needed to create a room
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub name: String,
    pub password: Option<String>,
    pub owner_id: UserId,
}

/// Partial room update. `password: Some(None)` clears the password.
#[derive(Debug, Clone, Default)]
pub struct RoomUpdate {
    pub name: Option<String>,
    pub password: Option<Option<String>>,
}

// =============================================================================
// Participants
// =============================================================================

/// Durable record that a user has joined a room at least once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub joined_at: OffsetDateTime,
}

// =============================================================================
// Messages
// =============================================================================

/// A stored chat message.
///
/// Append-only: the only field that ever changes after insert is `is_read`,
/// and only from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub room_id: RoomId,
    pub nickname: String,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub is_read: bool,
}

impl ChatMessage {
    /// Build a new message stamped with a fresh id and the current time
    pub fn new(room_id: RoomId, nickname: impl Into<String>, message: impl Into<String>, is_read: bool) -> Self {
        Self {
            id: MessageId::new(),
            room_id,
            nickname: nickname.into(),
            message: message.into(),
            timestamp: OffsetDateTime::now_utc(),
            is_read,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct MessageRow {
    pub id: Uuid,
    pub room_id: Uuid,
    pub nickname: String,
    pub message: String,
    pub timestamp: OffsetDateTime,
    pub is_read: bool,
}

impl From<MessageRow> for ChatMessage {
    fn from(row: MessageRow) -> Self {
        Self {
            id: MessageId(row.id),
            room_id: RoomId(row.room_id),
            nickname: row.nickname,
            message: row.message,
            timestamp: row.timestamp,
            is_read: row.is_read,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_id_wrappers_serialize_transparently() {
        let id = Uuid::new_v4();
        let json = serde_json::to_string(&RoomId(id)).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }

    #[test]
    fn test_room_serialization_hides_password() {
        let now = OffsetDateTime::now_utc();
        let room = Room {
            id: RoomId::new(),
            name: "lobby".to_string(),
            password: Some("secret".to_string()),
            owner_id: UserId::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            participant_count: 3,
        };

        let json = serde_json::to_value(&room).unwrap();
        assert!(json.get("password").is_none());
        assert!(json.get("deletedAt").is_none());
        assert_eq!(json["participantCount"], 3);
        assert!(room.has_password());
    }

    #[test]
    fn test_message_serialization_uses_camel_case() {
        let msg = ChatMessage::new(RoomId::new(), "alice", "hi", false);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["nickname"], "alice");
        assert_eq!(json["isRead"], false);
        assert!(json["timestamp"].is_string());
    }
}
