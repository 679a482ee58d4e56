//! Persistence gateway for users, rooms, participants, and messages
//!
//! The realtime engine only talks to storage through [`ChatStore`], so the
//! PostgreSQL backend and the in-memory backend are interchangeable.

mod memory;
mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::{ChatMessage, NewRoom, Room, RoomId, RoomUpdate, User, UserId};

pub use memory::MemoryChatStore;
pub use postgres::PgChatStore;

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Check that the backend is reachable
    async fn ping(&self) -> StoreResult<()>;

    async fn get_user(&self, user_id: UserId) -> StoreResult<Option<User>>;

    async fn create_user(&self, nickname: &str) -> StoreResult<User>;

    async fn update_user(&self, user_id: UserId, nickname: &str) -> StoreResult<Option<User>>;

    /// Fetch a non-deleted room with a freshly computed participant count
    async fn get_room(&self, room_id: RoomId) -> StoreResult<Option<Room>>;

    /// All non-deleted rooms, newest first
    async fn list_rooms(&self) -> StoreResult<Vec<Room>>;

    async fn create_room(&self, room: NewRoom) -> StoreResult<Room>;

    async fn update_room(&self, room_id: RoomId, update: RoomUpdate) -> StoreResult<Option<Room>>;

    /// Soft delete. Returns whether a live room was deleted.
    async fn delete_room(&self, room_id: RoomId) -> StoreResult<bool>;

    /// Insert the (room, user) participant row if absent.
    ///
    /// Returns `false` when the row already existed. Must be safe to call
    /// concurrently for the same pair.
    async fn add_participant(&self, room_id: RoomId, user_id: UserId) -> StoreResult<bool>;

    async fn remove_participant(&self, room_id: RoomId, user_id: UserId) -> StoreResult<bool>;

    /// Store a message. The id is supplied by the caller and must be unique.
    async fn append_message(&self, message: ChatMessage) -> StoreResult<ChatMessage>;

    /// Messages of a room ordered by timestamp
    async fn list_messages(&self, room_id: RoomId) -> StoreResult<Vec<ChatMessage>>;

    /// Flag every unread message of the room not sent by `excluded_nickname` as read
    async fn mark_messages_as_read(&self, room_id: RoomId, excluded_nickname: &str) -> StoreResult<()>;

    /// Unread messages not sent by `nickname`, across all live rooms
    async fn count_unread(&self, nickname: &str) -> StoreResult<u64>;

    /// Unread messages not sent by `nickname`, grouped by room
    async fn count_unread_by_room(&self, nickname: &str) -> StoreResult<HashMap<RoomId, u64>>;
}
