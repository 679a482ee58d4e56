//! In-process [`ChatStore`] used by tests and the `memory` storage backend

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::ChatStore;
use crate::error::{StoreError, StoreResult};
use crate::types::{ChatMessage, NewRoom, Participant, Room, RoomId, RoomUpdate, User, UserId};

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, User>,
    rooms: HashMap<RoomId, Room>,
    participants: Vec<Participant>,
    messages: Vec<ChatMessage>,
}

impl Inner {
    fn participant_count(&self, room_id: RoomId) -> u64 {
        self.participants.iter().filter(|p| p.room_id == room_id).count() as u64
    }

    fn live_room(&self, room_id: RoomId) -> Option<Room> {
        let room = self.rooms.get(&room_id).filter(|r| r.deleted_at.is_none())?;
        Some(Room {
            participant_count: self.participant_count(room_id),
            ..room.clone()
        })
    }

    fn unread_for<'a>(&'a self, nickname: &'a str) -> impl Iterator<Item = &'a ChatMessage> + 'a {
        self.messages.iter().filter(move |m| {
            !m.is_read
                && m.nickname != nickname
                && self.rooms.get(&m.room_id).is_some_and(|r| r.deleted_at.is_none())
        })
    }
}

/// Memory-backed store. Cloning shares the same underlying data.
#[derive(Clone, Default)]
pub struct MemoryChatStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of participant rows for a room, deleted or not
    pub async fn participant_rows(&self, room_id: RoomId) -> usize {
        let inner = self.inner.read().await;
        inner.participants.iter().filter(|p| p.room_id == room_id).count()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn get_user(&self, user_id: UserId) -> StoreResult<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(&user_id).cloned())
    }

    async fn create_user(&self, nickname: &str) -> StoreResult<User> {
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: UserId::new(),
            nickname: nickname.to_string(),
            created_at: now,
            updated_at: now,
        };

        let mut inner = self.inner.write().await;
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(&self, user_id: UserId, nickname: &str) -> StoreResult<Option<User>> {
        let mut inner = self.inner.write().await;
        Ok(inner.users.get_mut(&user_id).map(|user| {
            user.nickname = nickname.to_string();
            user.updated_at = OffsetDateTime::now_utc();
            user.clone()
        }))
    }

    async fn get_room(&self, room_id: RoomId) -> StoreResult<Option<Room>> {
        let inner = self.inner.read().await;
        Ok(inner.live_room(room_id))
    }

    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        let inner = self.inner.read().await;
        let mut rooms: Vec<Room> = inner
            .rooms
            .keys()
            .filter_map(|id| inner.live_room(*id))
            .collect();
        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rooms)
    }

    async fn create_room(&self, room: NewRoom) -> StoreResult<Room> {
        let mut inner = self.inner.write().await;
        if !inner.users.contains_key(&room.owner_id) {
            return Err(StoreError::MissingReference(format!("owner {}", room.owner_id)));
        }

        let now = OffsetDateTime::now_utc();
        let room = Room {
            id: RoomId::new(),
            name: room.name,
            password: room.password,
            owner_id: room.owner_id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            participant_count: 0,
        };
        inner.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn update_room(&self, room_id: RoomId, update: RoomUpdate) -> StoreResult<Option<Room>> {
        let mut inner = self.inner.write().await;
        let Some(room) = inner.rooms.get_mut(&room_id).filter(|r| r.deleted_at.is_none()) else {
            return Ok(None);
        };

        if let Some(name) = update.name {
            room.name = name;
        }
        if let Some(password) = update.password {
            room.password = password;
        }
        room.updated_at = OffsetDateTime::now_utc();

        Ok(inner.live_room(room_id))
    }

    async fn delete_room(&self, room_id: RoomId) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        match inner.rooms.get_mut(&room_id).filter(|r| r.deleted_at.is_none()) {
            Some(room) => {
                room.deleted_at = Some(OffsetDateTime::now_utc());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn add_participant(&self, room_id: RoomId, user_id: UserId) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        if !inner.rooms.contains_key(&room_id) || !inner.users.contains_key(&user_id) {
            return Err(StoreError::MissingReference(format!("room {room_id} or user {user_id}")));
        }

        if inner
            .participants
            .iter()
            .any(|p| p.room_id == room_id && p.user_id == user_id)
        {
            return Ok(false);
        }

        inner.participants.push(Participant {
            room_id,
            user_id,
            joined_at: OffsetDateTime::now_utc(),
        });
        Ok(true)
    }

    async fn remove_participant(&self, room_id: RoomId, user_id: UserId) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let before = inner.participants.len();
        inner
            .participants
            .retain(|p| !(p.room_id == room_id && p.user_id == user_id));
        Ok(inner.participants.len() < before)
    }

    async fn append_message(&self, message: ChatMessage) -> StoreResult<ChatMessage> {
        let mut inner = self.inner.write().await;
        if !inner.rooms.contains_key(&message.room_id) {
            return Err(StoreError::MissingReference(format!("room {}", message.room_id)));
        }
        if inner.messages.iter().any(|m| m.id == message.id) {
            return Err(StoreError::Internal(format!("duplicate message id {}", message.id)));
        }

        inner.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self, room_id: RoomId) -> StoreResult<Vec<ChatMessage>> {
        let inner = self.inner.read().await;
        let mut messages: Vec<ChatMessage> = inner
            .messages
            .iter()
            .filter(|m| m.room_id == room_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(messages)
    }

    async fn mark_messages_as_read(&self, room_id: RoomId, excluded_nickname: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        for message in inner
            .messages
            .iter_mut()
            .filter(|m| m.room_id == room_id && m.nickname != excluded_nickname)
        {
            message.is_read = true;
        }
        Ok(())
    }

    async fn count_unread(&self, nickname: &str) -> StoreResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner.unread_for(nickname).count() as u64)
    }

    async fn count_unread_by_room(&self, nickname: &str) -> StoreResult<HashMap<RoomId, u64>> {
        let inner = self.inner.read().await;
        let mut counts = HashMap::new();
        for message in inner.unread_for(nickname) {
            *counts.entry(message.room_id).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
