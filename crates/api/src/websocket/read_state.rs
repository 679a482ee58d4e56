//! Read-state reconciliation
//!
//! Messages start unread when nobody else is live in the room. A user's
//! unread backlog clears when they genuinely join a room, or when another user
//! posts while they are live in it. Flags only ever go from unread to read.

use std::collections::HashMap;
use std::sync::Arc;

use roomchat_shared::{ChatStore, RoomId, StoreError, User, UserId};

use super::session::SessionError;

#[derive(Clone)]
pub struct ReadStateReconciler {
    store: Arc<dyn ChatStore>,
}

impl ReadStateReconciler {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    /// Mark every message in the room not sent by `excluded_nickname` as read.
    ///
    /// Idempotent: once all eligible messages are read, repeated calls change
    /// nothing.
    pub async fn mark_read(&self, room_id: RoomId, excluded_nickname: &str) -> Result<(), StoreError> {
        self.store.mark_messages_as_read(room_id, excluded_nickname).await?;
        tracing::debug!(room_id = %room_id, reader = %excluded_nickname, "Room marked read");
        Ok(())
    }

    /// Total unread messages waiting for a user across all rooms
    pub async fn unread_count_for_user(&self, user_id: UserId) -> Result<u64, SessionError> {
        let user = self.resolve(user_id).await?;
        Ok(self.store.count_unread(&user.nickname).await?)
    }

    /// Unread messages waiting for a user, keyed by room
    pub async fn unread_counts_by_room_for_user(
        &self,
        user_id: UserId,
    ) -> Result<HashMap<RoomId, u64>, SessionError> {
        let user = self.resolve(user_id).await?;
        Ok(self.store.count_unread_by_room(&user.nickname).await?)
    }

    async fn resolve(&self, user_id: UserId) -> Result<User, SessionError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or(SessionError::UserNotFound(user_id))
    }
}
