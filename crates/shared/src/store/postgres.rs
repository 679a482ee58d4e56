//! PostgreSQL-backed [`ChatStore`]

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::ChatStore;
use crate::error::{StoreError, StoreResult};
use crate::types::{
    ChatMessage, MessageRow, NewRoom, Room, RoomId, RoomRow, RoomUpdate, User, UserId, UserRow,
};

/// PostgreSQL foreign key violation
const FOREIGN_KEY_VIOLATION: &str = "23503";

const ROOM_SELECT: &str = r#"
    SELECT r.id, r.name, r.password, r.owner_id, r.created_at, r.updated_at, r.deleted_at,
           COUNT(p.user_id) AS participant_count
    FROM rooms r
    LEFT JOIN participants p ON p.room_id = r.id
"#;

#[derive(Clone)]
pub struct PgChatStore {
    pool: PgPool,
}

impl PgChatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_reference_error(err: sqlx::Error, what: impl FnOnce() -> String) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) {
            return StoreError::MissingReference(what());
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_user(&self, user_id: UserId) -> StoreResult<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, nickname, created_at, updated_at FROM users WHERE id = $1")
                .bind(user_id.0)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(User::from))
    }

    async fn create_user(&self, nickname: &str) -> StoreResult<User> {
        let row: UserRow = sqlx::query_as(
            r#"
            INSERT INTO users (id, nickname, created_at, updated_at)
            VALUES ($1, $2, NOW(), NOW())
            RETURNING id, nickname, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(nickname)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(user_id = %row.id, nickname = %row.nickname, "User created");
        Ok(row.into())
    }

    async fn update_user(&self, user_id: UserId, nickname: &str) -> StoreResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            UPDATE users
            SET nickname = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, nickname, created_at, updated_at
            "#,
        )
        .bind(user_id.0)
        .bind(nickname)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn get_room(&self, room_id: RoomId) -> StoreResult<Option<Room>> {
        let query = format!("{ROOM_SELECT} WHERE r.id = $1 AND r.deleted_at IS NULL GROUP BY r.id");
        let row: Option<RoomRow> = sqlx::query_as(&query)
            .bind(room_id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Room::from))
    }

    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        let query =
            format!("{ROOM_SELECT} WHERE r.deleted_at IS NULL GROUP BY r.id ORDER BY r.created_at DESC");
        let rows: Vec<RoomRow> = sqlx::query_as(&query).fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(Room::from).collect())
    }

    async fn create_room(&self, room: NewRoom) -> StoreResult<Room> {
        let room_id = Uuid::new_v4();
        let owner_id = room.owner_id;
        sqlx::query(
            r#"
            INSERT INTO rooms (id, name, password, owner_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            "#,
        )
        .bind(room_id)
        .bind(&room.name)
        .bind(&room.password)
        .bind(owner_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| map_reference_error(e, || format!("owner {owner_id}")))?;

        tracing::info!(room_id = %room_id, owner_id = %owner_id, "Room created");

        self.get_room(RoomId(room_id))
            .await?
            .ok_or_else(|| StoreError::Internal(format!("room {room_id} missing after insert")))
    }

    async fn update_room(&self, room_id: RoomId, update: RoomUpdate) -> StoreResult<Option<Room>> {
        let (set_password, password) = match update.password {
            Some(password) => (true, password),
            None => (false, None),
        };

        let result = sqlx::query(
            r#"
            UPDATE rooms
            SET name = COALESCE($2, name),
                password = CASE WHEN $3 THEN $4 ELSE password END,
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(room_id.0)
        .bind(update.name)
        .bind(set_password)
        .bind(password)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_room(room_id).await
    }

    async fn delete_room(&self, room_id: RoomId) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE rooms SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(room_id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn add_participant(&self, room_id: RoomId, user_id: UserId) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO participants (room_id, user_id, joined_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (room_id, user_id) DO NOTHING
            "#,
        )
        .bind(room_id.0)
        .bind(user_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| map_reference_error(e, || format!("room {room_id} or user {user_id}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_participant(&self, room_id: RoomId, user_id: UserId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM participants WHERE room_id = $1 AND user_id = $2")
            .bind(room_id.0)
            .bind(user_id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn append_message(&self, message: ChatMessage) -> StoreResult<ChatMessage> {
        let room_id = message.room_id;
        sqlx::query(
            r#"
            INSERT INTO messages (id, room_id, nickname, message, timestamp, is_read)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(message.id.0)
        .bind(room_id.0)
        .bind(&message.nickname)
        .bind(&message.message)
        .bind(message.timestamp)
        .bind(message.is_read)
        .execute(&self.pool)
        .await
        .map_err(|e| map_reference_error(e, || format!("room {room_id}")))?;

        Ok(message)
    }

    async fn list_messages(&self, room_id: RoomId) -> StoreResult<Vec<ChatMessage>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, room_id, nickname, message, timestamp, is_read
            FROM messages
            WHERE room_id = $1
            ORDER BY timestamp ASC
            "#,
        )
        .bind(room_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ChatMessage::from).collect())
    }

    async fn mark_messages_as_read(&self, room_id: RoomId, excluded_nickname: &str) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET is_read = TRUE
            WHERE room_id = $1 AND nickname <> $2 AND is_read = FALSE
            "#,
        )
        .bind(room_id.0)
        .bind(excluded_nickname)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            room_id = %room_id,
            excluded = %excluded_nickname,
            updated = result.rows_affected(),
            "Marked messages as read"
        );

        Ok(())
    }

    async fn count_unread(&self, nickname: &str) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM messages m
            JOIN rooms r ON r.id = m.room_id
            WHERE r.deleted_at IS NULL AND m.nickname <> $1 AND m.is_read = FALSE
            "#,
        )
        .bind(nickname)
        .fetch_one(&self.pool)
        .await?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn count_unread_by_room(&self, nickname: &str) -> StoreResult<HashMap<RoomId, u64>> {
        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            r#"
            SELECT m.room_id, COUNT(*)
            FROM messages m
            JOIN rooms r ON r.id = m.room_id
            WHERE r.deleted_at IS NULL AND m.nickname <> $1 AND m.is_read = FALSE
            GROUP BY m.room_id
            "#,
        )
        .bind(nickname)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(room_id, count)| (RoomId(room_id), u64::try_from(count).unwrap_or(0)))
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::db::{create_pool, run_migrations};

    async fn setup() -> PgChatStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = create_pool(&url, 2).await.expect("Failed to create pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        PgChatStore::new(pool)
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_add_participant_is_idempotent() {
        let store = setup().await;
        let owner = store.create_user("owner").await.unwrap();
        let room = store
            .create_room(NewRoom {
                name: "pg-room".to_string(),
                password: None,
                owner_id: owner.id,
            })
            .await
            .unwrap();

        assert!(store.add_participant(room.id, owner.id).await.unwrap());
        assert!(!store.add_participant(room.id, owner.id).await.unwrap());
        assert_eq!(store.get_room(room.id).await.unwrap().unwrap().participant_count, 1);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_append_message_to_missing_room() {
        let store = setup().await;
        let msg = ChatMessage::new(RoomId::new(), "ghost", "boo", false);
        let result = store.append_message(msg).await;
        assert!(matches!(result, Err(StoreError::MissingReference(_))));
    }
}
