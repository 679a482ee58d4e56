//! Room session coordination
//!
//! Turns join, leave, send-message and disconnect requests from a connection
//! into presence updates, persistence calls, read-state reconciliation and
//! room broadcasts. Each (connection, room) pair is either not joined or
//! joined; only the first join of a pair has durable side effects.
//!
//! Participant rows are never removed on leave or disconnect, so a room's
//! participant count only grows while the room lives.

use std::collections::BTreeSet;
use std::sync::Arc;

use roomchat_shared::{ChatMessage, ChatStore, ConnectionId, RoomId, StoreError, User, UserId};
use tokio::sync::mpsc;

use super::connection::Connection;
use super::events::ServerEvent;
use super::read_state::ReadStateReconciler;
use super::state::WebSocketState;

/// Failure of a single inbound room event
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

/// Coordinates room membership for every live connection
#[derive(Clone)]
pub struct RoomSessions {
    ws: WebSocketState,
    store: Arc<dyn ChatStore>,
    read_state: ReadStateReconciler,
}

impl RoomSessions {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self {
            ws: WebSocketState::new(),
            read_state: ReadStateReconciler::new(Arc::clone(&store)),
            store,
        }
    }

    pub fn ws_state(&self) -> &WebSocketState {
        &self.ws
    }

    pub fn read_state(&self) -> &ReadStateReconciler {
        &self.read_state
    }

    /// Register a new live connection and acknowledge it
    pub async fn connect(&self, sender: mpsc::UnboundedSender<ServerEvent>) -> Arc<Connection> {
        let conn = self.ws.add_connection(Connection::new(sender)).await;
        if conn
            .send(ServerEvent::Connected {
                connection_id: conn.id,
            })
            .is_err()
        {
            tracing::warn!(connection_id = %conn.id, "Connection closed before acknowledgment");
        }
        conn
    }

    /// Open a room on a connection.
    ///
    /// Returns whether this was a new join for the connection. A repeated join
    /// only re-announces the room's participant count.
    pub async fn join(
        &self,
        conn: &Arc<Connection>,
        room_id: RoomId,
        user_id: UserId,
        reconnect_hint: bool,
    ) -> Result<bool, SessionError> {
        let user = self.resolve_user(user_id).await?;
        self.ws
            .presence
            .resolve_identity(conn.id, user.id, &user.nickname)
            .await;

        let is_new = self.ws.presence.record_join(conn.id, room_id).await;
        if is_new {
            self.ws.rooms.join(room_id, Arc::clone(conn)).await;

            if let Err(e) = self.persist_join(room_id, &user).await {
                tracing::error!(
                    error = ?e,
                    connection_id = %conn.id,
                    room_id = %room_id,
                    user_id = %user.id,
                    "Join failed, rolling back"
                );
                self.ws.presence.record_leave(conn.id, room_id).await;
                self.ws.rooms.leave(&room_id, &conn.id).await;
                return Err(e.into());
            }
        }

        tracing::info!(
            connection_id = %conn.id,
            room_id = %room_id,
            user_id = %user.id,
            is_new,
            reconnect_hint,
            "Joined room"
        );

        self.broadcast_room_update(room_id).await?;
        Ok(is_new)
    }

    async fn persist_join(&self, room_id: RoomId, user: &User) -> Result<(), StoreError> {
        self.store.add_participant(room_id, user.id).await?;
        self.read_state.mark_read(room_id, &user.nickname).await
    }

    /// Close a room on a connection.
    ///
    /// Returns false, doing nothing, when the connection did not have the
    /// room open.
    pub async fn leave(&self, conn: &Connection, room_id: RoomId) -> Result<bool, SessionError> {
        if !self.ws.presence.record_leave(conn.id, room_id).await {
            tracing::debug!(
                connection_id = %conn.id,
                room_id = %room_id,
                "Leave ignored, room not open on connection"
            );
            return Ok(false);
        }
        self.ws.rooms.leave(&room_id, &conn.id).await;

        tracing::info!(connection_id = %conn.id, room_id = %room_id, "Left room");

        self.broadcast_room_update(room_id).await?;
        Ok(true)
    }

    /// Persist a message and fan it out to the room, sender included.
    ///
    /// The message starts read when any other connection is live in the room,
    /// and everyone else live in the room has their backlog cleared.
    pub async fn send_message(
        &self,
        conn: &Connection,
        room_id: RoomId,
        user_id: UserId,
        text: &str,
    ) -> Result<ChatMessage, SessionError> {
        let user = self.resolve_user(user_id).await?;

        let others: Vec<ConnectionId> = self
            .ws
            .rooms
            .members(&room_id)
            .await
            .into_iter()
            .map(|c| c.id)
            .filter(|id| *id != conn.id)
            .collect();
        let has_other_users = !others.is_empty();

        let message = self
            .store
            .append_message(ChatMessage::new(room_id, user.nickname.as_str(), text, has_other_users))
            .await?;

        if has_other_users {
            let mut readers = BTreeSet::new();
            for other in others {
                if let Some(name) = self.ws.presence.display_name_of(other).await {
                    if name != user.nickname {
                        readers.insert(name);
                    }
                }
            }
            for reader in readers {
                if let Err(e) = self.read_state.mark_read(room_id, &reader).await {
                    tracing::error!(
                        error = ?e,
                        room_id = %room_id,
                        reader = %reader,
                        "Failed to mark room read for live reader"
                    );
                }
            }
        }

        tracing::debug!(
            connection_id = %conn.id,
            room_id = %room_id,
            message_id = %message.id,
            is_read = message.is_read,
            "Message stored"
        );

        self.ws
            .rooms
            .broadcast(&room_id, ServerEvent::ReceiveMessage(message.clone()))
            .await;
        Ok(message)
    }

    /// Tear down a connection and re-announce every room it had open
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        // read before removal drops the identity
        let user_id = self.ws.presence.user_of(connection_id).await;
        let open_rooms = self.ws.remove_connection(&connection_id).await;

        tracing::info!(
            connection_id = %connection_id,
            user_id = ?user_id,
            room_count = open_rooms.len(),
            "Connection disconnected"
        );

        for room_id in open_rooms {
            if let Err(e) = self.broadcast_room_update(room_id).await {
                tracing::error!(
                    error = ?e,
                    room_id = %room_id,
                    "Failed to announce room after disconnect"
                );
            }
        }
    }

    /// Broadcast the room's current durable participant count
    pub async fn broadcast_room_update(&self, room_id: RoomId) -> Result<(), SessionError> {
        let Some(room) = self.store.get_room(room_id).await? else {
            tracing::debug!(room_id = %room_id, "Room gone, skipping room update");
            return Ok(());
        };

        self.ws
            .rooms
            .broadcast(
                &room_id,
                ServerEvent::RoomUpdate {
                    room_id,
                    participant_count: room.participant_count,
                },
            )
            .await;
        Ok(())
    }

    async fn resolve_user(&self, user_id: UserId) -> Result<User, SessionError> {
        match self.store.get_user(user_id).await? {
            Some(user) => Ok(user),
            None => {
                tracing::warn!(user_id = %user_id, "Unknown user");
                Err(SessionError::UserNotFound(user_id))
            }
        }
    }
}
