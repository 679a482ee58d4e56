//! Global WebSocket state management
//!
//! Maintains global state for all live connections, their presence entries
//! and the room broadcast groups.

use std::collections::HashMap;
use std::sync::Arc;

use roomchat_shared::{ConnectionId, RoomId};
use tokio::sync::RwLock;

use super::connection::Connection;
use super::presence::PresenceTracker;
use super::room::RoomManager;

/// Global WebSocket state shared across all connections
#[derive(Clone)]
pub struct WebSocketState {
    /// All active connections indexed by connection id
    pub connections: Arc<RwLock<HashMap<ConnectionId, Arc<Connection>>>>,

    /// Broadcast groups per room
    pub rooms: Arc<RoomManager>,

    /// Which rooms each connection has open
    pub presence: Arc<PresenceTracker>,
}

impl WebSocketState {
    /// Create new WebSocket state
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            rooms: Arc::new(RoomManager::new()),
            presence: Arc::new(PresenceTracker::new()),
        }
    }

    /// Add a connection and give it an empty presence entry
    pub async fn add_connection(&self, conn: Connection) -> Arc<Connection> {
        let conn = Arc::new(conn);
        self.presence.register(conn.id).await;

        let mut connections = self.connections.write().await;
        connections.insert(conn.id, Arc::clone(&conn));

        tracing::info!(
            connection_id = %conn.id,
            total_connections = connections.len(),
            "WebSocket connection added"
        );

        conn
    }

    /// Remove a connection from the registry, presence and every broadcast group.
    ///
    /// Returns the rooms the connection had open.
    pub async fn remove_connection(&self, connection_id: &ConnectionId) -> Vec<RoomId> {
        let removed = {
            let mut connections = self.connections.write().await;
            let removed = connections.remove(connection_id).is_some();
            if removed {
                tracing::info!(
                    connection_id = %connection_id,
                    remaining_connections = connections.len(),
                    "WebSocket connection removed"
                );
            }
            removed
        };
        if !removed {
            return Vec::new();
        }

        let mut open_rooms: Vec<RoomId> = self
            .presence
            .drop_connection(*connection_id)
            .await
            .into_iter()
            .collect();
        self.rooms.remove_connection(connection_id).await;

        open_rooms.sort();
        open_rooms
    }

    /// Get total number of active connections
    pub async fn connection_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    /// Get statistics about the WebSocket state
    pub async fn get_stats(&self) -> WebSocketStats {
        let connection_count = self.connection_count().await;
        let room_count = self.rooms.get_room_count().await;

        WebSocketStats {
            active_connections: connection_count,
            active_rooms: room_count,
        }
    }
}

impl Default for WebSocketState {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about WebSocket connections
#[derive(Debug, Clone)]
pub struct WebSocketStats {
    /// Number of active connections
    pub active_connections: usize,
    /// Number of rooms with at least one live subscriber
    pub active_rooms: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_add_and_remove_connection() {
        let state = WebSocketState::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let conn = state.add_connection(Connection::new(tx)).await;
        assert_eq!(state.connection_count().await, 1);
        assert_eq!(state.presence.connection_count().await, 1);
        assert!(state.connections.read().await.contains_key(&conn.id));

        state.remove_connection(&conn.id).await;
        assert_eq!(state.connection_count().await, 0);
        assert_eq!(state.presence.connection_count().await, 0);
        assert!(state.remove_connection(&conn.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_connection_returns_open_rooms() {
        let state = WebSocketState::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = state.add_connection(Connection::new(tx)).await;
        let room = RoomId::new();

        state.presence.record_join(conn.id, room).await;
        state.rooms.join(room, Arc::clone(&conn)).await;

        assert_eq!(state.remove_connection(&conn.id).await, vec![room]);
        assert_eq!(state.rooms.get_room_size(&room).await, 0);
    }

    #[tokio::test]
    async fn test_stats() {
        let state = WebSocketState::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let conn = state.add_connection(Connection::new(tx)).await;
        state.rooms.join(RoomId::new(), conn).await;

        let stats = state.get_stats().await;
        assert_eq!(stats.active_connections, 1);
        assert_eq!(stats.active_rooms, 1);
    }
}
