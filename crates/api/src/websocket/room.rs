//! Room broadcast groups for pub/sub
//!
//! Manages the set of connections subscribed to each chat room and fans
//! events out to them. A room's fan-out holds that room's group lock for the
//! whole delivery, so every subscriber observes the room's events in the same
//! order.

use std::collections::HashMap;
use std::sync::Arc;

use roomchat_shared::{ConnectionId, RoomId};
use tokio::sync::{Mutex, RwLock};

use super::connection::Connection;
use super::events::ServerEvent;

type BroadcastGroup = Arc<Mutex<Vec<Arc<Connection>>>>;

/// Manages chat room broadcast groups
pub struct RoomManager {
    /// Map of room_id -> subscribed connections
    rooms: RwLock<HashMap<RoomId, BroadcastGroup>>,
}

impl RoomManager {
    /// Create a new room manager
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Add a connection to a room's broadcast group
    ///
    /// Returns false if the connection was already subscribed.
    pub async fn join(&self, room_id: RoomId, conn: Arc<Connection>) -> bool {
        let mut rooms = self.rooms.write().await;
        let group = rooms.entry(room_id).or_default();
        let mut members = group.lock().await;

        if members.iter().any(|c| c.id == conn.id) {
            return false;
        }
        members.push(Arc::clone(&conn));

        tracing::debug!(
            room_id = %room_id,
            connection_id = %conn.id,
            room_size = members.len(),
            "Connection joined room broadcast group"
        );
        true
    }

    /// Remove a connection from a room's broadcast group
    pub async fn leave(&self, room_id: &RoomId, connection_id: &ConnectionId) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(group) = rooms.get(room_id).cloned() else {
            return false;
        };

        let mut members = group.lock().await;
        let before_len = members.len();
        members.retain(|c| c.id != *connection_id);
        let removed = members.len() < before_len;

        // Clean up empty rooms
        if members.is_empty() {
            rooms.remove(room_id);
            tracing::debug!(room_id = %room_id, "Removed empty room broadcast group");
        } else if removed {
            tracing::debug!(
                room_id = %room_id,
                connection_id = %connection_id,
                room_size = members.len(),
                "Connection left room broadcast group"
            );
        }

        removed
    }

    /// Snapshot of the connections currently subscribed to a room
    pub async fn members(&self, room_id: &RoomId) -> Vec<Arc<Connection>> {
        let Some(group) = self.group(room_id).await else {
            return Vec::new();
        };
        let members = group.lock().await;
        members.clone()
    }

    /// Broadcast an event to all connections in a room
    ///
    /// Closed connections are skipped; they are cleaned up when their socket
    /// loop ends. Returns the number of connections the event was delivered to.
    pub async fn broadcast(&self, room_id: &RoomId, event: ServerEvent) -> usize {
        let Some(group) = self.group(room_id).await else {
            tracing::debug!(
                room_id = %room_id,
                event_type = ?event,
                "No broadcast group for room - no subscribers"
            );
            return 0;
        };

        let members = group.lock().await;
        let mut success_count = 0;
        let mut failed_count = 0;

        for conn in members.iter() {
            match conn.send(event.clone()) {
                Ok(()) => success_count += 1,
                Err(_) => {
                    failed_count += 1;
                    tracing::warn!(
                        connection_id = %conn.id,
                        "Failed to send event to connection (likely closed)"
                    );
                }
            }
        }

        tracing::debug!(
            room_id = %room_id,
            event_type = ?event,
            recipients = success_count,
            failed = failed_count,
            "Broadcast event to room"
        );

        success_count
    }

    /// Remove a connection from all rooms, returning the rooms it was in
    pub async fn remove_connection(&self, connection_id: &ConnectionId) -> Vec<RoomId> {
        let mut rooms = self.rooms.write().await;
        let mut removed_from = Vec::new();

        for (room_id, group) in rooms.iter() {
            let mut members = group.lock().await;
            let before_len = members.len();
            members.retain(|c| c.id != *connection_id);
            if members.len() < before_len {
                removed_from.push(*room_id);
            }
        }

        // Clean up empty rooms
        let mut empty = Vec::new();
        for (room_id, group) in rooms.iter() {
            if group.lock().await.is_empty() {
                empty.push(*room_id);
            }
        }
        for room_id in &empty {
            rooms.remove(room_id);
        }

        if !removed_from.is_empty() {
            tracing::debug!(
                connection_id = %connection_id,
                room_count = removed_from.len(),
                "Removed connection from rooms"
            );
        }

        removed_from
    }

    /// Get room size (number of connections) for a room
    pub async fn get_room_size(&self, room_id: &RoomId) -> usize {
        match self.group(room_id).await {
            Some(group) => group.lock().await.len(),
            None => 0,
        }
    }

    /// Get total number of active broadcast groups
    pub async fn get_room_count(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.len()
    }

    async fn group(&self, room_id: &RoomId) -> Option<BroadcastGroup> {
        let rooms = self.rooms.read().await;
        rooms.get(room_id).cloned()
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}
