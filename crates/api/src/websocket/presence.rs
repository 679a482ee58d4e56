//! Connection presence tracking
//!
//! Source of truth for "is this connection currently in this room". Entries
//! are partitioned by connection id: each connection owns one entry with its
//! own lock, and the outer map is only write-locked when a connection is
//! registered or dropped. Nothing here is durable; the tracker is rebuilt from
//! scratch every time the server starts.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use roomchat_shared::{ConnectionId, RoomId, UserId};
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Default)]
struct PresenceEntry {
    user_id: Option<UserId>,
    display_name: Option<String>,
    rooms: HashSet<RoomId>,
}

/// Tracks which rooms each live connection has open
#[derive(Default)]
pub struct PresenceTracker {
    entries: RwLock<HashMap<ConnectionId, Arc<Mutex<PresenceEntry>>>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty entry for a freshly connected socket
    pub async fn register(&self, connection_id: ConnectionId) {
        let mut entries = self.entries.write().await;
        entries.entry(connection_id).or_default();
    }

    /// Cache the user resolved for this connection on join
    pub async fn resolve_identity(&self, connection_id: ConnectionId, user_id: UserId, display_name: &str) {
        if let Some(entry) = self.entry(&connection_id).await {
            let mut entry = entry.lock().await;
            entry.user_id = Some(user_id);
            entry.display_name = Some(display_name.to_string());
        }
    }

    /// Add a room to the connection's set.
    ///
    /// Returns true only when the room was not already in the set. Unknown
    /// connections are never resurrected.
    pub async fn record_join(&self, connection_id: ConnectionId, room_id: RoomId) -> bool {
        let Some(entry) = self.entry(&connection_id).await else {
            tracing::warn!(
                connection_id = %connection_id,
                room_id = %room_id,
                "Join recorded for unregistered connection"
            );
            return false;
        };
        let mut entry = entry.lock().await;
        entry.rooms.insert(room_id)
    }

    /// Remove a room from the connection's set, returning whether it was there
    pub async fn record_leave(&self, connection_id: ConnectionId, room_id: RoomId) -> bool {
        let Some(entry) = self.entry(&connection_id).await else {
            return false;
        };
        let mut entry = entry.lock().await;
        entry.rooms.remove(&room_id)
    }

    /// Forget a connection entirely, returning the rooms it had open
    pub async fn drop_connection(&self, connection_id: ConnectionId) -> HashSet<RoomId> {
        let removed = {
            let mut entries = self.entries.write().await;
            entries.remove(&connection_id)
        };

        match removed {
            Some(entry) => std::mem::take(&mut entry.lock().await.rooms),
            None => HashSet::new(),
        }
    }

    pub async fn rooms_of(&self, connection_id: ConnectionId) -> HashSet<RoomId> {
        match self.entry(&connection_id).await {
            Some(entry) => entry.lock().await.rooms.clone(),
            None => HashSet::new(),
        }
    }

    pub async fn is_in_room(&self, connection_id: ConnectionId, room_id: RoomId) -> bool {
        match self.entry(&connection_id).await {
            Some(entry) => entry.lock().await.rooms.contains(&room_id),
            None => false,
        }
    }

    pub async fn display_name_of(&self, connection_id: ConnectionId) -> Option<String> {
        let entry = self.entry(&connection_id).await?;
        let entry = entry.lock().await;
        entry.display_name.clone()
    }

    pub async fn user_of(&self, connection_id: ConnectionId) -> Option<UserId> {
        let entry = self.entry(&connection_id).await?;
        let entry = entry.lock().await;
        entry.user_id
    }

    /// Number of tracked connections
    pub async fn connection_count(&self) -> usize {
        self.entries.read().await.len()
    }

    async fn entry(&self, connection_id: &ConnectionId) -> Option<Arc<Mutex<PresenceEntry>>> {
        let entries = self.entries.read().await;
        entries.get(connection_id).cloned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_join_is_idempotent() {
        let tracker = PresenceTracker::new();
        let conn = ConnectionId::new();
        let room = RoomId::new();
        tracker.register(conn).await;

        assert!(tracker.record_join(conn, room).await);
        assert!(!tracker.record_join(conn, room).await);
        assert!(tracker.is_in_room(conn, room).await);
        assert_eq!(tracker.rooms_of(conn).await.len(), 1);
    }

    #[tokio::test]
    async fn test_record_leave_reports_removal() {
        let tracker = PresenceTracker::new();
        let conn = ConnectionId::new();
        let room = RoomId::new();
        tracker.register(conn).await;

        assert!(!tracker.record_leave(conn, room).await);
        tracker.record_join(conn, room).await;
        assert!(tracker.record_leave(conn, room).await);
        assert!(!tracker.is_in_room(conn, room).await);
    }

    #[tokio::test]
    async fn test_drop_connection_returns_rooms_and_clears_entry() {
        let tracker = PresenceTracker::new();
        let conn = ConnectionId::new();
        let rooms = [RoomId::new(), RoomId::new()];
        tracker.register(conn).await;
        tracker.resolve_identity(conn, UserId::new(), "alice").await;
        for room in rooms {
            tracker.record_join(conn, room).await;
        }

        let dropped = tracker.drop_connection(conn).await;
        assert_eq!(dropped, rooms.into_iter().collect::<HashSet<_>>());
        assert_eq!(tracker.connection_count().await, 0);
        assert!(tracker.display_name_of(conn).await.is_none());
        assert!(tracker.drop_connection(conn).await.is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_connection_is_not_resurrected() {
        let tracker = PresenceTracker::new();
        let conn = ConnectionId::new();

        assert!(!tracker.record_join(conn, RoomId::new()).await);
        assert_eq!(tracker.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_identity_cached_per_connection() {
        let tracker = PresenceTracker::new();
        let alice_conn = ConnectionId::new();
        let bob_conn = ConnectionId::new();
        let alice = UserId::new();
        tracker.register(alice_conn).await;
        tracker.register(bob_conn).await;

        tracker.resolve_identity(alice_conn, alice, "alice").await;

        assert_eq!(tracker.display_name_of(alice_conn).await.as_deref(), Some("alice"));
        assert_eq!(tracker.user_of(alice_conn).await, Some(alice));
        assert!(tracker.display_name_of(bob_conn).await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_joins_on_same_room() {
        let tracker = Arc::new(PresenceTracker::new());
        let room = RoomId::new();
        let conns: Vec<ConnectionId> = (0..16).map(|_| ConnectionId::new()).collect();
        for conn in &conns {
            tracker.register(*conn).await;
        }

        let handles: Vec<_> = conns
            .iter()
            .map(|conn| {
                let tracker = Arc::clone(&tracker);
                let conn = *conn;
                tokio::spawn(async move { tracker.record_join(conn, room).await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap());
        }
        for conn in &conns {
            assert!(tracker.is_in_room(*conn, room).await);
        }
    }
}
