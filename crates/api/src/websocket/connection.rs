//! WebSocket connection handle
//!
//! A connection only knows how to deliver events to its socket. Which rooms it
//! has joined and who it belongs to are tracked by the presence tracker.

use roomchat_shared::ConnectionId;
use tokio::sync::mpsc;

use super::events::ServerEvent;

/// Represents an active WebSocket connection
#[derive(Debug)]
pub struct Connection {
    /// Unique ID for this connection
    pub id: ConnectionId,

    /// Channel to send events to this connection
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl Connection {
    /// Create a new connection
    pub fn new(sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            id: ConnectionId::new(),
            sender,
        }
    }

    /// Send an event to this connection
    ///
    /// Returns Ok(()) if sent successfully, Err if connection is closed
    #[allow(clippy::result_large_err)] // Error type is from tokio mpsc, containing the failed event
    pub fn send(&self, event: ServerEvent) -> Result<(), mpsc::error::SendError<ServerEvent>> {
        self.sender.send(event)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_send_to_open_connection() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = Connection::new(tx);

        conn.send(ServerEvent::Pong).unwrap();
        assert!(matches!(rx.try_recv(), Ok(ServerEvent::Pong)));
    }

    #[test]
    fn test_send_to_closed_connection_fails() {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Connection::new(tx);
        drop(rx);

        assert!(conn.send(ServerEvent::Pong).is_err());
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let a = Connection::new(tx.clone());
        let b = Connection::new(tx);
        assert_ne!(a.id, b.id);
    }
}
