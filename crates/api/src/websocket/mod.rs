//! WebSocket support for real-time chat rooms
//!
//! # Architecture
//!
//! - **Connection**: One live socket and its outbound event queue
//! - **Presence**: Which rooms each connection has open, in memory only
//! - **Room**: Per-room broadcast groups for pub/sub
//! - **Session**: Join/leave/send/disconnect coordination
//! - **Read state**: Marking messages read and counting unread backlogs
//! - **State**: Global WebSocket state shared across all connections
//! - **Handler**: Axum WebSocket route handler
//! - **Events**: Type-safe event definitions for client/server communication

pub mod connection;
pub mod events;
pub mod handler;
pub mod presence;
pub mod read_state;
pub mod room;
pub mod session;
pub mod state;

pub use connection::Connection;
pub use events::{ClientEvent, ServerEvent};
pub use handler::ws_handler;
pub use presence::PresenceTracker;
pub use read_state::ReadStateReconciler;
pub use room::RoomManager;
pub use session::{RoomSessions, SessionError};
pub use state::{WebSocketState, WebSocketStats};
