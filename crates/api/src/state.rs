//! Application state shared across handlers

use std::sync::Arc;

use roomchat_shared::ChatStore;

use crate::config::Config;
use crate::websocket::RoomSessions;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ChatStore>,
    pub sessions: RoomSessions,
}

impl AppState {
    /// Create application state around a storage backend
    pub fn new(config: Config, store: Arc<dyn ChatStore>) -> Self {
        Self {
            config: Arc::new(config),
            sessions: RoomSessions::new(Arc::clone(&store)),
            store,
        }
    }
}
