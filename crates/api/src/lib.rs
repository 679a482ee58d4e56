//! Roomchat API Library
//!
//! This crate contains the HTTP and WebSocket server components for Roomchat.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
