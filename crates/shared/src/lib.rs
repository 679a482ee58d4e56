//! Roomchat Shared Types and Utilities
//!
//! This crate contains the domain types, the persistence gateway, and the
//! database helpers shared by the Roomchat server.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use db::*;
pub use error::*;
pub use store::{ChatStore, MemoryChatStore, PgChatStore};
pub use types::*;
