//! WebSocket module
//!
//! The web endpoint: serves the chat page and upgrades WebSocket requests
//! into participants for the matchmaker.

mod connection;
mod server;

pub use connection::WsConnection;
pub use server::{chat_entry, configure, render_chat_page};
