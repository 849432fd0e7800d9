//! wirechat client library: transport, signal routing, conversation
//! state, presence/typing tracking, and the coordinator that wires them
//! to a backend over WebSocket + REST.

pub mod api;
pub mod client;
pub mod config;
pub mod conversation;
pub mod presence;
pub mod router;
pub mod transport;
