//! Messaging backend for wirechat: WebSocket presence/delivery hub plus
//! the REST durability layer the client reconciles against.

pub mod config;
pub mod hub;
pub mod store;
