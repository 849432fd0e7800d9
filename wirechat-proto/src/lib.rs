//! Shared protocol definitions for the `wirechat` wire format.

pub mod codec;
pub mod envelope;
pub mod message;
