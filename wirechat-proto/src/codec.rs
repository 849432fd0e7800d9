//! Serialization and deserialization for the `wirechat` wire protocol.
//!
//! The wire format is JSON text frames, one [`Envelope`] per frame.
//! WebSocket framing preserves message boundaries, so no length prefix
//! or stream reassembly is needed.

use crate::envelope::Envelope;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Encodes an [`Envelope`] into a JSON text frame.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the envelope cannot be serialized.
pub fn encode(envelope: &Envelope) -> Result<String, CodecError> {
    serde_json::to_string(envelope).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes an [`Envelope`] from a JSON text frame.
///
/// Unknown `type` tags decode successfully into [`Envelope::Unknown`];
/// only malformed JSON or a known tag with the wrong field shape is an
/// error. Readers log and skip such frames rather than disconnecting.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the text cannot be deserialized.
pub fn decode(text: &str) -> Result<Envelope, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::Serialization(e.to_string()))
}
