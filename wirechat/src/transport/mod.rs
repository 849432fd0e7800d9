//! Transport layer abstraction for the wirechat client.
//!
//! Defines the [`Transport`] trait that all transport implementations must
//! satisfy. Concrete implementations:
//! - [`socket::SocketTransport`] — WebSocket connection to the backend
//! - [`loopback::LoopbackTransport`] — in-process channel pair for testing

pub mod loopback;
pub mod socket;

use wirechat_proto::codec::CodecError;
use wirechat_proto::envelope::Envelope;

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection to the backend has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The operation timed out before completing.
    #[error("transport operation timed out")]
    Timeout,

    /// An envelope could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// An underlying I/O error occurred.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Async transport trait carrying [`Envelope`] frames to and from the
/// backend over one persistent connection.
///
/// A transport owns exactly one connection for its lifetime: it is created
/// connected (with the `join` announce already sent) and is dropped when
/// the connection is gone. Reconnection is the caller's concern, so a
/// replaced transport never leaks its predecessor's connection.
pub trait Transport: Send + Sync {
    /// Send an envelope to the backend.
    ///
    /// Only writes while the connection is open; once it has closed this
    /// returns [`TransportError::ConnectionClosed`]. Callers on the live
    /// path treat that as fire-and-forget (the frame is dropped, never
    /// queued or retried — durability goes through the REST API).
    fn send(
        &self,
        envelope: &Envelope,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Receive the next envelope from the backend.
    ///
    /// Blocks asynchronously until a frame arrives. Returns
    /// [`TransportError::ConnectionClosed`] once the connection is gone
    /// and all buffered frames have been drained.
    fn recv(
        &self,
    ) -> impl std::future::Future<Output = Result<Envelope, TransportError>> + Send;

    /// Whether the underlying connection is currently open.
    fn is_open(&self) -> bool;
}
