//! In-process loopback transport for testing.
//!
//! [`LoopbackTransport::pair`] returns two connected endpoints: envelopes
//! sent on one side arrive on the other, with no codec or network in the
//! way. `close` simulates a dropped connection on both ends.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc};

use wirechat_proto::envelope::Envelope;

use super::{Transport, TransportError};

/// One endpoint of an in-process transport pair.
pub struct LoopbackTransport {
    outgoing: mpsc::UnboundedSender<Envelope>,
    incoming: Mutex<mpsc::UnboundedReceiver<Envelope>>,
    open: Arc<AtomicBool>,
}

impl LoopbackTransport {
    /// Create a connected pair of endpoints.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));

        let a = Self {
            outgoing: a_tx,
            incoming: Mutex::new(a_rx),
            open: Arc::clone(&open),
        };
        let b = Self {
            outgoing: b_tx,
            incoming: Mutex::new(b_rx),
            open,
        };
        (a, b)
    }

    /// Simulate a connection drop; both endpoints observe it.
    pub fn close(&self) {
        self.open.store(false, Ordering::Relaxed);
    }
}

impl Transport for LoopbackTransport {
    async fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        if !self.open.load(Ordering::Relaxed) {
            return Err(TransportError::ConnectionClosed);
        }
        self.outgoing
            .send(envelope.clone())
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn recv(&self) -> Result<Envelope, TransportError> {
        if !self.open.load(Ordering::Relaxed) {
            return Err(TransportError::ConnectionClosed);
        }
        let mut rx = self.incoming.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }
}
