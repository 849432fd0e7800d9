//! WebSocket transport for the wirechat client.
//!
//! Implements the [`Transport`] trait over a WebSocket connection to the
//! backend hub. Connecting announces the user with a `join` envelope as
//! soon as the socket opens — an event-driven replacement for the old
//! fixed-interval readiness poll, with the same observable behavior.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use wirechat_proto::codec;
use wirechat_proto::envelope::Envelope;
use wirechat_proto::message::UserId;

use super::{Transport, TransportError};

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Default timeout for connecting to the backend.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket transport implementing the [`Transport`] trait.
///
/// Created via [`SocketTransport::connect`], which establishes the
/// connection, sends the `join` announce, and spawns a background reader
/// task. One `connect` owns exactly one connection; dropping the transport
/// releases it.
pub struct SocketTransport {
    /// The user this connection belongs to.
    user_id: UserId,
    /// Write half of the WebSocket connection (shared for concurrent sends).
    ws_sender: Arc<Mutex<WsSender>>,
    /// Channel of envelopes decoded by the background reader task.
    incoming: Mutex<mpsc::Receiver<Envelope>>,
    /// Whether the connection is still open.
    open: Arc<AtomicBool>,
    /// Handle to the background reader task (kept alive for the transport's lifetime).
    _reader_handle: tokio::task::JoinHandle<()>,
}

impl SocketTransport {
    /// Connect to the backend and announce the user, with the default
    /// connect timeout.
    ///
    /// # Errors
    ///
    /// See [`SocketTransport::connect_with_timeout`].
    pub async fn connect(url: &str, user_id: UserId) -> Result<Self, TransportError> {
        Self::connect_with_timeout(url, user_id, CONNECT_TIMEOUT).await
    }

    /// Connect to the backend and announce the user.
    ///
    /// Steps:
    /// 1. Establish the WebSocket connection to `url` (bounded by `timeout`).
    /// 2. Send the `join` envelope carrying `user_id` on the open socket.
    /// 3. Spawn a background task that decodes incoming frames.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Timeout`] if the connection does not open in time.
    /// - [`TransportError::Io`] if the URL cannot be reached or the join
    ///   frame cannot be written.
    pub async fn connect_with_timeout(
        url: &str,
        user_id: UserId,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let (ws_stream, _response) = tokio::time::timeout(timeout, connect_async(url))
            .await
            .map_err(|_| {
                tracing::warn!(url, "websocket connect timed out");
                TransportError::Timeout
            })?
            .map_err(|e| {
                tracing::warn!(url, err = %e, "websocket connect failed");
                TransportError::Io(std::io::Error::other(format!("connect failed: {e}")))
            })?;

        let (mut ws_sender, ws_reader) = ws_stream.split();

        // Announce the user. The socket is open at this point, so no
        // readiness polling is needed.
        let join = codec::encode(&Envelope::Join {
            user_id: user_id.clone(),
        })?;
        ws_sender.send(Message::Text(join.into())).await.map_err(|e| {
            tracing::warn!(err = %e, "failed to send join announce");
            TransportError::Io(std::io::Error::other(format!("failed to send join: {e}")))
        })?;

        tracing::info!(user = %user_id, url, "connected and joined");

        let (tx, rx) = mpsc::channel(256);
        let open = Arc::new(AtomicBool::new(true));
        let reader_open = Arc::clone(&open);

        let reader_handle = tokio::spawn(reader_loop(ws_reader, tx, reader_open));

        Ok(Self {
            user_id,
            ws_sender: Arc::new(Mutex::new(ws_sender)),
            incoming: Mutex::new(rx),
            open,
            _reader_handle: reader_handle,
        })
    }

    /// The user this connection belongs to.
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }
}

impl Transport for SocketTransport {
    async fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        if !self.open.load(Ordering::Relaxed) {
            return Err(TransportError::ConnectionClosed);
        }

        let text = codec::encode(envelope)?;
        let mut sender = self.ws_sender.lock().await;
        sender.send(Message::Text(text.into())).await.map_err(|e| {
            tracing::warn!(err = %e, "websocket send failed");
            self.open.store(false, Ordering::Relaxed);
            TransportError::ConnectionClosed
        })?;

        Ok(())
    }

    async fn recv(&self) -> Result<Envelope, TransportError> {
        let mut rx = self.incoming.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }
}

/// Background task that reads WebSocket frames and decodes envelopes.
///
/// Malformed frames are logged and skipped — the task never disconnects
/// on bad data. Sets `open` to `false` when the WebSocket closes or
/// errors out; the connection itself is never re-established here (the
/// coordinator owns reconnection).
async fn reader_loop(mut ws_reader: WsReader, tx: mpsc::Sender<Envelope>, open: Arc<AtomicBool>) {
    while let Some(frame) = ws_reader.next().await {
        match frame {
            Ok(Message::Text(text)) => match codec::decode(text.as_str()) {
                Ok(envelope) => {
                    if tx.send(envelope).await.is_err() {
                        // Receiver dropped — transport was dropped, exit.
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(err = %e, "malformed frame, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("websocket closed by server");
                break;
            }
            Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {
                // This protocol is text-only; control frames carry nothing.
            }
            Err(e) => {
                tracing::warn!(err = %e, "websocket read error");
                break;
            }
        }
    }
    open.store(false, Ordering::Relaxed);
    tracing::debug!("socket reader task exiting");
}
