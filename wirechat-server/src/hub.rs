//! Hub core: shared state, WebSocket handler, presence registry, live
//! message routing, and the REST endpoints.
//!
//! The hub accepts WebSocket connections, registers users on their `join`
//! frame, and forwards `send-message` / `typing` frames between connected
//! users. The WebSocket path is delivery-only: durability lives in the
//! [`MessageStore`] behind the REST endpoints, so a frame dropped for an
//! offline receiver is recovered by that user's next history fetch.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{RwLock, mpsc};

use wirechat_proto::codec;
use wirechat_proto::envelope::Envelope;
use wirechat_proto::message::{Message, MessageDraft, MessageId, UserId};

use crate::store::{MessageStore, StoreError};

/// Shared hub state holding the presence registry and message store.
pub struct HubState {
    /// Maps a connected user to a channel sender for their WebSocket writer.
    connections: RwLock<HashMap<UserId, mpsc::UnboundedSender<WsMessage>>>,
    /// Durability layer behind the REST endpoints.
    pub store: MessageStore,
}

impl Default for HubState {
    fn default() -> Self {
        Self::new()
    }
}

impl HubState {
    /// Creates a new hub state with an empty registry and store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            store: MessageStore::new(),
        }
    }

    /// Registers a user's connection, replacing any previous one.
    ///
    /// A duplicate `join` replaces the old sender; the previous writer
    /// task detects its channel closing and shuts down.
    pub async fn register(
        &self,
        user: &UserId,
        sender: mpsc::UnboundedSender<WsMessage>,
    ) -> Option<mpsc::UnboundedSender<WsMessage>> {
        self.connections.write().await.insert(user.clone(), sender)
    }

    /// Removes a user from the registry.
    pub async fn unregister(&self, user: &UserId) -> Option<mpsc::UnboundedSender<WsMessage>> {
        self.connections.write().await.remove(user)
    }

    /// The full set of currently-online user ids, sorted for stable output.
    pub async fn online_users(&self) -> Vec<UserId> {
        let conns = self.connections.read().await;
        let mut users: Vec<UserId> = conns.keys().cloned().collect();
        users.sort();
        users
    }

    /// Broadcasts the full online-users list to every connected client.
    ///
    /// Clients replace their presence set wholesale on each of these, so
    /// the hub always sends the complete list, never a delta.
    pub async fn broadcast_presence(&self) {
        let users = self.online_users().await;
        let envelope = Envelope::OnlineUsers { users };
        let Ok(text) = codec::encode(&envelope) else {
            tracing::error!("failed to encode online-users broadcast");
            return;
        };
        let conns = self.connections.read().await;
        for (user, sender) in conns.iter() {
            if sender.send(WsMessage::Text(text.clone().into())).is_err() {
                tracing::debug!(user = %user, "presence broadcast to closed connection");
            }
        }
    }

    /// Forwards an envelope to one user if connected. Returns whether the
    /// frame was handed to a live connection.
    pub async fn forward(&self, user: &UserId, envelope: &Envelope) -> bool {
        let Ok(text) = codec::encode(envelope) else {
            tracing::error!("failed to encode forwarded envelope");
            return false;
        };
        let conns = self.connections.read().await;
        conns
            .get(user)
            .is_some_and(|sender| sender.send(WsMessage::Text(text.into())).is_ok())
    }

    /// Forwards an envelope to every connected user except `skip`.
    pub async fn forward_except(&self, skip: &UserId, envelope: &Envelope) {
        let Ok(text) = codec::encode(envelope) else {
            tracing::error!("failed to encode forwarded envelope");
            return;
        };
        let conns = self.connections.read().await;
        for (user, sender) in conns.iter() {
            if user != skip {
                let _ = sender.send(WsMessage::Text(text.clone().into()));
            }
        }
    }
}

/// Handles an upgraded WebSocket connection for a single user.
///
/// Lifecycle:
/// 1. Wait for the `join` frame identifying the user.
/// 2. Register the connection (duplicate join replaces the old one) and
///    broadcast the updated online-users list to everyone.
/// 3. Route `send-message` and `typing` frames until the peer disconnects.
/// 4. On disconnect, unregister and broadcast presence again.
pub async fn handle_socket(socket: WebSocket, state: Arc<HubState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let Some(user) = wait_for_join(&mut ws_receiver).await else {
        tracing::warn!("connection closed before join");
        return;
    };

    tracing::info!(user = %user, "user joined");

    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    if state.register(&user, tx).await.is_some() {
        tracing::info!(user = %user, "replaced existing connection (duplicate join)");
    }
    state.broadcast_presence().await;

    // Writer task: drains the channel into the WebSocket sink.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => match codec::decode(text.as_str()) {
                Ok(envelope) => route_envelope(&state, &user, envelope).await,
                Err(e) => {
                    // Malformed frame: log and skip, never disconnect.
                    tracing::warn!(user = %user, error = %e, "malformed frame, skipping");
                }
            },
            Ok(WsMessage::Close(_)) => {
                tracing::info!(user = %user, "connection closed by client");
                break;
            }
            Ok(_) => {
                // Binary/ping/pong frames carry nothing in this protocol.
            }
            Err(e) => {
                tracing::warn!(user = %user, error = %e, "websocket read error");
                break;
            }
        }
    }

    state.unregister(&user).await;
    state.broadcast_presence().await;
    writer.abort();
    tracing::info!(user = %user, "user disconnected");
}

/// Routes one inbound envelope from a joined user.
async fn route_envelope(state: &Arc<HubState>, joined: &UserId, envelope: Envelope) {
    match envelope {
        Envelope::SendMessage {
            receiver, content, ..
        } => {
            // The sender field is always the joined user, whatever the
            // frame claimed (anti-spoofing, same rule as routing metadata
            // on any relay).
            let message = Message {
                id: None,
                sender: joined.clone(),
                receiver: receiver.clone(),
                content,
                created_at: chrono::Utc::now(),
                seen: false,
            };
            let delivered = state
                .forward(&receiver, &Envelope::ReceiveMessage { message })
                .await;
            if !delivered {
                // Receiver offline: drop. The REST history fetch on their
                // next poll/login carries the persisted copy.
                tracing::debug!(from = %joined, to = %receiver, "receiver offline, dropping live delivery");
            }
        }
        Envelope::Typing { .. } => {
            let notice = Envelope::Typing {
                user_id: joined.clone(),
            };
            state.forward_except(joined, &notice).await;
        }
        Envelope::Join { .. } => {
            tracing::debug!(user = %joined, "duplicate join frame ignored");
        }
        Envelope::ReceiveMessage { .. } | Envelope::OnlineUsers { .. } | Envelope::Unknown => {
            tracing::debug!(user = %joined, "ignoring unexpected inbound envelope");
        }
    }
}

/// Waits for the initial `join` frame and returns the joining user.
///
/// Returns `None` if the connection closes, errors, or sends anything
/// other than a valid `join` first.
async fn wait_for_join(
    ws_receiver: &mut (impl StreamExt<Item = Result<WsMessage, axum::Error>> + Unpin),
) -> Option<UserId> {
    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => match codec::decode(text.as_str()) {
                Ok(Envelope::Join { user_id }) => return Some(user_id),
                Ok(_) => {
                    tracing::warn!("first frame was not join, closing");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "malformed frame before join, closing");
                    return None;
                }
            },
            Ok(WsMessage::Close(_)) | Err(_) => return None,
            Ok(_) => {
                // Skip ping/pong noise before the join frame.
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// REST endpoints
// ---------------------------------------------------------------------------

/// `GET /messages/{a}/{b}` — full history for the pair, both directions,
/// ordered by creation time.
async fn get_history(
    Path((a, b)): Path<(String, String)>,
    State(state): State<Arc<HubState>>,
) -> Json<Vec<Message>> {
    let history = state.store.history(&UserId::new(a), &UserId::new(b));
    Json(history)
}

/// `POST /messages` — persist a draft and return the stored message.
async fn post_message(
    State(state): State<Arc<HubState>>,
    Json(draft): Json<MessageDraft>,
) -> impl IntoResponse {
    let stored = state.store.insert(draft);
    tracing::debug!(from = %stored.sender, to = %stored.receiver, "message persisted");
    (StatusCode::CREATED, Json(stored))
}

/// `PATCH /messages/{id}/seen` — idempotent seen flip; 404 for unknown ids.
async fn patch_seen(
    Path(id): Path<String>,
    State(state): State<Arc<HubState>>,
) -> impl IntoResponse {
    match state.store.mark_seen(&MessageId::new(id)) {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(StoreError::NotFound(id)) => {
            tracing::debug!(id = %id, "mark-seen for unknown message");
            StatusCode::NOT_FOUND
        }
    }
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    State(state): State<Arc<HubState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Builds the full axum router over a shared [`HubState`].
pub fn router(state: Arc<HubState>) -> axum::Router {
    axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .route("/messages/{a}/{b}", axum::routing::get(get_history))
        .route("/messages", axum::routing::post(post_message))
        .route("/messages/{id}/seen", axum::routing::patch(patch_seen))
        .with_state(state)
}

/// Starts the hub on the given address with fresh state.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(HubState::new())).await
}

/// Starts the hub with a pre-configured [`HubState`].
///
/// Binds, then serves on a background task. Returns the bound address
/// (useful with `127.0.0.1:0`) and the task handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<HubState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "hub server error");
        }
    });

    Ok((bound_addr, handle))
}
