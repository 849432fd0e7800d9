//! Client coordinator wiring the frontend to the async networking stack.
//!
//! Spawns background tokio tasks and communicates with the caller via
//! [`Command`] / [`Event`] channels:
//!
//! ```text
//! frontend (main task)  ←── Event ────  tokio background tasks
//!                        ─── Command →
//! ```
//!
//! Tasks:
//! 1. A **connection supervisor** that owns the live [`SocketTransport`],
//!    dispatches inbound envelopes through the [`SignalRouter`], and
//!    reconnects with bounded exponential backoff when the link drops.
//! 2. A **reconciliation poller** that re-fetches the open conversation's
//!    history on a fixed interval and replaces the visible list.
//! 3. **Signal consumers** for message, presence, and typing pushes.
//! 4. A **typing expiry** task that turns indicators off once their
//!    window elapses without a fresh notification.
//! 5. A **command handler** for peer selection, sending, and shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{RwLock, mpsc};

use wirechat_proto::envelope::Envelope;
use wirechat_proto::message::{Message, MessageDraft, UserId, validate_content};

use crate::api::ApiClient;
use crate::config::ClientConfig;
use crate::conversation::{ConversationStore, PushOutcome};
use crate::presence::{PresenceSet, TypingTracker};
use crate::router::SignalRouter;
use crate::transport::socket::SocketTransport;
use crate::transport::{Transport, TransportError};

/// Commands sent from the frontend to the background tasks.
#[derive(Debug)]
pub enum Command {
    /// Open the conversation with a roster peer.
    SelectPeer(UserId),
    /// Close the open conversation.
    ClearSelection,
    /// Send a text message to the active peer.
    SendMessage {
        /// The message text to send.
        text: String,
    },
    /// Announce that the local user is typing.
    Typing,
    /// Gracefully shut down the background tasks.
    Shutdown,
}

/// Events sent from the background tasks to the frontend.
#[derive(Debug, Clone)]
pub enum Event {
    /// The visible conversation list was replaced wholesale (peer
    /// selection completed, or a reconciliation pull landed).
    ConversationReplaced {
        /// The peer the list belongs to.
        peer: UserId,
        /// The authoritative message list.
        messages: Vec<Message>,
    },
    /// One message was appended to the visible list (a live push from
    /// the active peer, or the local echo of an outgoing send).
    MessageAppended(Message),
    /// A non-active peer's unread counter changed.
    UnreadChanged {
        /// The peer whose counter changed.
        peer: UserId,
        /// The new count.
        count: u32,
    },
    /// The online-users list was replaced.
    PresenceChanged(Vec<UserId>),
    /// A peer's typing indicator turned on or off.
    TypingChanged {
        /// Whose indicator.
        user: UserId,
        /// On or off.
        typing: bool,
    },
    /// Connection status update.
    Connectivity {
        /// Whether the WebSocket link is currently up.
        connected: bool,
    },
    /// A non-fatal error the frontend may want to surface.
    Error(String),
}

/// Errors from spawning or driving the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The initial WebSocket connection failed.
    #[error("connection failed: {0}")]
    Connect(#[from] TransportError),
}

/// Slot holding the currently live transport, if any.
///
/// The supervisor is the only writer; senders read it and treat an empty
/// slot as "offline, drop the frame".
type TransportSlot = Arc<RwLock<Option<Arc<SocketTransport>>>>;

struct ClientState {
    config: ClientConfig,
    api: ApiClient,
    conversation: Mutex<ConversationStore>,
    presence: Mutex<PresenceSet>,
    typing: Mutex<TypingTracker>,
    transport: TransportSlot,
}

/// Spawn the client background tasks and return channel handles.
///
/// Establishes the first WebSocket connection before returning, so a bad
/// server URL fails fast; subsequent drops are handled by the supervisor's
/// reconnect loop instead.
///
/// # Errors
///
/// Returns [`ClientError::Connect`] if the initial connection cannot be
/// established within the configured timeout.
pub async fn spawn_client(
    config: ClientConfig,
) -> Result<(mpsc::Sender<Command>, mpsc::Receiver<Event>), ClientError> {
    let transport = SocketTransport::connect_with_timeout(
        &config.server_url,
        config.user_id.clone(),
        config.connect_timeout,
    )
    .await?;

    let api = ApiClient::new(config.api_url.clone(), config.mark_seen_retries);
    let state = Arc::new(ClientState {
        conversation: Mutex::new(ConversationStore::new(
            config.user_id.clone(),
            config.peers.clone(),
        )),
        presence: Mutex::new(PresenceSet::new()),
        typing: Mutex::new(TypingTracker::new(config.typing_window)),
        transport: Arc::new(RwLock::new(Some(Arc::new(transport)))),
        api,
        config,
    });

    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(state.config.channel_capacity);
    let (evt_tx, evt_rx) = mpsc::channel::<Event>(state.config.channel_capacity);

    let router = Arc::new(SignalRouter::new());
    let message_rx = router.subscribe_messages();
    let presence_rx = router.subscribe_presence();
    let typing_rx = router.subscribe_typing();

    let _ = evt_tx.send(Event::Connectivity { connected: true }).await;

    tokio::spawn(supervisor_loop(
        Arc::clone(&state),
        Arc::clone(&router),
        evt_tx.clone(),
    ));
    tokio::spawn(message_consumer(
        Arc::clone(&state),
        message_rx,
        evt_tx.clone(),
    ));
    tokio::spawn(presence_consumer(
        Arc::clone(&state),
        presence_rx,
        evt_tx.clone(),
    ));
    tokio::spawn(typing_consumer(
        Arc::clone(&state),
        typing_rx,
        evt_tx.clone(),
    ));
    tokio::spawn(typing_expiry_loop(Arc::clone(&state), evt_tx.clone()));
    tokio::spawn(reconcile_loop(Arc::clone(&state), evt_tx.clone()));
    tokio::spawn(command_handler(state, cmd_rx, evt_tx));

    Ok((cmd_tx, evt_rx))
}

/// Background task: drive the live transport and reconnect on drop.
///
/// Drains `recv()` into the router until the connection closes, then
/// clears the slot, emits `Connectivity { connected: false }`, and retries
/// with exponential backoff (doubling from `initial_backoff`, clamped to
/// `max_backoff`). A successful reconnect resets the backoff and re-emits
/// `Connectivity { connected: true }`; the join announce rides the new
/// connection, so presence recovers without client-side replays.
async fn supervisor_loop(
    state: Arc<ClientState>,
    router: Arc<SignalRouter>,
    evt_tx: mpsc::Sender<Event>,
) {
    let policy = state.config.reconnect.clone();

    loop {
        // A transport is in the slot on first entry (spawn_client put it
        // there) and after every successful reconnect below.
        let transport = state.transport.read().await.clone();
        if let Some(transport) = transport {
            read_until_closed(&transport, &router).await;
            tracing::info!("connection lost");
            *state.transport.write().await = None;
            if evt_tx
                .send(Event::Connectivity { connected: false })
                .await
                .is_err()
            {
                return;
            }
        }

        // Reconnect with bounded exponential backoff.
        let mut backoff = policy.initial_backoff;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            if let Some(max) = policy.max_attempts
                && attempt > max
            {
                tracing::error!(attempts = max, "giving up on reconnection");
                let _ = evt_tx
                    .send(Event::Error("reconnection attempts exhausted".into()))
                    .await;
                return;
            }

            tokio::time::sleep(backoff).await;
            match SocketTransport::connect_with_timeout(
                &state.config.server_url,
                state.config.user_id.clone(),
                state.config.connect_timeout,
            )
            .await
            {
                Ok(transport) => {
                    tracing::info!(attempt, "reconnected");
                    *state.transport.write().await = Some(Arc::new(transport));
                    if evt_tx
                        .send(Event::Connectivity { connected: true })
                        .await
                        .is_err()
                    {
                        return;
                    }
                    break;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, backoff = ?backoff, "reconnect failed");
                    backoff = (backoff * 2).min(policy.max_backoff);
                }
            }
        }
    }
}

/// Drain one connection into the router until it closes.
async fn read_until_closed(transport: &SocketTransport, router: &SignalRouter) {
    loop {
        match transport.recv().await {
            Ok(envelope) => router.dispatch(envelope),
            Err(_) => return,
        }
    }
}

/// Background task: apply pushed messages to the conversation store.
async fn message_consumer(
    state: Arc<ClientState>,
    mut rx: mpsc::UnboundedReceiver<Message>,
    evt_tx: mpsc::Sender<Event>,
) {
    while let Some(message) = rx.recv().await {
        let outcome = state.conversation.lock().apply_push(message.clone());
        let event = match outcome {
            PushOutcome::Appended { mark_seen } => {
                if let Some(id) = mark_seen {
                    let api = state.api.clone();
                    tokio::spawn(async move {
                        if let Err(e) = api.mark_seen(&id).await {
                            tracing::warn!(id = %id, error = %e, "mark-seen failed");
                        }
                    });
                }
                Event::MessageAppended(message)
            }
            PushOutcome::Unread { sender, count } => Event::UnreadChanged {
                peer: sender,
                count,
            },
            PushOutcome::Ignored => continue,
        };
        if evt_tx.send(event).await.is_err() {
            return;
        }
    }
}

/// Background task: replace the presence set on every push.
async fn presence_consumer(
    state: Arc<ClientState>,
    mut rx: mpsc::UnboundedReceiver<Vec<UserId>>,
    evt_tx: mpsc::Sender<Event>,
) {
    while let Some(users) = rx.recv().await {
        let changed = state.presence.lock().replace_all(users.clone());
        if changed && evt_tx.send(Event::PresenceChanged(users)).await.is_err() {
            return;
        }
    }
}

/// Background task: arm typing indicators from pushes.
///
/// Only the active peer's notices surface. Anyone else typing is not
/// visible state in this client, same scoping as the message list.
async fn typing_consumer(
    state: Arc<ClientState>,
    mut rx: mpsc::UnboundedReceiver<UserId>,
    evt_tx: mpsc::Sender<Event>,
) {
    while let Some(user) = rx.recv().await {
        if state.conversation.lock().active_peer() != Some(&user) {
            tracing::trace!(user = %user, "typing notice outside the open conversation");
            continue;
        }
        let turned_on = state.typing.lock().notify(user.clone(), Instant::now());
        if turned_on
            && evt_tx
                .send(Event::TypingChanged { user, typing: true })
                .await
                .is_err()
        {
            return;
        }
    }
}

/// Background task: turn typing indicators off as their windows elapse.
async fn typing_expiry_loop(state: Arc<ClientState>, evt_tx: mpsc::Sender<Event>) {
    // Sleeping to the earliest deadline keeps expiry prompt without a
    // tight tick; the floor guards against a deadline in the past.
    loop {
        let sleep_for = {
            let typing = state.typing.lock();
            typing
                .next_deadline()
                .map_or(state.config.typing_window, |deadline| {
                    deadline.saturating_duration_since(Instant::now())
                })
        }
        .max(Duration::from_millis(25));
        tokio::time::sleep(sleep_for).await;

        let expired = state.typing.lock().expire(Instant::now());
        for user in expired {
            if evt_tx
                .send(Event::TypingChanged {
                    user,
                    typing: false,
                })
                .await
                .is_err()
            {
                return;
            }
        }
    }
}

/// Background task: periodically re-fetch the open conversation.
///
/// Every `poll_interval`, snapshots the active peer and generation, pulls
/// the full history from the REST API, and applies it. The generation
/// guard in [`ConversationStore::apply_history`] drops the response if the
/// user switched peers while the fetch was in flight. A fresh list may
/// contain newly persisted unseen messages, so each pull is followed by
/// mark-seen calls for whatever it surfaced.
async fn reconcile_loop(state: Arc<ClientState>, evt_tx: mpsc::Sender<Event>) {
    let mut interval = tokio::time::interval(state.config.poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;

        let Some((peer, generation)) = ({
            let conversation = state.conversation.lock();
            conversation
                .active_peer()
                .cloned()
                .map(|peer| (peer, conversation.generation()))
        }) else {
            continue;
        };

        if fetch_and_apply(&state, &evt_tx, &peer, generation).await.is_err() {
            return;
        }
    }
}

/// Pull the history for `peer`, apply it under the generation guard, and
/// mark newly surfaced messages seen. `Err` means the event channel is
/// gone and the calling task should exit.
async fn fetch_and_apply(
    state: &ClientState,
    evt_tx: &mpsc::Sender<Event>,
    peer: &UserId,
    generation: u64,
) -> Result<(), ()> {
    let self_id = state.config.user_id.clone();
    let messages = match state.api.history(&self_id, peer).await {
        Ok(messages) => messages,
        Err(e) => {
            tracing::warn!(peer = %peer, error = %e, "history fetch failed");
            return Ok(());
        }
    };

    // Emit the list as the store holds it after the local seen-flip, so
    // the frontend never renders a state the store has already left.
    let (unseen, messages) = {
        let mut conversation = state.conversation.lock();
        if !conversation.apply_history(generation, messages) {
            return Ok(());
        }
        let unseen = conversation.unseen_from(peer);
        conversation.mark_seen_local(peer);
        (unseen, conversation.messages().to_vec())
    };

    if evt_tx
        .send(Event::ConversationReplaced {
            peer: peer.clone(),
            messages,
        })
        .await
        .is_err()
    {
        return Err(());
    }

    for id in unseen {
        if let Err(e) = state.api.mark_seen(&id).await {
            tracing::warn!(id = %id, error = %e, "mark-seen failed");
        }
    }
    Ok(())
}

/// Background task: handle commands from the frontend.
async fn command_handler(
    state: Arc<ClientState>,
    mut cmd_rx: mpsc::Receiver<Command>,
    evt_tx: mpsc::Sender<Event>,
) {
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            Command::SelectPeer(peer) => {
                let outcome = state.conversation.lock().select_peer(&peer);
                match outcome {
                    Ok(outcome) => {
                        for id in outcome.unseen {
                            if let Err(e) = state.api.mark_seen(&id).await {
                                tracing::warn!(id = %id, error = %e, "mark-seen failed");
                            }
                        }
                        // First fetch straight away; the poller keeps it
                        // fresh from here.
                        if fetch_and_apply(&state, &evt_tx, &peer, outcome.generation)
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = evt_tx.send(Event::Error(e.to_string())).await;
                    }
                }
            }
            Command::ClearSelection => {
                state.conversation.lock().clear_selection();
            }
            Command::SendMessage { text } => {
                if let Err(()) = handle_send(&state, &evt_tx, text).await {
                    return;
                }
            }
            Command::Typing => {
                let envelope = Envelope::Typing {
                    user_id: state.config.user_id.clone(),
                };
                send_best_effort(&state.transport, &envelope).await;
            }
            Command::Shutdown => {
                tracing::info!("client command handler shutting down");
                if let Some(transport) = state.transport.write().await.take() {
                    drop(transport);
                }
                return;
            }
        }
    }
}

/// Send one message: optimistic local echo, fire-and-forget live push,
/// and a REST persist (the sole durability path).
async fn handle_send(
    state: &ClientState,
    evt_tx: &mpsc::Sender<Event>,
    text: String,
) -> Result<(), ()> {
    let Some(peer) = state.conversation.lock().active_peer().cloned() else {
        let _ = evt_tx
            .send(Event::Error("no conversation selected".into()))
            .await;
        return Ok(());
    };

    if let Err(e) = validate_content(&text) {
        let _ = evt_tx.send(Event::Error(e.to_string())).await;
        return Ok(());
    }

    let local = Message {
        id: None,
        sender: state.config.user_id.clone(),
        receiver: peer.clone(),
        content: text.clone(),
        created_at: chrono::Utc::now(),
        seen: false,
    };
    state.conversation.lock().append_local(local.clone());
    if evt_tx.send(Event::MessageAppended(local)).await.is_err() {
        return Err(());
    }

    // Live push first so the peer sees it immediately; the next
    // reconciliation pull swaps the optimistic copy for the persisted one.
    let envelope = Envelope::SendMessage {
        sender: state.config.user_id.clone(),
        receiver: peer.clone(),
        content: text.clone(),
    };
    send_best_effort(&state.transport, &envelope).await;

    let draft = MessageDraft {
        sender: state.config.user_id.clone(),
        receiver: peer,
        content: text,
    };
    let api = state.api.clone();
    let evt_tx = evt_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = api.persist(&draft).await {
            tracing::warn!(error = %e, "message persist failed");
            let _ = evt_tx
                .send(Event::Error(format!("message not saved: {e}")))
                .await;
        }
    });
    Ok(())
}

/// Write a frame to the live transport if there is one; drops the frame
/// silently when offline or mid-reconnect.
async fn send_best_effort(slot: &TransportSlot, envelope: &Envelope) {
    let transport = slot.read().await.clone();
    if let Some(transport) = transport {
        if let Err(e) = transport.send(envelope).await {
            tracing::debug!(error = %e, "live push dropped");
        }
    } else {
        tracing::debug!("live push dropped: offline");
    }
}
