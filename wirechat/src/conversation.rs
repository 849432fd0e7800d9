//! Client-side conversation state: active peer, message list, unread
//! counters, and the generation token that guards stale fetches.
//!
//! The list is kept fresh two ways: pushed `receive-message` envelopes
//! append immediately, and a periodic full history fetch replaces the
//! list wholesale. The replace is unconditional (for the current
//! generation), which is also what reconciles optimistic local inserts
//! against their server-persisted copies — there is deliberately no
//! client-side dedup.

use std::collections::HashMap;

use wirechat_proto::message::{Message, MessageId, UserId};

/// Lifecycle of the visible conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    /// No peer selected; nothing to show.
    NoneSelected,
    /// A peer was selected and the first history fetch is in flight.
    Loading,
    /// History has arrived; the list is live (push + pull).
    Active,
}

/// Monotonic token identifying one selection of a conversation.
///
/// Every peer switch bumps it; a history response is applied only if its
/// token still matches, so a slow fetch for conversation A can never land
/// after the user has moved on to conversation B.
pub type Generation = u64;

/// What happened to a pushed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Appended to the visible list. `mark_seen` carries the id to PATCH
    /// when the message is addressed to us, unseen, and persisted.
    Appended {
        /// Message id to mark seen via the REST API, if any.
        mark_seen: Option<MessageId>,
    },
    /// From a non-active peer: the sender's unread counter was bumped,
    /// nothing was appended. The UI plays its notification here.
    Unread {
        /// Who sent the message.
        sender: UserId,
        /// The sender's unread count after the bump.
        count: u32,
    },
    /// Not addressed to this user; dropped without touching any state.
    Ignored,
}

/// Result of selecting a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOutcome {
    /// Token the subsequent history fetch must carry.
    pub generation: Generation,
    /// Locally known unseen messages from the peer, to mark seen.
    pub unseen: Vec<MessageId>,
}

/// Errors from conversation operations.
#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    /// The requested peer is not in the roster.
    #[error("unknown peer: {0}")]
    UnknownPeer(UserId),
}

/// In-memory state for the message view of one logged-in user.
pub struct ConversationStore {
    self_id: UserId,
    roster: Vec<UserId>,
    active: Option<UserId>,
    state: ConversationState,
    messages: Vec<Message>,
    unread: HashMap<UserId, u32>,
    generation: Generation,
}

impl ConversationStore {
    /// Creates an empty store for `self_id` with the selectable peers.
    #[must_use]
    pub fn new(self_id: UserId, roster: Vec<UserId>) -> Self {
        Self {
            self_id,
            roster,
            active: None,
            state: ConversationState::NoneSelected,
            messages: Vec::new(),
            unread: HashMap::new(),
            generation: 0,
        }
    }

    /// The logged-in user.
    #[must_use]
    pub const fn self_id(&self) -> &UserId {
        &self.self_id
    }

    /// The selectable peers.
    #[must_use]
    pub fn roster(&self) -> &[UserId] {
        &self.roster
    }

    /// The currently selected peer, if any.
    #[must_use]
    pub const fn active_peer(&self) -> Option<&UserId> {
        self.active.as_ref()
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConversationState {
        self.state
    }

    /// Current generation token.
    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    /// The visible message list.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Unread count for a peer (0 when absent).
    #[must_use]
    pub fn unread_count(&self, peer: &UserId) -> u32 {
        self.unread.get(peer).copied().unwrap_or(0)
    }

    /// Select a peer, entering `Loading` for a fresh history fetch.
    ///
    /// Bumps the generation (invalidating any in-flight fetch for the
    /// previous selection), clears the peer's unread counter, flips the
    /// locally known unseen messages from them and returns those ids so
    /// the caller can issue the mark-seen calls.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::UnknownPeer`] if the peer is not in
    /// the roster.
    pub fn select_peer(&mut self, peer: &UserId) -> Result<SelectOutcome, ConversationError> {
        if !self.roster.contains(peer) {
            return Err(ConversationError::UnknownPeer(peer.clone()));
        }

        self.active = Some(peer.clone());
        self.state = ConversationState::Loading;
        self.generation += 1;
        self.unread.remove(peer);

        let unseen = self.unseen_from(peer);
        self.mark_seen_local(peer);

        Ok(SelectOutcome {
            generation: self.generation,
            unseen,
        })
    }

    /// Drop the selection and visible list.
    pub fn clear_selection(&mut self) {
        self.active = None;
        self.state = ConversationState::NoneSelected;
        self.messages.clear();
        self.generation += 1;
    }

    /// Apply a fetched history for the given generation.
    ///
    /// Replaces the visible list unconditionally and enters `Active` —
    /// unless the generation is stale (the user has switched peers since
    /// the fetch started), in which case the response is dropped and
    /// `false` is returned.
    pub fn apply_history(&mut self, generation: Generation, messages: Vec<Message>) -> bool {
        if generation != self.generation || self.active.is_none() {
            tracing::debug!(
                stale = generation,
                current = self.generation,
                "dropping stale history response"
            );
            return false;
        }
        self.messages = messages;
        self.state = ConversationState::Active;
        true
    }

    /// Apply a pushed inbound message.
    ///
    /// A message from the active peer is appended to the visible list
    /// (exactly one entry per push); one from anyone else bumps that
    /// sender's unread counter. A message not addressed to us at all is
    /// ignored — the backend should never route one here.
    pub fn apply_push(&mut self, message: Message) -> PushOutcome {
        if message.receiver != self.self_id {
            tracing::debug!(
                sender = %message.sender,
                receiver = %message.receiver,
                "dropping pushed message not addressed to this user"
            );
            return PushOutcome::Ignored;
        }

        if self.active.as_ref() != Some(&message.sender) {
            let count = self.unread.entry(message.sender.clone()).or_insert(0);
            *count += 1;
            return PushOutcome::Unread {
                sender: message.sender,
                count: *count,
            };
        }

        let mark_seen = if message.seen {
            None
        } else {
            message.id.clone()
        };
        self.messages.push(message);
        PushOutcome::Appended { mark_seen }
    }

    /// Optimistically append a locally-originated message.
    pub fn append_local(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Ids of persisted messages from `peer` to us that are still unseen.
    #[must_use]
    pub fn unseen_from(&self, peer: &UserId) -> Vec<MessageId> {
        self.messages
            .iter()
            .filter(|m| m.sender == *peer && m.receiver == self.self_id && !m.seen)
            .filter_map(|m| m.id.clone())
            .collect()
    }

    /// Locally flip every message from `peer` to us to seen.
    pub fn mark_seen_local(&mut self, peer: &UserId) {
        for message in &mut self.messages {
            if message.sender == *peer && message.receiver == self.self_id {
                message.seen = true;
            }
        }
    }
}
