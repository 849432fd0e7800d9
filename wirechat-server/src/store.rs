//! In-memory message store backing the REST endpoints.
//!
//! The store is the durability layer: `POST /messages` persists exactly
//! once, history queries return both directions of a conversation, and
//! mark-seen is idempotent so client retries are harmless.

use parking_lot::RwLock;
use wirechat_proto::message::{ConversationKey, Message, MessageDraft, MessageId, UserId};

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested message does not exist.
    #[error("message not found: {0}")]
    NotFound(MessageId),
}

/// Append-only message store with seen-flag updates.
///
/// Messages are never deleted; the only mutation after insert is the
/// `seen` flag flipping to `true`.
#[derive(Default)]
pub struct MessageStore {
    messages: RwLock<Vec<Message>>,
}

impl MessageStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Persists a draft, assigning a fresh id and a server timestamp.
    ///
    /// Returns the stored message (with `seen: false`).
    pub fn insert(&self, draft: MessageDraft) -> Message {
        let message = Message {
            id: Some(MessageId::new(uuid::Uuid::now_v7().to_string())),
            sender: draft.sender,
            receiver: draft.receiver,
            content: draft.content,
            created_at: chrono::Utc::now(),
            seen: false,
        };
        self.messages.write().push(message.clone());
        message
    }

    /// Returns both directions of the conversation between `a` and `b`,
    /// ordered by creation time.
    pub fn history(&self, a: &UserId, b: &UserId) -> Vec<Message> {
        let key = ConversationKey::new(a.clone(), b.clone());
        let mut out: Vec<Message> = self
            .messages
            .read()
            .iter()
            .filter(|m| m.conversation_key() == key)
            .cloned()
            .collect();
        out.sort_by(|x, y| x.created_at.cmp(&y.created_at));
        out
    }

    /// Marks a message as seen. A second call for the same id is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no message has the given id.
    pub fn mark_seen(&self, id: &MessageId) -> Result<(), StoreError> {
        let mut messages = self.messages.write();
        for message in messages.iter_mut() {
            if message.id.as_ref() == Some(id) {
                message.seen = true;
                return Ok(());
            }
        }
        Err(StoreError::NotFound(id.clone()))
    }

    /// Number of stored messages, for diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    /// Whether the store holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }
}
