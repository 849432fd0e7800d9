//! Message model shared by the client and the backend.
//!
//! All types in this module represent server-visible state: messages are
//! created optimistically on the client (without an id) or authoritatively
//! by the backend (with a server-assigned id and timestamp), and exchanged
//! as JSON over both the REST API and the WebSocket connection.

use serde::{Deserialize, Serialize};

/// Maximum allowed message content size in bytes (64 KB).
pub const MAX_CONTENT_SIZE: usize = 64 * 1024;

/// Millisecond-precision UTC timestamp, serialized as an RFC 3339 string.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identifies a user account. Opaque, server-assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create a new user identifier from a string representation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the string representation of this user ID.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a persisted message. Assigned by the backend on persist;
/// a locally-originated optimistic message has none yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Create a new message identifier from a string representation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the string representation of this message ID.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The unordered pair of users a conversation belongs to.
///
/// Construction normalizes the order, so `new(a, b) == new(b, a)` and the
/// key can be used for map lookups regardless of which side built it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    low: UserId,
    high: UserId,
}

impl ConversationKey {
    /// Build the key for a conversation between two users.
    #[must_use]
    pub fn new(a: UserId, b: UserId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    /// Whether the given user is one of the two participants.
    #[must_use]
    pub fn contains(&self, user: &UserId) -> bool {
        &self.low == user || &self.high == user
    }

    /// The two participants in normalized order.
    #[must_use]
    pub const fn sides(&self) -> (&UserId, &UserId) {
        (&self.low, &self.high)
    }
}

/// A direct message between two users.
///
/// `id` is `None` only for optimistic local inserts; every message coming
/// back from the backend carries one. `seen` flips to `true` at most once
/// and the message is never deleted client-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned identifier (`_id` on the wire).
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    /// The user who sent the message.
    pub sender: UserId,
    /// The user the message is addressed to.
    pub receiver: UserId,
    /// Plain-text message body.
    pub content: String,
    /// Creation time: locally stamped on optimistic insert, replaced by
    /// the server clock once persisted.
    #[serde(rename = "createdAt")]
    pub created_at: Timestamp,
    /// Whether the receiver has seen this message.
    #[serde(default)]
    pub seen: bool,
}

impl Message {
    /// The conversation this message belongs to.
    #[must_use]
    pub fn conversation_key(&self) -> ConversationKey {
        ConversationKey::new(self.sender.clone(), self.receiver.clone())
    }
}

/// A not-yet-persisted message, as posted to the backend and carried in
/// `send-message` envelopes. The backend assigns id, timestamp and the
/// initial `seen: false` on persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDraft {
    /// The user sending the message.
    pub sender: UserId,
    /// The user the message is addressed to.
    pub receiver: UserId,
    /// Plain-text message body.
    pub content: String,
}

/// Error returned when message content fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Content is empty or whitespace-only.
    #[error("message content is empty")]
    Empty,
    /// Content exceeds the maximum allowed size.
    #[error("message too large ({size} bytes, max {max} bytes)")]
    TooLarge {
        /// Actual size of the content in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },
}

/// Validates message content before sending.
///
/// # Errors
///
/// Returns [`ValidationError::Empty`] for empty or whitespace-only content,
/// or [`ValidationError::TooLarge`] when it exceeds [`MAX_CONTENT_SIZE`].
pub fn validate_content(content: &str) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::Empty);
    }
    let size = content.len();
    if size > MAX_CONTENT_SIZE {
        return Err(ValidationError::TooLarge {
            size,
            max: MAX_CONTENT_SIZE,
        });
    }
    Ok(())
}
