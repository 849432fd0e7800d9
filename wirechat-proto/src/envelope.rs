//! Tagged wire envelopes exchanged over the persistent connection.
//!
//! Every frame on the socket is a JSON object whose `type` field selects
//! the shape of the remaining fields. Tags the client does not know are
//! decoded into [`Envelope::Unknown`] and ignored by the router, so the
//! backend can grow the protocol without breaking older clients.

use serde::{Deserialize, Serialize};

use crate::message::{Message, UserId};

/// A tagged message unit exchanged over the persistent connection.
///
/// Client→server: `join`, `send-message`, `typing`.
/// Server→client: `receive-message`, `online-users`, `typing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Envelope {
    /// Announces the connecting user; first frame after the socket opens.
    Join {
        /// The user this connection belongs to.
        #[serde(rename = "userId")]
        user_id: UserId,
    },
    /// Asks the server to deliver a message live to the receiver.
    ///
    /// Delivery only: durability goes through the REST API, so a dropped
    /// `send-message` (receiver offline) is recovered by the next history
    /// fetch, never re-sent on this channel.
    SendMessage {
        /// Sender of the message (the joined user; the server enforces this).
        sender: UserId,
        /// Intended receiver.
        receiver: UserId,
        /// Plain-text message body.
        content: String,
    },
    /// Delivers an inbound message pushed by the server.
    ReceiveMessage {
        /// The pushed message.
        message: Message,
    },
    /// A keystroke notice. Carries only the typist; there is no explicit
    /// "stopped typing" frame — receivers expire the indicator themselves.
    Typing {
        /// The user who is typing.
        #[serde(rename = "userId")]
        user_id: UserId,
    },
    /// Full replacement of the set of currently-online users.
    OnlineUsers {
        /// Every user the server currently considers online.
        users: Vec<UserId>,
    },
    /// Any tag this client does not understand.
    #[serde(other)]
    Unknown,
}
