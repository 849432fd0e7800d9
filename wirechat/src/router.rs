//! Signal router: demultiplexes inbound envelopes to subscribers.
//!
//! Inbound frames fall into three categories — message, presence, typing —
//! and each category carries an ordered list of subscribers instead of a
//! single last-write-wins callback slot. Dispatch fans a signal out to
//! every live subscriber and prunes the ones whose receiver was dropped.
//! Envelopes that only travel client→server (`join`, `send-message`) and
//! unknown tags are ignored with a debug log.

use parking_lot::Mutex;
use tokio::sync::mpsc;

use wirechat_proto::envelope::Envelope;
use wirechat_proto::message::{Message, UserId};

/// Fan-out router from inbound envelopes to category subscribers.
#[derive(Default)]
pub struct SignalRouter {
    message_subs: Mutex<Vec<mpsc::UnboundedSender<Message>>>,
    presence_subs: Mutex<Vec<mpsc::UnboundedSender<Vec<UserId>>>>,
    typing_subs: Mutex<Vec<mpsc::UnboundedSender<UserId>>>,
}

impl SignalRouter {
    /// Creates a router with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to pushed messages (`receive-message` envelopes).
    pub fn subscribe_messages(&self) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.message_subs.lock().push(tx);
        rx
    }

    /// Subscribe to presence replacements (`online-users` envelopes).
    pub fn subscribe_presence(&self) -> mpsc::UnboundedReceiver<Vec<UserId>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.presence_subs.lock().push(tx);
        rx
    }

    /// Subscribe to typing notices (`typing` envelopes).
    pub fn subscribe_typing(&self) -> mpsc::UnboundedReceiver<UserId> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.typing_subs.lock().push(tx);
        rx
    }

    /// Dispatch one inbound envelope to the matching category.
    pub fn dispatch(&self, envelope: Envelope) {
        match envelope {
            Envelope::ReceiveMessage { message } => {
                Self::fan_out(&self.message_subs, &message);
            }
            Envelope::OnlineUsers { users } => {
                Self::fan_out(&self.presence_subs, &users);
            }
            Envelope::Typing { user_id } => {
                Self::fan_out(&self.typing_subs, &user_id);
            }
            Envelope::Join { .. } | Envelope::SendMessage { .. } => {
                tracing::debug!("ignoring client-to-server envelope arriving inbound");
            }
            Envelope::Unknown => {
                tracing::debug!("ignoring envelope with unknown type tag");
            }
        }
    }

    /// Clone the signal to every live subscriber, dropping closed ones.
    fn fan_out<T: Clone>(subs: &Mutex<Vec<mpsc::UnboundedSender<T>>>, signal: &T) {
        subs.lock().retain(|tx| tx.send(signal.clone()).is_ok());
    }
}
