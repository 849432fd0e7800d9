//! Online-presence roster and the self-expiring typing indicator.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use wirechat_proto::message::UserId;

/// Who is currently online, replaced wholesale on every presence push.
#[derive(Debug, Default)]
pub struct PresenceSet {
    online: BTreeSet<UserId>,
}

impl PresenceSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole set with the server's latest list.
    ///
    /// The list is authoritative: users absent from it are gone, no
    /// matter what the previous set said. Returns `true` if anything
    /// changed.
    pub fn replace_all(&mut self, users: Vec<UserId>) -> bool {
        let next: BTreeSet<UserId> = users.into_iter().collect();
        if next == self.online {
            return false;
        }
        self.online = next;
        true
    }

    /// Whether `user` is in the current set.
    #[must_use]
    pub fn is_online(&self, user: &UserId) -> bool {
        self.online.contains(user)
    }

    /// The current set, sorted.
    #[must_use]
    pub fn users(&self) -> Vec<UserId> {
        self.online.iter().cloned().collect()
    }
}

/// Per-user typing indicator with a sliding expiry window.
///
/// Every typing notification re-arms that user's window; the indicator
/// only clears once the window elapses with no further notification.
/// Time is passed in explicitly so expiry is testable without sleeping.
#[derive(Debug)]
pub struct TypingTracker {
    window: Duration,
    deadlines: HashMap<UserId, Instant>,
}

impl TypingTracker {
    /// Creates a tracker whose indicators last `window` past the most
    /// recent notification.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadlines: HashMap::new(),
        }
    }

    /// Record a typing notification from `user` at `now`.
    ///
    /// Returns `true` if the indicator just turned on (it was off before).
    pub fn notify(&mut self, user: UserId, now: Instant) -> bool {
        let was_on = self.is_typing_at(&user, now);
        self.deadlines.insert(user, now + self.window);
        !was_on
    }

    /// Whether `user`'s indicator is on at `now`.
    #[must_use]
    pub fn is_typing_at(&self, user: &UserId, now: Instant) -> bool {
        self.deadlines.get(user).is_some_and(|d| *d > now)
    }

    /// Drop expired entries, returning the users whose indicator just
    /// turned off.
    pub fn expire(&mut self, now: Instant) -> Vec<UserId> {
        let expired: Vec<UserId> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(user, _)| user.clone())
            .collect();
        for user in &expired {
            self.deadlines.remove(user);
        }
        expired
    }

    /// The earliest pending deadline, if any indicator is armed.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }
}
