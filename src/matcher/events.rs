use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use super::view::{self, EventPayload};
use super::Group;

/// The state changes a user can be notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The user's review queue changed.
    QueueUpdated,
    /// A mutual right-swipe was detected.
    Matched,
    /// Both sides accepted the chat; the pair is taken.
    Confirmed,
    /// A chat the user participates in changed.
    ChatUpdated,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::QueueUpdated,
        EventKind::Matched,
        EventKind::Confirmed,
        EventKind::ChatUpdated,
    ];
}

pub type EventHandler = Box<dyn Fn(EventPayload) + Send + Sync>;

/// Per-user, per-event-kind handler table.
///
/// One slot per `(kind, user)`: subscribing again replaces the previous
/// handler. Single-subscriber delivery is deliberate: the live session owns
/// the slot, and a reconnect re-subscribes to take it back.
#[derive(Default)]
pub struct NotificationHub {
    slots: HashMap<(EventKind, Uuid), EventHandler>,
}

impl NotificationHub {
    pub fn subscribe(&mut self, kind: EventKind, uuid: Uuid, handler: EventHandler) {
        self.slots.insert((kind, uuid), handler);
    }

    /// Drops the handler for one event kind. Returns whether a slot was
    /// occupied.
    pub fn unsubscribe(&mut self, kind: EventKind, uuid: Uuid) -> bool {
        self.slots.remove(&(kind, uuid)).is_some()
    }

    pub fn unsubscribe_all(&mut self, uuid: Uuid) {
        for kind in EventKind::ALL {
            self.slots.remove(&(kind, uuid));
        }
    }

    /// Builds the user's view and invokes their handler for `kind`.
    ///
    /// Returns whether the event was delivered; a missing handler is an
    /// expected outcome (nobody is listening), not an error.
    pub fn fire(&self, kind: EventKind, uuid: Uuid, group: &Group) -> bool {
        let Some(handler) = self.slots.get(&(kind, uuid)) else {
            return false;
        };
        let Some(payload) = view::payload(group, uuid) else {
            debug!(%uuid, ?kind, "no such user to notify");
            return false;
        };
        handler(payload);
        true
    }
}
