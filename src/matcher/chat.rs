//! Mutual-match detection and the chat confirmation handshake.
//!
//! A chat exists from the moment two users right-swipe each other, but stays
//! unconfirmed until both accept it. Rejection only hides the record.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::{EventKind, Group, MatchError, NotificationHub};

/// Key of the one chat an unordered pair can have: both ids, sorted and
/// joined, so the key is the same no matter who swiped first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(String);

impl ChatId {
    pub fn of(a: Uuid, b: Uuid) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{lo}!{hi}"))
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub sender: Uuid,
    pub message: String,
}

/// A two-party conversation. `accepted` is always a subset of the
/// participants; the chat is confirmed exactly when they are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub hidden: bool,
    pub participants: IndexMap<Uuid, String>,
    pub accepted: IndexSet<Uuid>,
    pub messages: Vec<ChatMessage>,
}

/// Promotes a mutual right-swipe into a match: records each user in the
/// other's matches, spawns their chat and notifies both. Does nothing if the
/// swipe is still one-sided.
pub(super) fn check_match(group: &mut Group, hub: &NotificationHub, a: Uuid, b: Uuid) {
    let mutual = match (group.users.get(&a), group.users.get(&b)) {
        (Some(user_a), Some(user_b)) => {
            user_a.right_swipes.contains(&b) && user_b.right_swipes.contains(&a)
        }
        _ => false,
    };
    if !mutual {
        return;
    }

    debug!(%a, %b, "mutual right swipe");
    if let Some(user_a) = group.users.get_mut(&a) {
        user_a.matches.insert(b);
    }
    if let Some(user_b) = group.users.get_mut(&b) {
        user_b.matches.insert(a);
    }
    spawn_chat(group, hub, a, b);
    hub.fire(EventKind::Matched, a, group);
    hub.fire(EventKind::Matched, b, group);
}

/// Creates the pair's chat and seeds it with one greeting from each side.
/// A pair gets exactly one chat; a repeat match never replaces it.
pub(super) fn spawn_chat(group: &mut Group, hub: &NotificationHub, a: Uuid, b: Uuid) {
    let chat_id = ChatId::of(a, b);
    if group.chats.contains_key(&chat_id) {
        debug!(%chat_id, "chat already exists for this pair");
        return;
    }
    let (Some(user_a), Some(user_b)) = (group.users.get(&a), group.users.get(&b)) else {
        return;
    };

    let a_message = user_a
        .on_match_message
        .clone()
        .unwrap_or_else(|| format!("Hi, I'm {}.", user_a.name));
    let b_message = user_b
        .on_match_message
        .clone()
        .unwrap_or_else(|| format!("Hi, I'm {}.", user_b.name));

    let mut participants = IndexMap::new();
    participants.insert(a, user_a.name.clone());
    participants.insert(b, user_b.name.clone());
    group.chats.insert(
        chat_id.clone(),
        Chat { hidden: false, participants, accepted: IndexSet::new(), messages: Vec::new() },
    );
    if let Some(user_a) = group.users.get_mut(&a) {
        user_a.chats.push(chat_id.clone());
    }
    if let Some(user_b) = group.users.get_mut(&b) {
        user_b.chats.push(chat_id);
    }

    send_chat(group, hub, a, b, a_message);
    send_chat(group, hub, b, a, b_message);
}

/// Appends a message to the pair's chat and notifies both sides.
///
/// A missing chat id is dropped on the floor: the transport may race a
/// rejection and stale references are not the sender's fault.
pub(super) fn send_chat(group: &mut Group, hub: &NotificationHub, from: Uuid, to: Uuid, message: String) {
    let chat_id = ChatId::of(from, to);
    let Some(chat) = group.chats.get_mut(&chat_id) else {
        debug!(%chat_id, "dropping message for nonexistent chat");
        return;
    };

    chat.messages.push(ChatMessage { date: OffsetDateTime::now_utc(), sender: from, message });
    hub.fire(EventKind::ChatUpdated, from, group);
    hub.fire(EventKind::ChatUpdated, to, group);
}

/// Records `accepter`'s side of the handshake and checks whether the pair is
/// now confirmed.
pub(super) fn accept_match(
    group: &mut Group,
    hub: &NotificationHub,
    accepter: Uuid,
    other: Uuid,
) -> Result<(), MatchError> {
    let chat_id = ChatId::of(accepter, other);
    let chat = group.chats.get_mut(&chat_id).ok_or(MatchError::NoSuchChat)?;
    chat.accepted.insert(accepter);

    check_confirmed(group, hub, accepter, other);
    hub.fire(EventKind::ChatUpdated, other, group);
    hub.fire(EventKind::ChatUpdated, accepter, group);
    Ok(())
}

/// Hides the pair's chat. The record stays around; only visibility changes.
/// Works at any point in the handshake, confirmed or not.
pub(super) fn reject_match(
    group: &mut Group,
    hub: &NotificationHub,
    rejecter: Uuid,
    other: Uuid,
) -> Result<(), MatchError> {
    let chat_id = ChatId::of(rejecter, other);
    let chat = group.chats.get_mut(&chat_id).ok_or(MatchError::NoSuchChat)?;
    chat.hidden = true;

    debug!(%chat_id, %rejecter, "chat rejected");
    hub.fire(EventKind::ChatUpdated, other, group);
    hub.fire(EventKind::ChatUpdated, rejecter, group);
    Ok(())
}

/// True once every participant has accepted; fires the confirmation cascade
/// the first time that becomes true.
pub(super) fn check_confirmed(group: &mut Group, hub: &NotificationHub, a: Uuid, b: Uuid) -> bool {
    let chat_id = ChatId::of(a, b);
    let Some(chat) = group.chats.get(&chat_id) else {
        return false;
    };
    let confirmed = chat.participants.keys().all(|uuid| chat.accepted.contains(uuid));
    if confirmed {
        on_confirmed(group, hub, a, b);
    }
    confirmed
}

/// Terminal state for the pair: both marked taken by each other and removed
/// from every other member's review queue in one pass.
fn on_confirmed(group: &mut Group, hub: &NotificationHub, a: Uuid, b: Uuid) {
    debug!(%a, %b, "match confirmed");
    if let Some(user_a) = group.users.get_mut(&a) {
        user_a.taken = Some(b);
    }
    if let Some(user_b) = group.users.get_mut(&b) {
        user_b.taken = Some(a);
    }
    for user in group.users.values_mut() {
        user.review_queue.retain(|id| *id != a && *id != b);
    }
    hub.fire(EventKind::Confirmed, a, group);
    hub.fire(EventKind::Confirmed, b, group);
}
