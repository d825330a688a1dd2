//! The matching engine: per-group user pools, swipe-driven review, mutual
//! match detection and the chat confirmation handshake.
//!
//! Everything in here is synchronous and in-memory. A [`Matcher`] is owned by
//! the caller (the server wraps one in a mutex); each public entry point runs
//! its full cascade of mutation and notification delivery before returning.

mod chat;
mod events;
mod ranking;
mod swipe;
mod view;

pub use chat::{Chat, ChatId, ChatMessage};
pub use events::{EventHandler, EventKind, NotificationHub};
pub use view::{EventPayload, GroupRef, PeerSummary, UserView};

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::identity;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("no such course")]
    NoSuchCourse,
    #[error("no such group")]
    NoSuchGroup,
    #[error("no such user in this group")]
    UnknownUser,
    #[error("user already joined this group")]
    AlreadyJoined,
    #[error("no chat exists for this pair")]
    NoSuchChat,
}

/// Profile fields supplied by a user when joining a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub timezone: String,
    pub bio: String,
    pub pitch: String,
    /// Greeting posted on the user's behalf when a chat is spawned.
    /// `None` falls back to a stock introduction.
    pub on_match_message: Option<String>,
}

/// A member of exactly one group.
///
/// `right_swipes`, `left_swipes` and `review_queue` stay pairwise disjoint:
/// a swipe moves the reviewed id out of the queue and into exactly one of the
/// two decision sets, and the queue is only ever refilled with ids in none of
/// the three.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub uuid: Uuid,
    pub email: String,
    pub name: String,
    pub timezone: String,
    pub bio: String,
    pub pitch: String,
    pub on_match_message: Option<String>,
    pub right_swipes: IndexSet<Uuid>,
    pub left_swipes: IndexSet<Uuid>,
    pub matches: IndexSet<Uuid>,
    /// Set to the partner's id once a chat is mutually accepted. Symmetric:
    /// `users[taken].taken` points back here.
    pub taken: Option<Uuid>,
    /// Holds at most one candidate awaiting this user's decision.
    pub review_queue: Vec<Uuid>,
    pub chats: Vec<ChatId>,
}

impl User {
    fn new(uuid: Uuid, email: &str, profile: Profile) -> Self {
        let Profile { name, timezone, bio, pitch, on_match_message } = profile;
        Self {
            uuid,
            email: email.to_owned(),
            name,
            timezone,
            bio,
            pitch,
            on_match_message,
            right_swipes: IndexSet::new(),
            left_swipes: IndexSet::new(),
            matches: IndexSet::new(),
            taken: None,
            review_queue: Vec::new(),
            chats: Vec::new(),
        }
    }
}

/// One candidate pool: the users of a group within a course, plus every chat
/// ever spawned between them. Maps keep insertion order; the ranking
/// tie-break depends on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub course: String,
    pub group: String,
    pub users: IndexMap<Uuid, User>,
    pub chats: IndexMap<ChatId, Chat>,
}

impl Group {
    fn new(course: String, group: String) -> Self {
        Self { course, group, users: IndexMap::new(), chats: IndexMap::new() }
    }
}

/// Strips characters that are unsafe in filesystem paths.
///
/// Lossy: distinct raw names can sanitize to the same key and will silently
/// share a group. Known limitation, kept as-is.
pub fn to_valid_path(raw: &str) -> String {
    raw.chars()
        .filter(|c| !r#" &/\#,+()$~%.'":*?<>{}"#.contains(*c))
        .collect()
}

/// Owns the `course → group → Group` tree. Groups are created on first
/// reference and never deleted.
#[derive(Debug, Default)]
pub struct GroupStore {
    data: IndexMap<String, IndexMap<String, Group>>,
}

impl GroupStore {
    /// Idempotent create-or-get, with both keys sanitized first.
    pub fn add_group(&mut self, course: &str, group: &str) -> &mut Group {
        let course = to_valid_path(course);
        let group = to_valid_path(group);
        self.data
            .entry(course.clone())
            .or_default()
            .entry(group.clone())
            .or_insert_with(|| Group::new(course, group))
    }

    pub fn get(&self, course: &str, group: &str) -> Result<&Group, MatchError> {
        let courses = self.data.get(&to_valid_path(course)).ok_or(MatchError::NoSuchCourse)?;
        courses.get(&to_valid_path(group)).ok_or(MatchError::NoSuchGroup)
    }

    pub fn get_mut(&mut self, course: &str, group: &str) -> Result<&mut Group, MatchError> {
        let courses = self.data.get_mut(&to_valid_path(course)).ok_or(MatchError::NoSuchCourse)?;
        courses.get_mut(&to_valid_path(group)).ok_or(MatchError::NoSuchGroup)
    }

    /// Every group of every course, in insertion order.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.data.values().flat_map(|courses| courses.values())
    }

    fn insert(&mut self, group: Group) {
        self.data
            .entry(group.course.clone())
            .or_default()
            .insert(group.group.clone(), group);
    }
}

/// The engine instance: the group tree plus the notification hub. All state
/// transitions flow through the methods below; callers serialize access.
#[derive(Default)]
pub struct Matcher {
    store: GroupStore,
    hub: NotificationHub,
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the group if needed and adds the user to it.
    ///
    /// Rejects a second join with the same email; on success, refills every
    /// member's review queue since a new entrant changes the pool for
    /// everyone.
    pub fn join_group(
        &mut self,
        course: &str,
        group: &str,
        email: &str,
        profile: Profile,
    ) -> Result<Uuid, MatchError> {
        let Self { store, hub } = self;
        let group = store.add_group(course, group);

        if group.users.values().any(|user| user.email == email) {
            return Err(MatchError::AlreadyJoined);
        }

        let uuid = identity::derive_id(email);
        group.users.insert(uuid, User::new(uuid, email, profile));
        debug!(%uuid, email, course = %group.course, group = %group.group, "added new user");

        ranking::check_all_queues(group, hub);
        Ok(uuid)
    }

    pub fn get_group(&self, course: &str, group: &str) -> Result<&Group, MatchError> {
        let group = self.store.get(course, group)?;
        debug!(course = %group.course, group = %group.group, "retrieved group by name");
        Ok(group)
    }

    /// The same view of a user the hub delivers: profile with resolved peer
    /// summaries, plus their non-hidden chats.
    pub fn user_data(&self, course: &str, group: &str, uuid: Uuid) -> Result<EventPayload, MatchError> {
        let group = self.store.get(course, group)?;
        view::payload(group, uuid).ok_or(MatchError::UnknownUser)
    }

    /// Records a swipe decision and runs the full cascade: match check,
    /// reciprocal enqueue, queue refill, notifications.
    pub fn swipe(
        &mut self,
        course: &str,
        group: &str,
        swiper: Uuid,
        swipee: Uuid,
        right_swipe: bool,
    ) -> Result<(), MatchError> {
        let Self { store, hub } = self;
        let group = store.get_mut(course, group)?;
        swipe::on_user_swiped(group, hub, swiper, swipee, right_swipe)
    }

    /// Posts a message into the pair's chat. A stale chat id is silently
    /// dropped; only an unknown course/group is an error.
    pub fn send_chat(
        &mut self,
        course: &str,
        group: &str,
        from: Uuid,
        to: Uuid,
        message: String,
    ) -> Result<(), MatchError> {
        let Self { store, hub } = self;
        let group = store.get_mut(course, group)?;
        chat::send_chat(group, hub, from, to, message);
        Ok(())
    }

    /// Marks the chat accepted by `accepter`; once both sides have accepted,
    /// the pair is confirmed and leaves the candidate pool.
    pub fn accept_match(
        &mut self,
        course: &str,
        group: &str,
        accepter: Uuid,
        other: Uuid,
    ) -> Result<(), MatchError> {
        let Self { store, hub } = self;
        let group = store.get_mut(course, group)?;
        chat::accept_match(group, hub, accepter, other)
    }

    /// Hides the pair's chat. The record is retained, never deleted.
    pub fn reject_match(
        &mut self,
        course: &str,
        group: &str,
        rejecter: Uuid,
        other: Uuid,
    ) -> Result<(), MatchError> {
        let Self { store, hub } = self;
        let group = store.get_mut(course, group)?;
        chat::reject_match(group, hub, rejecter, other)
    }

    /// Client-triggered refill of the user's review slot. Returns whether a
    /// new candidate was queued.
    pub fn refresh_queue(&mut self, course: &str, group: &str, uuid: Uuid) -> Result<bool, MatchError> {
        let Self { store, hub } = self;
        let group = store.get_mut(course, group)?;
        ranking::fill_user_queue(group, hub, uuid)
    }

    /// Registers `handler` for `(kind, uuid)`, replacing any previous one.
    /// One live handler per user per event kind; a reconnecting session
    /// re-subscribes and thereby takes over delivery.
    pub fn subscribe(&mut self, kind: EventKind, uuid: Uuid, handler: EventHandler) {
        self.hub.subscribe(kind, uuid, handler);
    }

    /// Clears every handler slot for the user.
    pub fn unsubscribe_all(&mut self, uuid: Uuid) {
        self.hub.unsubscribe_all(uuid);
    }

    /// Every group, for the snapshot collaborator.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.store.groups()
    }

    /// Places a deserialized group back into the tree under its own keys.
    pub fn restore_group(&mut self, group: Group) {
        self.store.insert(group);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn profile(name: &str, timezone: &str) -> Profile {
        Profile {
            name: name.to_owned(),
            timezone: timezone.to_owned(),
            bio: "A Human...".to_owned(),
            pitch: "$20".to_owned(),
            on_match_message: None,
        }
    }

    /// Three users: a and b share a timezone, c differs.
    pub(crate) fn three_user_group(matcher: &mut Matcher) -> (Uuid, Uuid, Uuid) {
        let a = matcher.join_group("CRS", "GRP", "a@mail.com", profile("Person A", "t1")).unwrap();
        let b = matcher.join_group("CRS", "GRP", "b@mail.com", profile("Person B", "t1")).unwrap();
        let c = matcher.join_group("CRS", "GRP", "c@mail.com", profile("Person C", "t2")).unwrap();
        (a, b, c)
    }

    #[test]
    fn add_group_is_idempotent() {
        let mut store = GroupStore::default();
        store.add_group("CS 101", "Group A").users.insert(
            Uuid::nil(),
            User::new(Uuid::nil(), "x@mail.com", profile("X", "t1")),
        );
        assert_eq!(store.add_group("CS 101", "Group A").users.len(), 1);
    }

    #[test]
    fn keys_are_sanitized_and_can_collide() {
        let mut store = GroupStore::default();
        store.add_group("CS/101", "Group.A");
        assert!(store.get("CS101", "GroupA").is_ok());
        // Distinct raw names that strip to the same key share one group.
        store.add_group("CS&101", "Group?A");
        assert_eq!(store.groups().count(), 1);
    }

    #[test]
    fn lookup_distinguishes_missing_course_from_missing_group() {
        let mut store = GroupStore::default();
        store.add_group("CRS", "GRP");
        assert_eq!(store.get("NOPE", "GRP").unwrap_err(), MatchError::NoSuchCourse);
        assert_eq!(store.get("CRS", "NOPE").unwrap_err(), MatchError::NoSuchGroup);
        assert!(store.get("CRS", "GRP").is_ok());
    }

    #[test]
    fn duplicate_email_is_rejected_without_mutation() {
        let mut matcher = Matcher::new();
        matcher.join_group("CRS", "GRP", "a@mail.com", profile("Person A", "t1")).unwrap();
        let err = matcher
            .join_group("CRS", "GRP", "a@mail.com", profile("Someone Else", "t2"))
            .unwrap_err();
        assert_eq!(err, MatchError::AlreadyJoined);

        let group = matcher.get_group("CRS", "GRP").unwrap();
        assert_eq!(group.users.len(), 1);
        assert_eq!(group.users.values().next().unwrap().name, "Person A");
    }

    #[test]
    fn joining_refills_everyones_queue() {
        let mut matcher = Matcher::new();
        let a = matcher.join_group("CRS", "GRP", "a@mail.com", profile("Person A", "t1")).unwrap();
        // Alone in the group: nobody to review.
        assert!(matcher.get_group("CRS", "GRP").unwrap().users[&a].review_queue.is_empty());

        let b = matcher.join_group("CRS", "GRP", "b@mail.com", profile("Person B", "t1")).unwrap();
        let group = matcher.get_group("CRS", "GRP").unwrap();
        assert_eq!(group.users[&a].review_queue, vec![b]);
        assert_eq!(group.users[&b].review_queue, vec![a]);
    }
}
