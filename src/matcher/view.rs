//! Per-user projections of group state, shared by notification delivery and
//! the `getData` path. Peers are reduced to summaries so a user never sees
//! another member's swipes or queue, and hidden chats are filtered out.

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use uuid::Uuid;

use super::chat::Chat;
use super::{Group, User};

/// What a user is shown about somebody else.
#[derive(Debug, Clone, Serialize)]
pub struct PeerSummary {
    pub uuid: Uuid,
    pub name: String,
    pub timezone: String,
    pub bio: String,
    pub pitch: String,
    pub email: String,
}

impl PeerSummary {
    fn of(user: &User) -> Self {
        Self {
            uuid: user.uuid,
            name: user.name.clone(),
            timezone: user.timezone.clone(),
            bio: user.bio.clone(),
            pitch: user.pitch.clone(),
            email: user.email.clone(),
        }
    }
}

/// A user's own record with matches and review queue resolved to
/// [`PeerSummary`] entries keyed by id.
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub uuid: Uuid,
    pub email: String,
    pub name: String,
    pub timezone: String,
    pub bio: String,
    pub pitch: String,
    pub on_match_message: Option<String>,
    pub taken: Option<Uuid>,
    pub right_swipes: IndexSet<Uuid>,
    pub left_swipes: IndexSet<Uuid>,
    pub matches: IndexMap<Uuid, PeerSummary>,
    pub review_queue: IndexMap<Uuid, PeerSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupRef {
    pub course: String,
    pub group: String,
}

/// What a notification handler receives, and what `getData` returns.
#[derive(Debug, Clone, Serialize)]
pub struct EventPayload {
    pub group: GroupRef,
    pub user: UserView,
    pub chats: Vec<Chat>,
}

fn resolve<'a>(group: &Group, ids: impl Iterator<Item = &'a Uuid>) -> IndexMap<Uuid, PeerSummary> {
    ids.filter_map(|id| group.users.get(id))
        .map(|peer| (peer.uuid, PeerSummary::of(peer)))
        .collect()
}

/// Builds the full payload for `uuid`, or `None` if they are not in the
/// group.
pub(super) fn payload(group: &Group, uuid: Uuid) -> Option<EventPayload> {
    let user = group.users.get(&uuid)?;

    let chats = user
        .chats
        .iter()
        .filter_map(|id| group.chats.get(id))
        .filter(|chat| !chat.hidden)
        .cloned()
        .collect();

    Some(EventPayload {
        group: GroupRef { course: group.course.clone(), group: group.group.clone() },
        user: UserView {
            uuid: user.uuid,
            email: user.email.clone(),
            name: user.name.clone(),
            timezone: user.timezone.clone(),
            bio: user.bio.clone(),
            pitch: user.pitch.clone(),
            on_match_message: user.on_match_message.clone(),
            taken: user.taken,
            right_swipes: user.right_swipes.clone(),
            left_swipes: user.left_swipes.clone(),
            matches: resolve(group, user.matches.iter()),
            review_queue: resolve(group, user.review_queue.iter()),
        },
        chats,
    })
}
