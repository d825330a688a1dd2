//! Candidate selection and review-queue maintenance.

use tracing::debug;
use uuid::Uuid;

use super::{EventKind, Group, MatchError, NotificationHub};

/// Picks the best unreviewed candidate for `sender`.
///
/// Skips the sender, anyone taken, and anyone the sender has already swiped
/// on or is currently reviewing. Scoring: +10 for a shared timezone, -5
/// otherwise, -2 per person already queued on the candidate, +1 per right
/// swipe the candidate has made. Only a strictly greater score displaces the
/// running best, so ties go to whichever user was inserted first; the map
/// iterates in insertion order, which keeps the tie-break reproducible.
///
/// `None` means the pool is exhausted for this sender until the group
/// changes.
pub(super) fn rank_users(group: &Group, sender_id: Uuid) -> Option<Uuid> {
    let sender = group.users.get(&sender_id)?;

    let mut best_score = i64::MIN;
    let mut best_match = None;
    for (uuid, candidate) in &group.users {
        if candidate.taken.is_some() || *uuid == sender_id {
            continue;
        }
        if sender.right_swipes.contains(uuid)
            || sender.left_swipes.contains(uuid)
            || sender.review_queue.contains(uuid)
        {
            continue;
        }

        let mut score = if candidate.timezone == sender.timezone { 10 } else { -5 };
        score += -2 * candidate.review_queue.len() as i64;
        score += candidate.right_swipes.len() as i64;

        if score > best_score {
            best_score = score;
            best_match = Some(*uuid);
        }
    }
    best_match
}

/// Refills `uuid`'s review slot if it is empty. Returns whether a candidate
/// was queued.
pub(super) fn fill_user_queue(
    group: &mut Group,
    hub: &NotificationHub,
    uuid: Uuid,
) -> Result<bool, MatchError> {
    let user = group.users.get(&uuid).ok_or(MatchError::UnknownUser)?;
    if !user.review_queue.is_empty() {
        debug!(%uuid, "queue already has a candidate, not refilling");
        return Ok(false);
    }

    match rank_users(group, uuid) {
        Some(to_review) => {
            debug!(%to_review, %uuid, "found a candidate for the review queue");
            add_to_review_queue(group, hub, uuid, to_review)
        }
        None => {
            debug!(%uuid, "nobody left to review");
            Ok(false)
        }
    }
}

/// Refills every member's queue. Run after any change that might free up
/// candidates for someone.
pub(super) fn check_all_queues(group: &mut Group, hub: &NotificationHub) {
    let ids: Vec<Uuid> = group.users.keys().copied().collect();
    for uuid in ids {
        // Ids come straight from the map, so this cannot fail.
        let _ = fill_user_queue(group, hub, uuid);
    }
}

/// Appends `to_review` to `uuid`'s queue unless they were already swiped on
/// or queued. Returns whether the queue grew.
pub(super) fn add_to_review_queue(
    group: &mut Group,
    hub: &NotificationHub,
    uuid: Uuid,
    to_review: Uuid,
) -> Result<bool, MatchError> {
    if !group.users.contains_key(&to_review) {
        return Err(MatchError::UnknownUser);
    }
    let target = group.users.get_mut(&uuid).ok_or(MatchError::UnknownUser)?;

    if target.left_swipes.contains(&to_review)
        || target.right_swipes.contains(&to_review)
        || target.review_queue.contains(&to_review)
    {
        debug!(%to_review, %uuid, "already reviewed or queued, skipping");
        return Ok(false);
    }

    target.review_queue.push(to_review);
    debug!(%to_review, %uuid, queue = ?target.review_queue, "queued for review");
    hub.fire(EventKind::QueueUpdated, uuid, group);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{profile, three_user_group};
    use super::super::{Matcher, NotificationHub};
    use super::*;

    /// Joins fill queues as a side effect; tests that score candidates
    /// directly want a clean slate.
    fn clear_queues(group: &mut Group) {
        for user in group.users.values_mut() {
            user.review_queue.clear();
        }
    }

    fn same_timezone_trio(matcher: &mut Matcher) -> (Uuid, Uuid, Uuid) {
        let a = matcher.join_group("CRS", "GRP", "a@mail.com", profile("Person A", "t1")).unwrap();
        let b = matcher.join_group("CRS", "GRP", "b@mail.com", profile("Person B", "t1")).unwrap();
        let c = matcher.join_group("CRS", "GRP", "c@mail.com", profile("Person C", "t1")).unwrap();
        (a, b, c)
    }

    #[test]
    fn same_timezone_outranks_different() {
        let mut matcher = Matcher::new();
        let (a, b, _) = three_user_group(&mut matcher);
        let group = matcher.store.get_mut("CRS", "GRP").unwrap();
        clear_queues(group);

        assert_eq!(rank_users(group, a), Some(b));
    }

    #[test]
    fn ties_go_to_the_first_inserted_user() {
        let mut matcher = Matcher::new();
        let (a, b, c) = same_timezone_trio(&mut matcher);
        let group = matcher.store.get_mut("CRS", "GRP").unwrap();
        clear_queues(group);

        // All candidates score 10; first-seen wins.
        assert_eq!(rank_users(group, a), Some(b));
        assert_eq!(rank_users(group, c), Some(a));
    }

    #[test]
    fn crowded_queues_push_candidates_down() {
        let mut matcher = Matcher::new();
        let (a, b, c) = same_timezone_trio(&mut matcher);
        let group = matcher.store.get_mut("CRS", "GRP").unwrap();
        clear_queues(group);

        // b is already reviewing someone (10 - 2 = 8), c is free (10).
        group.users.get_mut(&b).unwrap().review_queue.push(c);
        assert_eq!(rank_users(group, a), Some(c));
    }

    #[test]
    fn right_swipes_lift_a_candidate() {
        let mut matcher = Matcher::new();
        let (a, b, c) = same_timezone_trio(&mut matcher);
        let group = matcher.store.get_mut("CRS", "GRP").unwrap();
        clear_queues(group);

        // c has right-swiped someone (10 + 1 = 11), beating the b tie-break.
        group.users.get_mut(&c).unwrap().right_swipes.insert(b);
        assert_eq!(rank_users(group, a), Some(c));
    }

    #[test]
    fn taken_users_are_skipped() {
        let mut matcher = Matcher::new();
        let (a, b, c) = same_timezone_trio(&mut matcher);
        let group = matcher.store.get_mut("CRS", "GRP").unwrap();
        clear_queues(group);

        group.users.get_mut(&b).unwrap().taken = Some(c);
        group.users.get_mut(&c).unwrap().taken = Some(b);
        assert_eq!(rank_users(group, a), None);
    }

    #[test]
    fn exhausted_pool_returns_none() {
        let mut matcher = Matcher::new();
        let (a, b, c) = three_user_group(&mut matcher);

        matcher.swipe("CRS", "GRP", a, b, false).unwrap();
        matcher.swipe("CRS", "GRP", a, c, false).unwrap();

        // Everyone else now sits in a's left swipes.
        let group = matcher.get_group("CRS", "GRP").unwrap();
        assert!(group.users[&a].review_queue.is_empty());
        assert_eq!(rank_users(group, a), None);
    }

    #[test]
    fn fill_never_grows_a_nonempty_queue() {
        let mut matcher = Matcher::new();
        let (a, _, _) = three_user_group(&mut matcher);
        let hub = NotificationHub::default();

        let group = matcher.store.get_mut("CRS", "GRP").unwrap();
        assert_eq!(group.users[&a].review_queue.len(), 1);
        assert!(!fill_user_queue(group, &hub, a).unwrap());
        assert_eq!(group.users[&a].review_queue.len(), 1);
    }

    #[test]
    fn fill_rejects_unknown_users() {
        let mut matcher = Matcher::new();
        three_user_group(&mut matcher);
        let hub = NotificationHub::default();
        let group = matcher.store.get_mut("CRS", "GRP").unwrap();
        assert!(fill_user_queue(group, &hub, Uuid::nil()).is_err());
    }

    #[test]
    fn reviewed_users_are_not_requeued() {
        let mut matcher = Matcher::new();
        let (a, b, _) = three_user_group(&mut matcher);
        let hub = NotificationHub::default();

        let group = matcher.store.get_mut("CRS", "GRP").unwrap();
        clear_queues(group);
        group.users.get_mut(&a).unwrap().left_swipes.insert(b);

        assert!(!add_to_review_queue(group, &hub, a, b).unwrap());
        assert!(group.users[&a].review_queue.is_empty());
    }
}
