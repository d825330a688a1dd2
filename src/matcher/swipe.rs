//! Swipe processing: the one entry point through which review decisions
//! mutate group state.

use tracing::debug;
use uuid::Uuid;

use super::{chat, ranking, EventKind, Group, MatchError, NotificationHub};

/// Applies `swiper`'s decision about `swipee`.
///
/// The decision consumes the queued slot first. A right swipe records the
/// swipee, checks for a mutual match, and offers the swiper back to the
/// swipee's queue regardless of the match outcome; a left swipe only
/// records. Either way the swiper's now-empty slot is refilled at the end.
pub(super) fn on_user_swiped(
    group: &mut Group,
    hub: &NotificationHub,
    swiper: Uuid,
    swipee: Uuid,
    right_swipe: bool,
) -> Result<(), MatchError> {
    if !group.users.contains_key(&swipee) {
        return Err(MatchError::UnknownUser);
    }
    let swiper_user = group.users.get_mut(&swiper).ok_or(MatchError::UnknownUser)?;
    swiper_user.review_queue.retain(|id| *id != swipee);

    if right_swipe {
        debug!(%swiper, %swipee, "swiped right");
        swiper_user.right_swipes.insert(swipee);
        chat::check_match(group, hub, swiper, swipee);
        // Offer the swiper back immediately; no-ops if the swipee already
        // has them recorded somewhere.
        ranking::add_to_review_queue(group, hub, swipee, swiper)?;
        hub.fire(EventKind::QueueUpdated, swiper, group);
    } else {
        debug!(%swiper, %swipee, "swiped left");
        swiper_user.left_swipes.insert(swipee);
        hub.fire(EventKind::QueueUpdated, swiper, group);
    }

    ranking::fill_user_queue(group, hub, swiper)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::tests::three_user_group;
    use super::super::{Matcher, User};
    use super::*;

    fn assert_disjoint(user: &User) {
        for id in &user.review_queue {
            assert!(!user.right_swipes.contains(id));
            assert!(!user.left_swipes.contains(id));
        }
        assert!(user.right_swipes.intersection(&user.left_swipes).next().is_none());
    }

    #[test]
    fn unknown_swiper_or_swipee_is_rejected() {
        let mut matcher = Matcher::new();
        let (a, _, _) = three_user_group(&mut matcher);
        let ghost = Uuid::nil();

        assert_eq!(matcher.swipe("CRS", "GRP", ghost, a, true).unwrap_err(), MatchError::UnknownUser);
        assert_eq!(matcher.swipe("CRS", "GRP", a, ghost, true).unwrap_err(), MatchError::UnknownUser);
    }

    #[test]
    fn swipe_consumes_the_queue_slot_and_records_the_decision() {
        let mut matcher = Matcher::new();
        let (a, b, c) = three_user_group(&mut matcher);

        matcher.swipe("CRS", "GRP", a, b, true).unwrap();
        let group = matcher.get_group("CRS", "GRP").unwrap();
        let user_a = &group.users[&a];
        assert!(user_a.right_swipes.contains(&b));
        assert!(!user_a.review_queue.contains(&b));
        // The slot refilled with the only remaining candidate.
        assert_eq!(user_a.review_queue, vec![c]);
        assert_disjoint(user_a);
    }

    #[test]
    fn right_swipe_offers_the_swiper_back() {
        let mut matcher = Matcher::new();
        let (a, b, c) = three_user_group(&mut matcher);

        matcher.swipe("CRS", "GRP", b, c, true).unwrap();

        // The offer-back appends even though c's slot was already occupied;
        // only the maintainer's own refill respects the capacity of one.
        let group = matcher.get_group("CRS", "GRP").unwrap();
        assert_eq!(group.users[&c].review_queue, vec![a, b]);
    }

    #[test]
    fn reciprocal_enqueue_skips_already_reviewed_swipees() {
        let mut matcher = Matcher::new();
        let (a, b, _) = three_user_group(&mut matcher);

        matcher.swipe("CRS", "GRP", b, a, false).unwrap();
        matcher.swipe("CRS", "GRP", a, b, true).unwrap();

        // a sits in b's left swipes, so the offer-back must not requeue them.
        let group = matcher.get_group("CRS", "GRP").unwrap();
        assert!(!group.users[&b].review_queue.contains(&a));
        assert_disjoint(&group.users[&b]);
    }

    #[test]
    fn double_swipe_does_not_duplicate_records() {
        let mut matcher = Matcher::new();
        let (a, b, _) = three_user_group(&mut matcher);

        matcher.swipe("CRS", "GRP", a, b, true).unwrap();
        matcher.swipe("CRS", "GRP", a, b, true).unwrap();

        let group = matcher.get_group("CRS", "GRP").unwrap();
        assert_eq!(group.users[&a].right_swipes.iter().filter(|id| **id == b).count(), 1);
    }

    #[test]
    fn tracking_sets_stay_disjoint_through_a_session() {
        let mut matcher = Matcher::new();
        let (a, b, c) = three_user_group(&mut matcher);

        matcher.swipe("CRS", "GRP", a, b, true).unwrap();
        matcher.swipe("CRS", "GRP", a, c, false).unwrap();
        matcher.swipe("CRS", "GRP", c, a, false).unwrap();
        matcher.swipe("CRS", "GRP", b, a, true).unwrap();

        let group = matcher.get_group("CRS", "GRP").unwrap();
        for user in group.users.values() {
            assert_disjoint(user);
        }
    }
}
