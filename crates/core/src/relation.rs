//! Friendship and chat status transitions.
//!
//! Each side of a pair carries its own [`ChatStatus`]. The functions here are
//! pure: they take the current viewer-relative [`PairStatus`] and return the
//! next one, or the error the transition is rejected with. Services turn the
//! result into a relation write batch.
//!
//! Every function matches on the full status vocabulary so that a new status
//! cannot be added without revisiting each transition.

use coterie_common::{AppError, AppResult};
pub use coterie_db::entities::chat_room::ChatStatus;
use serde::Serialize;

/// Chat statuses of a pair, seen from one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PairStatus {
    /// The viewer's own status.
    pub mine: ChatStatus,
    /// The other participant's status.
    pub theirs: ChatStatus,
}

impl PairStatus {
    /// No relation recorded on either side.
    pub const NONE: Self = Self::new(ChatStatus::None, ChatStatus::None);

    /// Both sides are friends.
    pub const FRIENDS: Self = Self::new(ChatStatus::Friends, ChatStatus::Friends);

    /// Both sides are blocked.
    pub const BLOCKED: Self = Self::new(ChatStatus::Blocked, ChatStatus::Blocked);

    /// Build a pair from the viewer's and the other participant's status.
    #[must_use]
    pub const fn new(mine: ChatStatus, theirs: ChatStatus) -> Self {
        Self { mine, theirs }
    }

    /// The same pair seen from the other participant.
    #[must_use]
    pub const fn flipped(self) -> Self {
        Self::new(self.theirs, self.mine)
    }

    /// Whether either side is blocked.
    #[must_use]
    pub fn is_blocked(self) -> bool {
        self.mine == ChatStatus::Blocked || self.theirs == ChatStatus::Blocked
    }
}

impl Default for PairStatus {
    fn default() -> Self {
        Self::NONE
    }
}

/// Outcome of a send-request check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPlan {
    /// Both sides want the friendship: become friends immediately.
    Converge,
    /// Re-adding someone who may still see the sender as removed.
    ReAdd(PairStatus),
    /// A plain request.
    Plain(PairStatus),
}

const fn is_readding(status: ChatStatus) -> bool {
    match status {
        ChatStatus::TheyUnadded | ChatStatus::BothUnadded | ChatStatus::PendingAdd => true,
        ChatStatus::None
        | ChatStatus::Friends
        | ChatStatus::Pending
        | ChatStatus::IUnadded
        | ChatStatus::Blocked
        | ChatStatus::Unadded => false,
    }
}

const fn removed_by_me(status: ChatStatus) -> bool {
    match status {
        ChatStatus::IUnadded | ChatStatus::BothUnadded => true,
        ChatStatus::None
        | ChatStatus::Friends
        | ChatStatus::Pending
        | ChatStatus::TheyUnadded
        | ChatStatus::PendingAdd
        | ChatStatus::Blocked
        | ChatStatus::Unadded => false,
    }
}

/// Decide what sending a friend request does.
///
/// `outgoing_pending` is whether the sender already has a pending request to
/// the recipient, `reverse_pending` whether the recipient has one to the
/// sender.
pub fn plan_send_request(
    pair: PairStatus,
    outgoing_pending: bool,
    reverse_pending: bool,
) -> AppResult<SendPlan> {
    if pair.is_blocked() {
        return Err(AppError::Blocked);
    }
    if pair.mine == ChatStatus::Friends {
        return Err(AppError::AlreadyExists("Already friends".to_string()));
    }
    if reverse_pending || (is_readding(pair.mine) && pair.theirs == ChatStatus::PendingAdd) {
        return Ok(SendPlan::Converge);
    }
    if outgoing_pending {
        return Err(AppError::AlreadyExists(
            "Friend request already pending".to_string(),
        ));
    }

    if is_readding(pair.mine) {
        return Ok(SendPlan::ReAdd(PairStatus::new(
            ChatStatus::PendingAdd,
            pair.theirs,
        )));
    }

    let theirs = match pair.theirs {
        ChatStatus::None | ChatStatus::Unadded | ChatStatus::Pending => ChatStatus::Pending,
        ChatStatus::Friends
        | ChatStatus::IUnadded
        | ChatStatus::TheyUnadded
        | ChatStatus::BothUnadded
        | ChatStatus::PendingAdd
        | ChatStatus::Blocked => pair.theirs,
    };
    Ok(SendPlan::Plain(PairStatus::new(ChatStatus::Pending, theirs)))
}

/// Accepting always ends in friends on both sides.
#[must_use]
pub const fn after_accept(_pair: PairStatus) -> PairStatus {
    PairStatus::FRIENDS
}

/// A withdrawn `Pending` side falls back to `Unadded`, or to `IUnadded` when
/// the other side still carries the one-way marker of an earlier removal.
const fn withdraw_side(status: ChatStatus, other: ChatStatus) -> ChatStatus {
    match status {
        ChatStatus::Pending => match other {
            ChatStatus::TheyUnadded => ChatStatus::IUnadded,
            ChatStatus::None
            | ChatStatus::Friends
            | ChatStatus::Pending
            | ChatStatus::IUnadded
            | ChatStatus::BothUnadded
            | ChatStatus::PendingAdd
            | ChatStatus::Blocked
            | ChatStatus::Unadded => ChatStatus::Unadded,
        },
        ChatStatus::None
        | ChatStatus::Friends
        | ChatStatus::IUnadded
        | ChatStatus::TheyUnadded
        | ChatStatus::BothUnadded
        | ChatStatus::PendingAdd
        | ChatStatus::Blocked
        | ChatStatus::Unadded => status,
    }
}

/// Pending sides are withdrawn; everything else is left alone.
#[must_use]
pub const fn after_deny(pair: PairStatus) -> PairStatus {
    PairStatus::new(
        withdraw_side(pair.mine, pair.theirs),
        withdraw_side(pair.theirs, pair.mine),
    )
}

/// The sender withdraws a pending request.
#[must_use]
pub fn after_cancel(pair: PairStatus) -> PairStatus {
    let mine = match pair.mine {
        ChatStatus::Pending => withdraw_side(pair.mine, pair.theirs),
        ChatStatus::PendingAdd => match pair.theirs {
            ChatStatus::IUnadded => ChatStatus::TheyUnadded,
            ChatStatus::BothUnadded => ChatStatus::BothUnadded,
            ChatStatus::None
            | ChatStatus::Friends
            | ChatStatus::Pending
            | ChatStatus::TheyUnadded
            | ChatStatus::PendingAdd
            | ChatStatus::Blocked
            | ChatStatus::Unadded => ChatStatus::Unadded,
        },
        ChatStatus::None
        | ChatStatus::Friends
        | ChatStatus::IUnadded
        | ChatStatus::TheyUnadded
        | ChatStatus::BothUnadded
        | ChatStatus::Blocked
        | ChatStatus::Unadded => pair.mine,
    };
    PairStatus::new(mine, withdraw_side(pair.theirs, pair.mine))
}

/// Statuses after the viewer removes the other participant.
pub fn plan_remove(pair: PairStatus) -> AppResult<PairStatus> {
    if pair.is_blocked() {
        return Err(AppError::Blocked);
    }
    if removed_by_me(pair.mine) {
        return Err(AppError::Conflict("Already removed".to_string()));
    }

    let both = PairStatus::new(ChatStatus::BothUnadded, ChatStatus::BothUnadded);
    match pair.mine {
        ChatStatus::Friends if removed_by_me(pair.theirs) => Ok(both),
        ChatStatus::Friends => Ok(PairStatus::new(
            ChatStatus::IUnadded,
            ChatStatus::TheyUnadded,
        )),
        ChatStatus::TheyUnadded | ChatStatus::PendingAdd => Ok(both),
        ChatStatus::None | ChatStatus::Pending | ChatStatus::Unadded
            if removed_by_me(pair.theirs) =>
        {
            Ok(both)
        }
        ChatStatus::None
        | ChatStatus::Pending
        | ChatStatus::Unadded
        | ChatStatus::IUnadded
        | ChatStatus::BothUnadded
        | ChatStatus::Blocked => Err(AppError::BadRequest("Not friends".to_string())),
    }
}

/// Whether exactly one side has removed the other.
#[must_use]
pub const fn is_one_way_unadd(pair: PairStatus) -> bool {
    match pair.mine {
        ChatStatus::IUnadded => matches!(
            pair.theirs,
            ChatStatus::TheyUnadded | ChatStatus::PendingAdd
        ),
        ChatStatus::TheyUnadded | ChatStatus::PendingAdd => {
            matches!(pair.theirs, ChatStatus::IUnadded)
        }
        ChatStatus::None
        | ChatStatus::Friends
        | ChatStatus::Pending
        | ChatStatus::BothUnadded
        | ChatStatus::Blocked
        | ChatStatus::Unadded => false,
    }
}

/// Whether the viewer may restore the friendship without a new request.
///
/// Only the side that did the removing can undo it, and only while the other
/// side has not removed them back.
#[must_use]
pub const fn can_restore_directly(pair: PairStatus) -> bool {
    match pair.mine {
        ChatStatus::IUnadded => matches!(
            pair.theirs,
            ChatStatus::TheyUnadded | ChatStatus::PendingAdd
        ),
        ChatStatus::None
        | ChatStatus::Friends
        | ChatStatus::Pending
        | ChatStatus::TheyUnadded
        | ChatStatus::BothUnadded
        | ChatStatus::PendingAdd
        | ChatStatus::Blocked
        | ChatStatus::Unadded => false,
    }
}

/// Statuses after a direct restore.
pub fn plan_restore(pair: PairStatus) -> AppResult<PairStatus> {
    if pair.is_blocked() {
        return Err(AppError::Blocked);
    }
    if can_restore_directly(pair) {
        Ok(PairStatus::FRIENDS)
    } else {
        Err(AppError::BadRequest(
            "Relation cannot be restored directly".to_string(),
        ))
    }
}

/// A block hides both directions.
#[must_use]
pub const fn after_block() -> PairStatus {
    PairStatus::BLOCKED
}

/// Statuses after one block is lifted.
#[must_use]
pub const fn after_unblock(reverse_block_exists: bool) -> PairStatus {
    if reverse_block_exists {
        PairStatus::BLOCKED
    } else {
        PairStatus::new(ChatStatus::Unadded, ChatStatus::Unadded)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::Iterable;

    fn all_pairs() -> impl Iterator<Item = PairStatus> {
        ChatStatus::iter()
            .flat_map(|mine| ChatStatus::iter().map(move |theirs| PairStatus::new(mine, theirs)))
    }

    #[test]
    fn test_nine_statuses() {
        assert_eq!(ChatStatus::iter().count(), 9);
        assert_eq!(all_pairs().count(), 81);
    }

    #[test]
    fn test_accept_always_converges() {
        for pair in all_pairs() {
            assert_eq!(after_accept(pair), PairStatus::FRIENDS, "{pair:?}");
        }
        let both_readding = PairStatus::new(ChatStatus::PendingAdd, ChatStatus::PendingAdd);
        assert_eq!(after_accept(both_readding), PairStatus::FRIENDS);
    }

    #[test]
    fn test_one_way_unadd_truth_table() {
        let expected = [
            (ChatStatus::IUnadded, ChatStatus::TheyUnadded),
            (ChatStatus::TheyUnadded, ChatStatus::IUnadded),
            (ChatStatus::IUnadded, ChatStatus::PendingAdd),
            (ChatStatus::PendingAdd, ChatStatus::IUnadded),
        ];
        for pair in all_pairs() {
            let want = expected.contains(&(pair.mine, pair.theirs));
            assert_eq!(is_one_way_unadd(pair), want, "{pair:?}");
            // Symmetric from either side.
            assert_eq!(is_one_way_unadd(pair.flipped()), want, "{pair:?}");
        }
    }

    #[test]
    fn test_restore_truth_table() {
        for pair in all_pairs() {
            let want = pair.mine == ChatStatus::IUnadded
                && matches!(pair.theirs, ChatStatus::TheyUnadded | ChatStatus::PendingAdd);
            assert_eq!(can_restore_directly(pair), want, "{pair:?}");
            if want {
                assert!(is_one_way_unadd(pair));
            }
        }
    }

    #[test]
    fn test_no_fallback_to_true() {
        // A room exists but nothing has been decided yet.
        assert!(!can_restore_directly(PairStatus::NONE));
        assert!(!is_one_way_unadd(PairStatus::NONE));
        assert!(!can_restore_directly(PairStatus::FRIENDS));
    }

    #[test]
    fn test_remove_then_restore_succeeds_iff_one_way() {
        for pair in all_pairs() {
            let Ok(removed) = plan_remove(pair) else {
                continue;
            };
            let restored = plan_restore(removed);
            assert_eq!(restored.is_ok(), is_one_way_unadd(removed), "{pair:?}");
            if let Ok(restored) = restored {
                assert_eq!(restored, PairStatus::FRIENDS);
            }
        }
    }

    #[test]
    fn test_remove_from_friends() {
        let removed = plan_remove(PairStatus::FRIENDS).unwrap();
        assert_eq!(
            removed,
            PairStatus::new(ChatStatus::IUnadded, ChatStatus::TheyUnadded)
        );
        assert!(is_one_way_unadd(removed));
    }

    #[test]
    fn test_remove_after_being_removed_flips_both() {
        // B's view after A removed B.
        let pair = PairStatus::new(ChatStatus::TheyUnadded, ChatStatus::IUnadded);
        let removed = plan_remove(pair).unwrap();
        assert_eq!(
            removed,
            PairStatus::new(ChatStatus::BothUnadded, ChatStatus::BothUnadded)
        );
        assert!(!is_one_way_unadd(removed));
    }

    #[test]
    fn test_remove_errors() {
        assert!(matches!(
            plan_remove(PairStatus::new(ChatStatus::IUnadded, ChatStatus::TheyUnadded)),
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            plan_remove(PairStatus::NONE),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            plan_remove(PairStatus::new(ChatStatus::Friends, ChatStatus::Blocked)),
            Err(AppError::Blocked)
        ));
    }

    #[test]
    fn test_blocked_pairs_reject_everything() {
        for pair in all_pairs().filter(|p| p.is_blocked()) {
            assert!(matches!(
                plan_send_request(pair, false, false),
                Err(AppError::Blocked)
            ));
            assert!(matches!(plan_remove(pair), Err(AppError::Blocked)));
            assert!(matches!(plan_restore(pair), Err(AppError::Blocked)));
            assert!(matches!(
                plan_remove(pair.flipped()),
                Err(AppError::Blocked)
            ));
        }
    }

    #[test]
    fn test_send_plain_request() {
        assert_eq!(
            plan_send_request(PairStatus::NONE, false, false).unwrap(),
            SendPlan::Plain(PairStatus::new(ChatStatus::Pending, ChatStatus::Pending))
        );
        // A one-way marker on the other side survives a plain request.
        assert_eq!(
            plan_send_request(
                PairStatus::new(ChatStatus::IUnadded, ChatStatus::TheyUnadded),
                false,
                false
            )
            .unwrap(),
            SendPlan::Plain(PairStatus::new(
                ChatStatus::Pending,
                ChatStatus::TheyUnadded
            ))
        );
    }

    #[test]
    fn test_send_readd() {
        for mine in [ChatStatus::TheyUnadded, ChatStatus::BothUnadded] {
            let pair = PairStatus::new(mine, ChatStatus::BothUnadded);
            assert_eq!(
                plan_send_request(pair, false, false).unwrap(),
                SendPlan::ReAdd(PairStatus::new(
                    ChatStatus::PendingAdd,
                    ChatStatus::BothUnadded
                ))
            );
        }
    }

    #[test]
    fn test_send_converges() {
        let mutual_readd = PairStatus::new(ChatStatus::BothUnadded, ChatStatus::PendingAdd);
        assert_eq!(
            plan_send_request(mutual_readd, false, false).unwrap(),
            SendPlan::Converge
        );
        let incoming = PairStatus::new(ChatStatus::Pending, ChatStatus::Pending);
        assert_eq!(
            plan_send_request(incoming, false, true).unwrap(),
            SendPlan::Converge
        );
    }

    #[test]
    fn test_send_duplicate_rejected() {
        assert!(matches!(
            plan_send_request(PairStatus::FRIENDS, false, false),
            Err(AppError::AlreadyExists(_))
        ));
        let pending = PairStatus::new(ChatStatus::Pending, ChatStatus::Pending);
        assert!(matches!(
            plan_send_request(pending, true, false),
            Err(AppError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_resend_after_deny() {
        let denied = after_deny(PairStatus::new(ChatStatus::Pending, ChatStatus::Pending));
        assert_eq!(
            denied,
            PairStatus::new(ChatStatus::Unadded, ChatStatus::Unadded)
        );
        assert!(matches!(
            plan_send_request(denied, false, false).unwrap(),
            SendPlan::Plain(_)
        ));
    }

    #[test]
    fn test_deny_only_touches_pending() {
        for pair in all_pairs() {
            let denied = after_deny(pair);
            for (before, other, after) in [
                (pair.mine, pair.theirs, denied.mine),
                (pair.theirs, pair.mine, denied.theirs),
            ] {
                match (before, other) {
                    (ChatStatus::Pending, ChatStatus::TheyUnadded) => {
                        assert_eq!(after, ChatStatus::IUnadded, "{pair:?}");
                    }
                    (ChatStatus::Pending, _) => assert_eq!(after, ChatStatus::Unadded, "{pair:?}"),
                    _ => assert_eq!(after, before, "{pair:?}"),
                }
            }
        }
    }

    #[test]
    fn test_withdrawn_request_keeps_one_way_marker() {
        let removed = plan_remove(PairStatus::FRIENDS).unwrap();
        let SendPlan::Plain(sent) = plan_send_request(removed, false, false).unwrap() else {
            panic!("expected a plain request");
        };

        assert_eq!(after_cancel(sent), removed);
        assert_eq!(after_deny(sent.flipped()), removed.flipped());
        assert!(can_restore_directly(after_cancel(sent)));
        assert!(is_one_way_unadd(after_deny(sent.flipped())));
    }

    #[test]
    fn test_cancel_readd_restores_marker() {
        let pair = PairStatus::new(ChatStatus::PendingAdd, ChatStatus::BothUnadded);
        assert_eq!(
            after_cancel(pair),
            PairStatus::new(ChatStatus::BothUnadded, ChatStatus::BothUnadded)
        );
        let pair = PairStatus::new(ChatStatus::PendingAdd, ChatStatus::IUnadded);
        assert_eq!(
            after_cancel(pair),
            PairStatus::new(ChatStatus::TheyUnadded, ChatStatus::IUnadded)
        );
    }

    #[test]
    fn test_two_sided_removal_needs_both_readds() {
        // A removes B.
        let a = plan_remove(PairStatus::FRIENDS).unwrap();
        assert_eq!(a, PairStatus::new(ChatStatus::IUnadded, ChatStatus::TheyUnadded));

        // B removes A.
        let b = plan_remove(a.flipped()).unwrap();
        assert_eq!(
            b,
            PairStatus::new(ChatStatus::BothUnadded, ChatStatus::BothUnadded)
        );
        assert!(matches!(plan_restore(b.flipped()), Err(AppError::BadRequest(_))));

        // A re-adds: pendingAdd/bothUnadded.
        let SendPlan::ReAdd(a) = plan_send_request(b.flipped(), false, false).unwrap() else {
            panic!("expected a re-add");
        };
        assert_eq!(
            a,
            PairStatus::new(ChatStatus::PendingAdd, ChatStatus::BothUnadded)
        );

        // B re-adds: converge.
        assert_eq!(
            plan_send_request(a.flipped(), false, true).unwrap(),
            SendPlan::Converge
        );
        assert_eq!(
            plan_send_request(a.flipped(), false, false).unwrap(),
            SendPlan::Converge
        );
    }

    #[test]
    fn test_unblock() {
        assert_eq!(after_unblock(true), PairStatus::BLOCKED);
        assert_eq!(
            after_unblock(false),
            PairStatus::new(ChatStatus::Unadded, ChatStatus::Unadded)
        );
        assert_eq!(after_block(), PairStatus::BLOCKED);
    }
}
