//! The FREE_TO_CROSS / LOCKED state machine of a crossing.

use crate::allocator;
use crate::ContractError;
use crossgate_schema::{Crossing, CrossingState, Lane};

/// Lock the crossing for a train and report whether the train is admitted.
///
/// The admission decision is taken on the state before the seizure: the
/// crossing must have been free and still inside its validity window.
pub fn seize_for_train(crossing: &mut Crossing, now: i64) -> bool {
    let admitted = crossing.is_valid_at(now);
    crossing.state = CrossingState::Locked;
    crossing.priority_lock = true;
    crossing.valid_until = 0;
    admitted
}

/// A held crossing carries no validity window.
pub fn lock_for_car(crossing: &mut Crossing) {
    crossing.state = CrossingState::Locked;
    crossing.valid_until = 0;
}

/// Free the crossing if, and only if, every lane is free after a release.
///
/// Returns true when the crossing became free.
pub fn settle_after_release(crossing: &mut Crossing, lanes: &[Lane], valid_until: i64) -> bool {
    if !allocator::all_free(lanes) {
        return false;
    }
    crossing.state = CrossingState::FreeToCross;
    crossing.priority_lock = false;
    crossing.valid_until = valid_until;
    true
}

pub fn renew(crossing: &mut Crossing, valid_until: i64) -> Result<(), ContractError> {
    if crossing.state != CrossingState::FreeToCross {
        return Err(ContractError::StateConflict(format!(
            "crossing '{}' must be {} to renew its validity, it is {}",
            crossing.id,
            CrossingState::FreeToCross,
            crossing.state
        )));
    }
    crossing.valid_until = valid_until;
    Ok(())
}

/// After a lane change, a free crossing whose lanes are not all free locks.
///
/// Lane edits never free a crossing; only a release does.
pub fn reconcile_after_lane_change(crossing: &mut Crossing, lanes: &[Lane]) {
    if crossing.is_free_to_cross() && !allocator::all_free(lanes) {
        crossing.state = CrossingState::Locked;
        crossing.valid_until = 0;
    }
}

/// A crossing is held while a train lock or any car is outstanding.
pub fn is_held(crossing: &Crossing, lanes: &[Lane]) -> bool {
    crossing.priority_lock || lanes.iter().any(|l| l.occupied > 0)
}
