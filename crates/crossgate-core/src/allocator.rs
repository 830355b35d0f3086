//! Lane occupancy and priority flags.

use crate::ContractError;
use crossgate_schema::{Lane, LaneId, TxTimestamp};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

/// Priority always wins, regardless of occupancy.
pub fn lock_for_train(lane: &mut Lane) {
    lane.priority_lock = true;
}

pub fn lock_for_car(lane: &mut Lane) -> Result<(), ContractError> {
    if lane.is_full() {
        return Err(ContractError::StateConflict(format!(
            "lane '{}' of crossing '{}' is at capacity {}",
            lane.id, lane.crossing_id, lane.capacity
        )));
    }
    lane.occupied += 1;
    Ok(())
}

pub fn unlock_train(lane: &mut Lane) {
    lane.priority_lock = false;
}

/// Occupancy can only drop below zero through a bookkeeping bug.
pub fn unlock_car(lane: &mut Lane) -> Result<(), ContractError> {
    lane.occupied = lane.occupied.checked_sub(1).ok_or_else(|| {
        ContractError::Invariant(format!(
            "lane '{}' of crossing '{}' released with no occupants",
            lane.id, lane.crossing_id
        ))
    })?;
    Ok(())
}

/// Pick one of the free lanes, or `None` when every lane is taken.
///
/// The choice is uniform over `lanes` that are free, in the given order, and
/// is a pure function of the transaction timestamp, so every replica that
/// replays the transaction assigns the same lane.
pub fn select_free_lane(lanes: &[Lane], timestamp: TxTimestamp) -> Option<LaneId> {
    let free: Vec<&Lane> = lanes.iter().filter(|l| l.is_free()).collect();
    if free.is_empty() {
        return None;
    }
    let mut rng = ChaCha8Rng::seed_from_u64(timestamp.epoch_millis() as u64);
    let chosen = free[rng.gen_range(0..free.len())];
    debug!(
        "selected lane '{}' out of {} free lane(s)",
        chosen.id,
        free.len()
    );
    Some(chosen.id.clone())
}

pub fn all_free(lanes: &[Lane]) -> bool {
    lanes.iter().all(Lane::is_free)
}
