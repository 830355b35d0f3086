use crate::key::{CompositeKey, EntityKind};
use crate::types::{CrossingId, LaneId};
use crate::{Record, SchemaError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrossingState {
    FreeToCross,
    Locked,
}

impl std::fmt::Display for CrossingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrossingState::FreeToCross => write!(f, "FREE_TO_CROSS"),
            CrossingState::Locked => write!(f, "LOCKED"),
        }
    }
}

/// The shared intersection being arbitrated.
///
/// `valid_until` (epoch seconds) is only meaningful while the crossing is
/// `FREE_TO_CROSS`; a held crossing carries `0`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Crossing {
    pub id: CrossingId,
    pub lane_ids: Vec<LaneId>,
    pub state: CrossingState,
    pub priority_lock: bool,
    pub valid_until: i64,
}

impl Crossing {
    /// A freshly created crossing: free, unlocked, valid until `valid_until`.
    pub fn new_free(id: CrossingId, lane_ids: Vec<LaneId>, valid_until: i64) -> Self {
        Self {
            id,
            lane_ids,
            state: CrossingState::FreeToCross,
            priority_lock: false,
            valid_until,
        }
    }

    pub fn key_for(id: &CrossingId) -> Result<CompositeKey, SchemaError> {
        CompositeKey::new(EntityKind::Crossing, [id.as_str()])
    }

    pub fn is_free_to_cross(&self) -> bool {
        self.state == CrossingState::FreeToCross
    }

    /// A free crossing whose validity window has not yet passed at `now`.
    pub fn is_valid_at(&self, now: i64) -> bool {
        self.is_free_to_cross() && self.valid_until >= now
    }

    pub fn has_lane(&self, lane_id: &LaneId) -> bool {
        self.lane_ids.contains(lane_id)
    }

    /// `priority_lock` implies `LOCKED`.
    pub fn check_invariant(&self) -> Result<(), SchemaError> {
        if self.priority_lock && self.state != CrossingState::Locked {
            return Err(SchemaError::Invariant(format!(
                "crossing '{}' holds a priority lock while {}",
                self.id, self.state
            )));
        }
        Ok(())
    }
}

impl Record for Crossing {
    const KIND: EntityKind = EntityKind::Crossing;

    fn key(&self) -> Result<CompositeKey, SchemaError> {
        Self::key_for(&self.id)
    }
}
