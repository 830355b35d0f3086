use crate::key::{CompositeKey, EntityKind};
use crate::types::{CrossingId, LaneId};
use crate::{Record, SchemaError};
use serde::{Deserialize, Serialize};

/// A capacity-bounded sub-resource of a crossing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Lane {
    pub id: LaneId,
    pub crossing_id: CrossingId,
    pub capacity: u32,
    pub occupied: u32,
    pub priority_lock: bool,
}

impl Lane {
    /// An empty, unlocked lane.
    pub fn new(id: LaneId, crossing_id: CrossingId, capacity: u32) -> Self {
        Self {
            id,
            crossing_id,
            capacity,
            occupied: 0,
            priority_lock: false,
        }
    }

    pub fn key_for(crossing_id: &CrossingId, lane_id: &LaneId) -> Result<CompositeKey, SchemaError> {
        CompositeKey::new(EntityKind::Lane, [crossing_id.as_str(), lane_id.as_str()])
    }

    /// Prefix covering every lane of a crossing.
    pub fn prefix_for(crossing_id: &CrossingId) -> Result<CompositeKey, SchemaError> {
        CompositeKey::new(EntityKind::Lane, [crossing_id.as_str()])
    }

    pub fn is_free(&self) -> bool {
        self.occupied < self.capacity && !self.priority_lock
    }

    pub fn is_full(&self) -> bool {
        self.occupied >= self.capacity
    }

    /// `0 <= occupied <= capacity`.
    pub fn check_invariant(&self) -> Result<(), SchemaError> {
        if self.occupied > self.capacity {
            return Err(SchemaError::Invariant(format!(
                "lane '{}' of crossing '{}' has {} occupants over capacity {}",
                self.id, self.crossing_id, self.occupied, self.capacity
            )));
        }
        Ok(())
    }
}

impl Record for Lane {
    const KIND: EntityKind = EntityKind::Lane;

    fn key(&self) -> Result<CompositeKey, SchemaError> {
        Self::key_for(&self.crossing_id, &self.id)
    }
}
