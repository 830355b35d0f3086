use crate::key::{CompositeKey, EntityKind};
use crate::types::{CrossingId, LaneId, RequestId};
use crate::{Record, SchemaError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequesterRole {
    Train,
    Car,
}

impl std::fmt::Display for RequesterRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequesterRole::Train => write!(f, "TRAIN"),
            RequesterRole::Car => write!(f, "CAR"),
        }
    }
}

/// Outcome of a single crossing request.
///
/// Created once per admission call and mutated at most once, by the matching
/// release. `lane_id` is only set for granted car requests. `active` is true
/// while a grant is held; a request that was never granted is never active.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub id: RequestId,
    pub crossing_id: CrossingId,
    #[serde(default)]
    pub lane_id: Option<LaneId>,
    pub role: RequesterRole,
    pub granted: bool,
    pub active: bool,
}

impl Request {
    pub fn granted(
        id: RequestId,
        crossing_id: CrossingId,
        lane_id: Option<LaneId>,
        role: RequesterRole,
    ) -> Self {
        Self {
            id,
            crossing_id,
            lane_id,
            role,
            granted: true,
            active: true,
        }
    }

    pub fn denied(id: RequestId, crossing_id: CrossingId, role: RequesterRole) -> Self {
        Self {
            id,
            crossing_id,
            lane_id: None,
            role,
            granted: false,
            active: false,
        }
    }

    pub fn key_for(id: RequestId) -> Result<CompositeKey, SchemaError> {
        CompositeKey::new(EntityKind::Request, [id.to_string()])
    }
}

impl Record for Request {
    const KIND: EntityKind = EntityKind::Request;

    fn key(&self) -> Result<CompositeKey, SchemaError> {
        Self::key_for(self.id)
    }
}
