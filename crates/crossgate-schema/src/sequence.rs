use crate::key::{CompositeKey, EntityKind};
use crate::types::RequestId;
use crate::{Record, SchemaError};
use serde::{Deserialize, Serialize};

const REQUEST_SEQUENCE: &str = "request";

/// Persisted request-id counter. Lives in the ledger so that every
/// invocation, on any host instance, sees the same sequence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RequestSequence {
    pub next: RequestId,
}

impl Default for RequestSequence {
    fn default() -> Self {
        Self {
            next: RequestId::new(1),
        }
    }
}

impl RequestSequence {
    /// Hand out the next id and advance the counter.
    pub fn allocate(&mut self) -> RequestId {
        let id = self.next;
        self.next = id.next();
        id
    }

    pub fn storage_key() -> Result<CompositeKey, SchemaError> {
        CompositeKey::new(EntityKind::Sequence, [REQUEST_SEQUENCE])
    }
}

impl Record for RequestSequence {
    const KIND: EntityKind = EntityKind::Sequence;

    fn key(&self) -> Result<CompositeKey, SchemaError> {
        Self::storage_key()
    }
}
