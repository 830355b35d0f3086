//! Entity model, identifiers, and composite ledger keys for Crossgate.
//!
//! This crate defines the records that the arbitration core persists:
//! `Crossing`, `Lane`, `Request`, the restricted `RequestAudit`, and the
//! `RequestSequence` counter. Each record knows its `CompositeKey` and
//! serializes to canonical JSON through the [`Record`] trait.

pub mod audit;
pub mod crossing;
pub mod key;
pub mod lane;
pub mod request;
pub mod sequence;
pub mod types;

pub use audit::RequestAudit;
pub use crossing::{Crossing, CrossingState};
pub use key::{CompositeKey, EntityKind};
pub use lane::Lane;
pub use request::{Request, RequesterRole};
pub use sequence::RequestSequence;
pub use types::{Commitment, CrossingId, LaneId, OrgDomain, PrincipalId, RequestId, TxTimestamp};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// A ledger-persisted entity.
pub trait Record: Serialize + DeserializeOwned {
    const KIND: EntityKind;

    fn key(&self) -> Result<CompositeKey, SchemaError>;

    fn to_bytes(&self) -> Result<Vec<u8>, SchemaError> {
        Ok(serde_json::to_vec(self)?)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, SchemaError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
