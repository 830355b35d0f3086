//! Access arbitration for shared road/rail level crossings.
//!
//! This crate ties the entity model and the versioned ledger together into
//! [`CrossingContract`], the public surface that admits and releases trains
//! and cars. It holds the crossing state machine, the lane allocator, the
//! admission and release controllers, and the audit commitments that bind
//! every request to the identity that made it.

pub mod admission;
pub mod allocator;
pub mod audit;
pub mod config;
pub mod context;
pub mod contract;
pub mod release;
pub mod session;
pub mod state;

pub use config::{ConfigError, ContractConfig};
pub use context::{CallerIdentity, Invocation};
pub use contract::CrossingContract;

use crossgate_schema::SchemaError;
use crossgate_store::StoreError;
use thiserror::Error;

/// Coarse classification of a [`ContractError`] for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Unauthorized,
    StateConflict,
    /// The caller supplied an identifier that cannot name a record.
    InvalidArgument,
    /// Another invocation committed first; re-running may succeed.
    WriteConflict,
    Internal,
}

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{entity} '{id}' already exists")]
    AlreadyExists { entity: &'static str, id: String },
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("state conflict: {0}")]
    StateConflict(String),
    #[error("invariant violated: {0}")]
    Invariant(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl ContractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContractError::NotFound { .. } => ErrorKind::NotFound,
            ContractError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            ContractError::Unauthorized(_) => ErrorKind::Unauthorized,
            ContractError::StateConflict(_) => ErrorKind::StateConflict,
            ContractError::Store(StoreError::Conflict { .. }) => ErrorKind::WriteConflict,
            ContractError::Schema(SchemaError::InvalidKey(_))
            | ContractError::Store(StoreError::Schema(SchemaError::InvalidKey(_))) => {
                ErrorKind::InvalidArgument
            }
            ContractError::Invariant(_)
            | ContractError::Store(_)
            | ContractError::Schema(_)
            | ContractError::Config(_) => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::WriteConflict
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ContractError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn already_exists(entity: &'static str, id: impl ToString) -> Self {
        ContractError::AlreadyExists {
            entity,
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_names_entity() {
        let e = ContractError::not_found("crossing", "C1");
        assert_eq!(e.to_string(), "crossing 'C1' not found");
        assert_eq!(e.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn store_conflict_is_retryable() {
        let e: ContractError = StoreError::Conflict {
            key: "LANE/C1/L1".to_owned(),
        }
        .into();
        assert_eq!(e.kind(), ErrorKind::WriteConflict);
        assert!(e.is_retryable());
    }

    #[test]
    fn other_store_errors_are_internal() {
        let e: ContractError = StoreError::LockFailed("poisoned".to_owned()).into();
        assert_eq!(e.kind(), ErrorKind::Internal);
        assert!(!e.is_retryable());
    }

    #[test]
    fn invalid_keys_are_caller_errors() {
        let direct: ContractError = SchemaError::InvalidKey("empty key part".to_owned()).into();
        assert_eq!(direct.kind(), ErrorKind::InvalidArgument);
        let wrapped: ContractError =
            StoreError::from(SchemaError::InvalidKey("empty key part".to_owned())).into();
        assert_eq!(wrapped.kind(), ErrorKind::InvalidArgument);
        assert!(!wrapped.is_retryable());

        let other: ContractError = SchemaError::Invariant("over capacity".to_owned()).into();
        assert_eq!(other.kind(), ErrorKind::Internal);
    }

    #[test]
    fn taxonomy_kinds() {
        assert_eq!(
            ContractError::already_exists("lane", "L1").kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            ContractError::Unauthorized("wrong domain".to_owned()).kind(),
            ErrorKind::Unauthorized
        );
        assert_eq!(
            ContractError::StateConflict("locked".to_owned()).kind(),
            ErrorKind::StateConflict
        );
        assert_eq!(
            ContractError::Invariant("underflow".to_owned()).kind(),
            ErrorKind::Internal
        );
    }
}
