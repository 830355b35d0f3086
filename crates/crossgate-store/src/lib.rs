//! Versioned key-value ledger and transactions for Crossgate.
//!
//! This crate provides the storage layer the arbitration core runs on: the
//! [`Ledger`] trait with optimistic, serializable commits, an in-process
//! [`MemoryLedger`], a durable [`FileLedger`] backed by atomic file writes,
//! a write-ahead log for crash recovery, and [`Transaction`], which gives
//! a single operation read-your-writes semantics and typed record access.

pub mod file;
pub mod layout;
pub mod ledger;
pub mod lock;
pub mod txn;
pub mod wal;

pub use file::FileLedger;
pub use layout::{StoreLayout, STORE_FORMAT_VERSION};
pub use ledger::{Ledger, MemoryLedger, Versioned, WriteBatch};
pub use lock::StoreLock;
pub use txn::Transaction;
pub use wal::{RollbackStep, WriteAheadLog};

use crossgate_schema::SchemaError;
use std::path::Path;
use thiserror::Error;

/// Fsync a directory so that a preceding `rename()` is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("integrity check failed for record '{key}': expected {expected}, got {actual}")]
    IntegrityFailure {
        key: String,
        expected: String,
        actual: String,
    },
    #[error("write conflict on '{key}': record changed since it was read")]
    Conflict { key: String },
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),
    #[error("store format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("corrupt record: {0}")]
    CorruptRecord(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl StoreError {
    /// True for errors a caller may resolve by re-running the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}
