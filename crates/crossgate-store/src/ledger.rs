use crate::StoreError;
use crossgate_schema::CompositeKey;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::debug;

/// A stored value together with the ledger version that last wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub version: u64,
    pub value: Vec<u8>,
}

/// The read and write sets of one transaction, handed to [`Ledger::commit`].
///
/// `reads` maps every key the transaction observed to the version it saw
/// (`None` for an absent key). `writes` maps keys to new bytes, or `None`
/// for a deletion.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    reads: BTreeMap<CompositeKey, Option<u64>>,
    writes: BTreeMap<CompositeKey, Option<Vec<u8>>>,
}

impl WriteBatch {
    /// Remember the first version observed for `key`; later reads keep it.
    pub fn record_read(&mut self, key: &CompositeKey, version: Option<u64>) {
        self.reads.entry(key.clone()).or_insert(version);
    }

    pub fn put(&mut self, key: CompositeKey, value: Vec<u8>) {
        self.writes.insert(key, Some(value));
    }

    pub fn delete(&mut self, key: CompositeKey) {
        self.writes.insert(key, None);
    }

    pub fn reads(&self) -> &BTreeMap<CompositeKey, Option<u64>> {
        &self.reads
    }

    pub fn writes(&self) -> &BTreeMap<CompositeKey, Option<Vec<u8>>> {
        &self.writes
    }

    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty()
    }

    /// Check every observed version against the ledger's current one.
    pub fn validate<F>(&self, mut current_version: F) -> Result<(), StoreError>
    where
        F: FnMut(&CompositeKey) -> Result<Option<u64>, StoreError>,
    {
        for (key, seen) in &self.reads {
            if current_version(key)? != *seen {
                return Err(StoreError::Conflict {
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Linearizable key-value ledger with atomic, serializable commits.
///
/// Every record carries the version of the commit that last wrote it.
/// Versions grow monotonically across the whole ledger, so a key that is
/// deleted and recreated never reuses a version a reader may have seen.
pub trait Ledger: Send + Sync {
    fn get(&self, key: &CompositeKey) -> Result<Option<Versioned>, StoreError>;

    /// All records covered by `prefix`, in key order.
    fn scan(&self, prefix: &CompositeKey) -> Result<Vec<(CompositeKey, Versioned)>, StoreError>;

    /// Validate the batch's read set and apply its write set atomically.
    ///
    /// Returns the version assigned to the written records. A stale read
    /// aborts with [`StoreError::Conflict`] and writes nothing.
    fn commit(&self, batch: WriteBatch) -> Result<u64, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    records: BTreeMap<CompositeKey, Versioned>,
    head: u64,
}

/// In-process ledger backed by an ordered map.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::LockFailed("memory ledger mutex poisoned".to_owned()))
    }

    /// Number of records currently stored.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.records.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.lock()?.records.is_empty())
    }
}

impl Ledger for MemoryLedger {
    fn get(&self, key: &CompositeKey) -> Result<Option<Versioned>, StoreError> {
        Ok(self.lock()?.records.get(key).cloned())
    }

    fn scan(&self, prefix: &CompositeKey) -> Result<Vec<(CompositeKey, Versioned)>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .records
            .range(prefix.clone()..)
            .take_while(|(k, _)| prefix.is_prefix_of(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn commit(&self, batch: WriteBatch) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        batch.validate(|key| Ok(state.records.get(key).map(|v| v.version)))?;
        if batch.is_read_only() {
            return Ok(state.head);
        }

        state.head += 1;
        let version = state.head;
        for (key, write) in batch.writes {
            match write {
                Some(value) => {
                    state.records.insert(key, Versioned { version, value });
                }
                None => {
                    state.records.remove(&key);
                }
            }
        }
        debug!("memory ledger commit at version {version}");
        Ok(version)
    }
}
