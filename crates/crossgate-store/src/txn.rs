use crate::ledger::{Ledger, WriteBatch};
use crate::StoreError;
use crossgate_schema::{CompositeKey, Record};
use std::collections::BTreeMap;

/// A single unit of work against a [`Ledger`].
///
/// Reads see the transaction's own pending writes. Nothing reaches the
/// ledger until [`commit`](Self::commit); dropping the transaction discards
/// every write.
pub struct Transaction<'l> {
    ledger: &'l dyn Ledger,
    batch: WriteBatch,
}

impl<'l> Transaction<'l> {
    pub fn begin(ledger: &'l dyn Ledger) -> Self {
        Self {
            ledger,
            batch: WriteBatch::default(),
        }
    }

    pub fn get(&mut self, key: &CompositeKey) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(pending) = self.batch.writes().get(key) {
            return Ok(pending.clone());
        }
        let current = self.ledger.get(key)?;
        self.batch
            .record_read(key, current.as_ref().map(|v| v.version));
        Ok(current.map(|v| v.value))
    }

    pub fn put(&mut self, key: CompositeKey, value: Vec<u8>) {
        self.batch.put(key, value);
    }

    pub fn delete(&mut self, key: CompositeKey) {
        self.batch.delete(key);
    }

    /// Records under `prefix`, with this transaction's writes applied on top.
    ///
    /// Keys returned from the ledger join the read set. Keys inserted by a
    /// concurrent transaction after the scan are not detected.
    pub fn scan(&mut self, prefix: &CompositeKey) -> Result<Vec<(CompositeKey, Vec<u8>)>, StoreError> {
        let mut merged: BTreeMap<CompositeKey, Vec<u8>> = BTreeMap::new();
        for (key, versioned) in self.ledger.scan(prefix)? {
            self.batch.record_read(&key, Some(versioned.version));
            merged.insert(key, versioned.value);
        }
        for (key, write) in self.batch.writes() {
            if !prefix.is_prefix_of(key) {
                continue;
            }
            match write {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    pub fn load<R: Record>(&mut self, key: &CompositeKey) -> Result<Option<R>, StoreError> {
        match self.get(key)? {
            Some(bytes) => Ok(Some(R::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn store<R: Record>(&mut self, record: &R) -> Result<(), StoreError> {
        let key = record.key()?;
        let bytes = record.to_bytes()?;
        self.put(key, bytes);
        Ok(())
    }

    pub fn remove<R: Record>(&mut self, record: &R) -> Result<(), StoreError> {
        let key = record.key()?;
        self.delete(key);
        Ok(())
    }

    pub fn has_writes(&self) -> bool {
        !self.batch.is_read_only()
    }

    /// Validate and apply everything this transaction wrote.
    pub fn commit(self) -> Result<u64, StoreError> {
        self.ledger.commit(self.batch)
    }
}
