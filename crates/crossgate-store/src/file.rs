use crate::layout::StoreLayout;
use crate::ledger::{Ledger, Versioned, WriteBatch};
use crate::lock::StoreLock;
use crate::wal::{RollbackStep, WriteAheadLog};
use crate::{fsync_dir, StoreError};
use crossgate_schema::CompositeKey;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

const HEAD_FILE: &str = "head";

/// On-disk form of a single ledger record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct RecordEnvelope {
    key: CompositeKey,
    version: u64,
    /// Hex-encoded record bytes.
    value: String,
    /// blake3 checksum over the envelope with this field unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
}

impl RecordEnvelope {
    fn compute_checksum(&self) -> Result<String, StoreError> {
        let mut copy = self.clone();
        copy.checksum = None;
        let json = serde_json::to_string_pretty(&copy)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    fn sealed(key: CompositeKey, version: u64, value: &[u8]) -> Result<Self, StoreError> {
        let mut envelope = Self {
            key,
            version,
            value: hex::encode(value),
            checksum: None,
        };
        envelope.checksum = Some(envelope.compute_checksum()?);
        Ok(envelope)
    }

    fn into_versioned(self) -> Result<Versioned, StoreError> {
        let value = hex::decode(&self.value)
            .map_err(|e| StoreError::CorruptRecord(format!("{}: bad hex value: {e}", self.key)))?;
        Ok(Versioned {
            version: self.version,
            value,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerHead {
    head: u64,
}

/// Durable ledger that keeps one checksummed JSON file per record.
///
/// Commits from every thread and process sharing the root directory are
/// serialized through [`StoreLock`]. Each commit records pre-images in the
/// write-ahead log before touching any record, so an interrupted commit is
/// rolled back the next time the lock is taken.
pub struct FileLedger {
    layout: StoreLayout,
    wal: WriteAheadLog,
}

impl FileLedger {
    /// Open (creating if needed) the ledger rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let layout = StoreLayout::new(root);
        layout.initialize()?;
        let wal = WriteAheadLog::new(&layout);
        wal.initialize()?;

        // Only recover when no other handle is mid-commit.
        if let Some(_lock) = StoreLock::try_acquire(&layout)? {
            let recovered = wal.recover()?;
            if recovered > 0 {
                info!("recovered {recovered} interrupted ledger commit(s)");
            }
        }

        Ok(Self { layout, wal })
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Number of commits recorded in the WAL that have not completed.
    pub fn pending_commits(&self) -> Result<usize, StoreError> {
        Ok(self.wal.list_incomplete()?.len())
    }

    /// Read and checksum-verify every record, returning the keys that fail.
    pub fn verify_integrity(&self) -> Result<Vec<String>, StoreError> {
        let _lock = self.lock()?;
        let mut failed = Vec::new();
        for path in self.record_files()? {
            if let Err(e) = read_envelope_at(&path) {
                warn!("integrity check failed for {}: {e}", path.display());
                failed.push(file_label(&path));
            }
        }
        Ok(failed)
    }

    /// Take the store lock and roll back any commit a crashed holder left.
    fn lock(&self) -> Result<StoreLock, StoreError> {
        let lock = StoreLock::acquire(&self.layout)?;
        let recovered = self.wal.recover()?;
        if recovered > 0 {
            warn!("rolled back {recovered} interrupted ledger commit(s)");
        }
        Ok(lock)
    }

    /// Record files are named by a digest of the key, so their names have a
    /// fixed length whatever the length of the ids in the key.
    fn record_path(&self, key: &CompositeKey) -> PathBuf {
        self.layout
            .records_dir()
            .join(blake3::hash(&key.to_bytes()).to_hex().as_str())
    }

    fn record_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(self.layout.records_dir())? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            // Skip temp files left by an interrupted atomic write.
            if name.starts_with('.') {
                continue;
            }
            paths.push(entry.path());
        }
        Ok(paths)
    }

    fn read_record(&self, key: &CompositeKey) -> Result<Option<RecordEnvelope>, StoreError> {
        let path = self.record_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let envelope = read_envelope_at(&path)?;
        if envelope.key != *key {
            return Err(StoreError::CorruptRecord(format!(
                "{} holds record for {}",
                path.display(),
                envelope.key
            )));
        }
        Ok(Some(envelope))
    }

    fn head_path(&self) -> PathBuf {
        self.layout.store_dir().join(HEAD_FILE)
    }

    fn read_head(&self) -> Result<u64, StoreError> {
        let path = self.head_path();
        if !path.exists() {
            return Ok(0);
        }
        let content = fs::read_to_string(&path)?;
        let head: LedgerHead = serde_json::from_str(&content)?;
        Ok(head.head)
    }

    fn write_head(&self, head: u64) -> Result<(), StoreError> {
        let content = serde_json::to_string(&LedgerHead { head })?;
        write_atomic(&self.layout.store_dir(), &self.head_path(), content.as_bytes())
    }

    fn apply(&self, batch: &WriteBatch, version: u64) -> Result<(), StoreError> {
        let records_dir = self.layout.records_dir();
        for (key, write) in batch.writes() {
            let path = self.record_path(key);
            match write {
                Some(value) => {
                    let envelope = RecordEnvelope::sealed(key.clone(), version, value)?;
                    let content = serde_json::to_string_pretty(&envelope)?;
                    write_atomic(&records_dir, &path, content.as_bytes())?;
                }
                None => {
                    if path.exists() {
                        fs::remove_file(&path)?;
                    }
                }
            }
        }
        fsync_dir(&records_dir)?;
        Ok(())
    }

    fn rollback_steps(&self, batch: &WriteBatch) -> Result<Vec<RollbackStep>, StoreError> {
        let mut steps = Vec::with_capacity(batch.writes().len());
        for key in batch.writes().keys() {
            let path = self.record_path(key);
            if path.exists() {
                let content = fs::read_to_string(&path)?;
                steps.push(RollbackStep::RestoreFile { path, content });
            } else {
                steps.push(RollbackStep::RemoveFile(path));
            }
        }
        Ok(steps)
    }
}

impl Ledger for FileLedger {
    fn get(&self, key: &CompositeKey) -> Result<Option<Versioned>, StoreError> {
        let _lock = self.lock()?;
        self.read_record(key)?
            .map(RecordEnvelope::into_versioned)
            .transpose()
    }

    fn scan(&self, prefix: &CompositeKey) -> Result<Vec<(CompositeKey, Versioned)>, StoreError> {
        let _lock = self.lock()?;
        let mut out = Vec::new();
        for path in self.record_files()? {
            let envelope = read_envelope_at(&path)?;
            if !prefix.is_prefix_of(&envelope.key) {
                continue;
            }
            let key = envelope.key.clone();
            out.push((key, envelope.into_versioned()?));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    fn commit(&self, batch: WriteBatch) -> Result<u64, StoreError> {
        let _lock = self.lock()?;
        batch.validate(|key| Ok(self.read_record(key)?.map(|e| e.version)))?;
        if batch.is_read_only() {
            return self.read_head();
        }

        // The head is advanced before any record is written and never rolled
        // back, so a version is never handed out twice.
        let version = self.read_head()? + 1;
        self.write_head(version)?;

        let steps = self.rollback_steps(&batch)?;
        let op_id = self.wal.begin(&format!("commit v{version}"), steps)?;
        if let Err(e) = self.apply(&batch, version) {
            if let Err(abort_err) = self.wal.abort(&op_id) {
                warn!("failed to roll back commit v{version}: {abort_err}");
            }
            return Err(e);
        }
        self.wal.commit(&op_id)?;

        debug!(
            "file ledger commit v{version}: {} write(s), {} read(s) validated",
            batch.writes().len(),
            batch.reads().len()
        );
        Ok(version)
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_owned()
}

fn read_envelope_at(path: &Path) -> Result<RecordEnvelope, StoreError> {
    let content = fs::read_to_string(path)?;
    let envelope: RecordEnvelope = serde_json::from_str(&content)?;
    let Some(expected) = envelope.checksum.clone() else {
        return Err(StoreError::CorruptRecord(format!(
            "{} has no checksum",
            envelope.key
        )));
    };
    let actual = envelope.compute_checksum()?;
    if actual != expected {
        return Err(StoreError::IntegrityFailure {
            key: envelope.key.to_string(),
            expected,
            actual,
        });
    }
    Ok(envelope)
}

fn write_atomic(dir: &Path, dest: &Path, content: &[u8]) -> Result<(), StoreError> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| StoreError::Io(e.error))?;
    fsync_dir(dir)?;
    Ok(())
}
