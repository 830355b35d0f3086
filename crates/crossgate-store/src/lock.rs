use crate::layout::StoreLayout;
use crate::StoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use tracing::debug;

/// Exclusive advisory lock on a ledger directory.
///
/// Every [`FileLedger`](crate::FileLedger) read, scan and commit runs under
/// it, so handles in one process and in separate processes observe commits
/// one at a time. Released on drop.
pub struct StoreLock {
    file: File,
}

fn open_lock_file(layout: &StoreLayout) -> Result<File, StoreError> {
    std::fs::create_dir_all(layout.store_dir())?;
    Ok(OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(layout.lock_file())?)
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl StoreLock {
    /// Block until the ledger lock is free.
    pub fn acquire(layout: &StoreLayout) -> Result<Self, StoreError> {
        let file = open_lock_file(layout)?;
        file.lock_exclusive().map_err(|e| {
            StoreError::LockFailed(format!("{}: {e}", layout.lock_file().display()))
        })?;
        Ok(Self { file })
    }

    /// Take the lock only if nobody holds it.
    pub fn try_acquire(layout: &StoreLayout) -> Result<Option<Self>, StoreError> {
        let file = open_lock_file(layout)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { file })),
            Err(e) if is_contended(&e) => {
                debug!("ledger lock at {} is held elsewhere", layout.lock_file().display());
                Ok(None)
            }
            Err(e) => Err(StoreError::LockFailed(format!(
                "{}: {e}",
                layout.lock_file().display()
            ))),
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
