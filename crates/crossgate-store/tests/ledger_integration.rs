use crossgate_schema::{CompositeKey, RequestSequence};
use crossgate_store::{FileLedger, Ledger, MemoryLedger, StoreError, Transaction};
use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 4;
const INCREMENTS: usize = 25;

/// Allocate one id, retrying on conflict. Returns the id handed out.
fn allocate_with_retry(ledger: &dyn Ledger) -> u64 {
    loop {
        let mut tx = Transaction::begin(ledger);
        let key = RequestSequence::storage_key().unwrap();
        let mut seq: RequestSequence = tx.load(&key).unwrap().unwrap_or_default();
        let id = seq.allocate();
        tx.store(&seq).unwrap();
        match tx.commit() {
            Ok(_) => return id.get(),
            Err(StoreError::Conflict { .. }) => continue,
            Err(e) => panic!("unexpected commit error: {e}"),
        }
    }
}

fn hammer(ledger: Arc<dyn Ledger>) -> Vec<u64> {
    let barrier = Arc::new(Barrier::new(THREADS));
    let mut handles = Vec::new();
    for _ in 0..THREADS {
        let l = Arc::clone(&ledger);
        let b = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            b.wait();
            (0..INCREMENTS)
                .map(|_| allocate_with_retry(l.as_ref()))
                .collect::<Vec<_>>()
        }));
    }
    let mut ids: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    ids.sort_unstable();
    ids
}

fn assert_unique_and_dense(ids: &[u64]) {
    let expected: Vec<u64> = (1..=(THREADS * INCREMENTS) as u64).collect();
    assert_eq!(ids, expected.as_slice());
}

#[test]
fn memory_ledger_concurrent_allocation_never_reuses_ids() {
    let ledger: Arc<dyn Ledger> = Arc::new(MemoryLedger::new());
    let ids = hammer(Arc::clone(&ledger));
    assert_unique_and_dense(&ids);
}

#[test]
fn file_ledger_concurrent_allocation_never_reuses_ids() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(FileLedger::open(dir.path()).unwrap());
    let ids = hammer(Arc::clone(&ledger) as Arc<dyn Ledger>);
    assert_unique_and_dense(&ids);

    assert_eq!(ledger.pending_commits().unwrap(), 0);
    assert!(ledger.verify_integrity().unwrap().is_empty());
    let wal_entries = fs::read_dir(ledger.layout().wal_dir()).unwrap().count();
    assert_eq!(wal_entries, 0, "WAL must be empty after clean commits");
}

#[test]
fn two_handles_on_one_directory_see_each_others_commits() {
    let dir = tempfile::tempdir().unwrap();
    let a = FileLedger::open(dir.path()).unwrap();
    let b = FileLedger::open(dir.path()).unwrap();

    assert_eq!(allocate_with_retry(&a), 1);
    assert_eq!(allocate_with_retry(&b), 2);

    let key: CompositeKey = RequestSequence::storage_key().unwrap();
    let mut tx = Transaction::begin(&a);
    let seq: RequestSequence = tx.load(&key).unwrap().unwrap();
    assert_eq!(seq.next.get(), 3);
}

#[test]
fn reopening_with_wrong_format_version_fails() {
    let dir = tempfile::tempdir().unwrap();
    {
        FileLedger::open(dir.path()).unwrap();
    }
    fs::write(
        dir.path().join("store").join("version"),
        r#"{"format_version": 42}"#,
    )
    .unwrap();
    assert!(matches!(
        FileLedger::open(dir.path()),
        Err(StoreError::VersionMismatch { found: 42, .. })
    ));
}
