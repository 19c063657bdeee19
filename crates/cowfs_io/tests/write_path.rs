// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Partial progress of chunked writes: quota, store failures, set-id clearing and log replay.

#![cfg(feature = "fakes")]

use std::fmt::{self, Debug};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cowfs_io::{
    Credentials, Dataset, DatasetBuilder, DatasetConfig, DurableStore, Error, FileAttributes,
    FileNode, Host, IdentityKind, IntentLog, IoDescriptor, IoFlags, MemoryIntentLog, MemoryStore,
    ObjectId, QuotaTracker, SimulatedHost, StoreError, Transaction,
};

const BLOCK: usize = 4096;

fn builder(store: &Arc<MemoryStore>) -> DatasetBuilder {
    Dataset::builder(
        Arc::new(SimulatedHost::new()) as Arc<dyn Host>,
        Arc::clone(store) as Arc<dyn DurableStore>,
    )
    .with_config(DatasetConfig::default().with_max_block_size(BLOCK as u64))
}

fn blocks(count: usize, offset: u64) -> IoDescriptor {
    IoDescriptor::kernel_space(vec![vec![0x42; count * BLOCK]], offset)
}

/// Quota that runs out after a fixed number of checks.
#[derive(Debug)]
struct Budget {
    remaining: AtomicUsize,
}

impl QuotaTracker for Budget {
    fn over_block_quota(&self, _kind: IdentityKind, _id: u64) -> bool {
        self.remaining
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |r| r.checked_sub(1))
            .is_err()
    }
}

/// Intent log that records like [`MemoryIntentLog`] and runs a hook after each logged write.
struct HookLog {
    inner: MemoryIntentLog,
    calls: AtomicUsize,
    hook: Box<dyn Fn(usize) + Send + Sync>,
}

impl HookLog {
    fn new(hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        Self {
            inner: MemoryIntentLog::new(),
            calls: AtomicUsize::new(0),
            hook: Box::new(hook),
        }
    }
}

impl Debug for HookLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookLog")
            .field("inner", &self.inner)
            .field("calls", &self.calls)
            .finish_non_exhaustive()
    }
}

impl IntentLog for HookLog {
    fn log_write(&self, txn: &Transaction, object: ObjectId, offset: u64, len: u64, sync: bool) {
        self.inner.log_write(txn, object, offset, len, sync);
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        (self.hook)(call);
    }

    fn log_setattr_mode(&self, txn: &Transaction, object: ObjectId, mode: u32) {
        self.inner.log_setattr_mode(txn, object, mode);
    }
}

#[test]
fn quota_exhausted_mid_write_returns_partial_count() {
    let store = Arc::new(MemoryStore::new());
    let dataset = builder(&store)
        .with_quota(Arc::new(Budget {
            // Owner and group are checked before each chunk.
            remaining: AtomicUsize::new(4),
        }))
        .build()
        .unwrap();
    let file = dataset.create_file(FileAttributes::default()).unwrap();

    let n = dataset
        .write(
            &file,
            &mut blocks(4, 0),
            IoFlags::new(),
            Credentials::default(),
        )
        .unwrap();
    assert_eq!(n, 2 * BLOCK);
    assert_eq!(file.size(), 2 * BLOCK as u64);

    let result = dataset.write(
        &file,
        &mut blocks(1, file.size()),
        IoFlags::new(),
        Credentials::default(),
    );
    assert!(matches!(
        result,
        Err(Error::QuotaExceeded {
            kind: IdentityKind::User,
            id: 0
        })
    ));
    assert_eq!(file.size(), 2 * BLOCK as u64);
}

#[test]
fn store_failure_before_progress_is_returned() {
    let store = Arc::new(MemoryStore::new());
    let dataset = builder(&store).build().unwrap();
    let file = dataset.create_file(FileAttributes::default()).unwrap();

    store.fail_next_open();
    let result = dataset.write(
        &file,
        &mut blocks(2, 0),
        IoFlags::new(),
        Credentials::default(),
    );

    let error = result.unwrap_err();
    assert!(matches!(error, Error::Store(StoreError::NoSpace)));
    assert_eq!(error.errno(), libc::ENOSPC);
    assert_eq!(file.size(), 0);
    assert_eq!(store.commits(), 0);
}

#[test]
fn store_failure_after_progress_returns_partial_count() {
    let store = Arc::new(MemoryStore::new());
    let hook_store = Arc::clone(&store);
    let log = Arc::new(HookLog::new(move |call| {
        if call == 2 {
            hook_store.fail_next_open();
        }
    }));
    let dataset = builder(&store)
        .with_intent_log(Arc::clone(&log) as Arc<dyn IntentLog>)
        .build()
        .unwrap();
    let file = dataset.create_file(FileAttributes::default()).unwrap();

    let n = dataset
        .write(
            &file,
            &mut blocks(4, 0),
            IoFlags::new(),
            Credentials::default(),
        )
        .unwrap();

    assert_eq!(n, 2 * BLOCK);
    assert_eq!(file.size(), 2 * BLOCK as u64);
    assert_eq!(log.inner.writes().len(), 2);
}

#[test]
fn failed_commit_after_progress_keeps_moved_bytes() {
    let store = Arc::new(MemoryStore::new());
    let hook_store = Arc::clone(&store);
    let dataset = builder(&store)
        .with_intent_log(Arc::new(HookLog::new(move |call| {
            if call == 1 {
                hook_store.fail_next_commit();
            }
        })))
        .build()
        .unwrap();
    let file = dataset.create_file(FileAttributes::default()).unwrap();

    let n = dataset
        .write(
            &file,
            &mut blocks(3, 0),
            IoFlags::new(),
            Credentials::default(),
        )
        .unwrap();

    assert_eq!(n, BLOCK);
    assert_eq!(file.size(), BLOCK as u64);
}

#[test]
fn setid_clearing_is_logged_once_per_group() {
    let store = Arc::new(MemoryStore::new());
    let slot: Arc<parking_lot::Mutex<Option<Arc<FileNode>>>> = Arc::default();

    let hook_store = Arc::clone(&store);
    let hook_slot = Arc::clone(&slot);
    let log = Arc::new(HookLog::new(move |call| {
        // Someone sets the bits again after every chunk.
        if let Some(file) = hook_slot.lock().as_ref() {
            file.set_mode(0o6755);
        }
        if call == 2 {
            hook_store.advance_group();
        }
    }));

    let dataset = builder(&store)
        .with_intent_log(Arc::clone(&log) as Arc<dyn IntentLog>)
        .build()
        .unwrap();
    let file = dataset
        .create_file(FileAttributes {
            mode: 0o6755,
            ..FileAttributes::default()
        })
        .unwrap();
    *slot.lock() = Some(Arc::clone(&file));

    let n = dataset
        .write(
            &file,
            &mut blocks(4, 0),
            IoFlags::new(),
            Credentials::user(1000, 1000),
        )
        .unwrap();
    assert_eq!(n, 4 * BLOCK);

    let changes = log.inner.mode_changes();
    assert_eq!(changes.len(), 2);
    assert!(changes.iter().all(|c| c.mode == 0o755));
    assert_ne!(changes[0].group, changes[1].group);

    // Privileged callers keep the bits.
    file.set_mode(0o6755);
    dataset
        .write(
            &file,
            &mut blocks(1, 0),
            IoFlags::new(),
            Credentials::privileged(),
        )
        .unwrap();
    assert_eq!(log.inner.mode_changes().len(), 2);

    *slot.lock() = None;
}

#[test]
fn replayed_write_forces_end_of_file() {
    let store = Arc::new(MemoryStore::new());
    let dataset = Dataset::builder(
        Arc::new(SimulatedHost::new()) as Arc<dyn Host>,
        Arc::clone(&store) as Arc<dyn DurableStore>,
    )
    .with_config(
        DatasetConfig::default()
            .with_max_block_size(BLOCK as u64)
            .with_replay(true),
    )
    .build()
    .unwrap();
    let file = dataset.create_file(FileAttributes::default()).unwrap();

    // The logged file was truncated after the write that is now replayed.
    dataset.set_replay_eof(100);
    let n = dataset
        .write(
            &file,
            &mut blocks(1, 0),
            IoFlags::new(),
            Credentials::default(),
        )
        .unwrap();

    assert_eq!(n, BLOCK);
    assert_eq!(file.size(), 100);
}

#[test]
fn replay_returns_errors_despite_progress() {
    let store = Arc::new(MemoryStore::new());
    let hook_store = Arc::clone(&store);
    let dataset = Dataset::builder(
        Arc::new(SimulatedHost::new()) as Arc<dyn Host>,
        Arc::clone(&store) as Arc<dyn DurableStore>,
    )
    .with_config(
        DatasetConfig::default()
            .with_max_block_size(BLOCK as u64)
            .with_replay(true),
    )
    .with_intent_log(Arc::new(HookLog::new(move |_| hook_store.fail_next_open())))
    .build()
    .unwrap();
    let file = dataset.create_file(FileAttributes::default()).unwrap();

    let result = dataset.write(
        &file,
        &mut blocks(2, 0),
        IoFlags::new(),
        Credentials::default(),
    );

    assert!(matches!(result, Err(Error::Store(StoreError::NoSpace))));
    // The first chunk was committed before the failure.
    assert_eq!(file.size(), BLOCK as u64);
}
