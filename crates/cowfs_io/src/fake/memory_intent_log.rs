// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use parking_lot::Mutex;

use crate::{IntentLog, ObjectId, Transaction};

/// A write recorded by [`MemoryIntentLog`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LoggedWrite {
    /// The object written to.
    pub object: ObjectId,
    /// Offset of the write.
    pub offset: u64,
    /// Length of the write.
    pub len: u64,
    /// Whether the caller waited for the write to be durable.
    pub sync: bool,
    /// Transaction group of the write.
    pub group: u64,
}

/// A mode change recorded by [`MemoryIntentLog`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LoggedModeChange {
    /// The object whose mode changed.
    pub object: ObjectId,
    /// The new mode bits.
    pub mode: u32,
    /// Transaction group of the change.
    pub group: u64,
}

#[derive(Debug, Default)]
struct Records {
    writes: Vec<LoggedWrite>,
    mode_changes: Vec<LoggedModeChange>,
}

/// An intent log that keeps its records in memory for inspection.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug, Default)]
pub struct MemoryIntentLog {
    records: Mutex<Records>,
}

impl MemoryIntentLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The writes recorded so far, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<LoggedWrite> {
        self.records.lock().writes.clone()
    }

    /// The mode changes recorded so far, in order.
    #[must_use]
    pub fn mode_changes(&self) -> Vec<LoggedModeChange> {
        self.records.lock().mode_changes.clone()
    }
}

impl IntentLog for MemoryIntentLog {
    fn log_write(&self, txn: &Transaction, object: ObjectId, offset: u64, len: u64, sync: bool) {
        self.records.lock().writes.push(LoggedWrite {
            object,
            offset,
            len,
            sync,
            group: txn.group(),
        });
    }

    fn log_setattr_mode(&self, txn: &Transaction, object: ObjectId, mode: u32) {
        self.records.lock().mode_changes.push(LoggedModeChange {
            object,
            mode,
            group: txn.group(),
        });
    }
}
