// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::constants::DEFAULT_PROJECT_ID;
use crate::{FileFlags, LockMode, LockRequest, ObjectId, RangeLock};

const S_ISUID: u32 = 0o4000;
const S_ISGID: u32 = 0o2000;
const S_IXANY: u32 = 0o111;

/// Ownership and permission attributes of a file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FileAttributes {
    /// Permission bits, including the set-id bits.
    pub mode: u32,

    /// Persistent attribute flags.
    pub flags: FileFlags,

    /// Owning user, charged for the file's blocks.
    pub uid: u64,

    /// Owning group, charged for the file's blocks.
    pub gid: u64,

    /// Project the file belongs to.
    pub project: u64,
}

impl Default for FileAttributes {
    fn default() -> Self {
        Self {
            mode: 0o644,
            flags: FileFlags::default(),
            uid: 0,
            gid: 0,
            project: DEFAULT_PROJECT_ID,
        }
    }
}

/// The in-memory state of one file that the data path reads and updates.
///
/// The size only ever grows through [`advance_size()`][Self::advance_size], a compare-and-swap
/// loop, so concurrent writers extending the file never move it backwards.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug)]
pub struct FileNode {
    object: ObjectId,
    size: AtomicU64,
    block_size: AtomicU64,
    attributes: Mutex<FileAttributes>,
    range_lock: RangeLock,
    sync_writers: AtomicUsize,
}

impl FileNode {
    pub(crate) fn new(object: ObjectId, block_size: u64, attributes: FileAttributes) -> Self {
        Self {
            object,
            size: AtomicU64::new(0),
            block_size: AtomicU64::new(block_size),
            attributes: Mutex::new(attributes),
            range_lock: RangeLock::new(),
            sync_writers: AtomicUsize::new(0),
        }
    }

    /// The store object holding the file's data.
    #[must_use]
    pub const fn object(&self) -> ObjectId {
        self.object
    }

    /// Current size of the file in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    /// Current block size of the file.
    #[must_use]
    pub fn block_size(&self) -> u64 {
        self.block_size.load(Ordering::Acquire)
    }

    /// A copy of the file's attributes.
    #[must_use]
    pub fn attributes(&self) -> FileAttributes {
        *self.attributes.lock()
    }

    /// Replaces the file's attribute flags.
    pub fn set_flags(&self, flags: FileFlags) {
        self.attributes.lock().flags = flags;
    }

    /// Replaces the file's permission bits.
    pub fn set_mode(&self, mode: u32) {
        self.attributes.lock().mode = mode;
    }

    /// The lock serializing overlapping operations on the file.
    #[must_use]
    pub const fn range_lock(&self) -> &RangeLock {
        &self.range_lock
    }

    /// Number of synchronous flushes of the file in flight.
    #[must_use]
    pub fn sync_writers(&self) -> usize {
        self.sync_writers.load(Ordering::Acquire)
    }

    /// Raises the size to `end` unless another writer already moved it further.
    pub(crate) fn advance_size(&self, end: u64) {
        let mut current = self.size.load(Ordering::Acquire);

        while current < end {
            match self
                .size
                .compare_exchange_weak(current, end, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    /// Sets the size unconditionally. Only used while replaying the intent log, when there is no
    /// concurrency.
    pub(crate) fn force_size(&self, size: u64) {
        self.size.store(size, Ordering::Release);
    }

    pub(crate) fn set_block_size(&self, block_size: u64) {
        self.block_size.store(block_size, Ordering::Release);
    }

    pub(crate) fn begin_sync(&self) {
        self.sync_writers.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn end_sync(&self) {
        self.sync_writers.fetch_sub(1, Ordering::AcqRel);
    }

    /// Clears the set-user-id and set-group-id bits if an unprivileged caller writes to an
    /// executable file. Returns the new mode if the bits were cleared.
    pub(crate) fn clear_setid_bits(&self, privileged: bool) -> Option<u32> {
        let mut attributes = self.attributes.lock();

        if privileged
            || attributes.mode & S_IXANY == 0
            || attributes.mode & (S_ISUID | S_ISGID) == 0
        {
            return None;
        }

        attributes.mode &= !(S_ISUID | S_ISGID);
        Some(attributes.mode)
    }

    /// Resolves a writer or append range lock request against the file's current size and block
    /// size. Runs under the range lock's internal mutex.
    ///
    /// An append request moves to the end of the file. A request that would grow the file beyond
    /// its current block size while that block size can still grow locks the whole file, because
    /// the block has to be rewritten at the new size.
    pub(crate) fn resolve_write_lock(&self, request: &mut LockRequest, max_block_size: u64) {
        let size = self.size();

        if request.mode == LockMode::Append {
            request.offset = size;
            request.mode = LockMode::Writer;
        }

        let block_size = self.block_size();
        let end_size = size.max(request.offset.saturating_add(request.len));

        if end_size > block_size && (!block_size.is_power_of_two() || block_size < max_block_size) {
            request.offset = 0;
            request.len = u64::MAX;
        }
    }
}
