// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use xxhash_rust::xxh3::xxh3_64;

use crate::{
    DurableStore, LoanedBuffer, ObjectId, PageSpan, StoreError, StoreResult, Transaction,
};

#[derive(Debug)]
struct Block {
    data: Vec<u8>,
    checksum: u64,
}

impl Block {
    fn zeroed(size: u64) -> Self {
        let data = vec![0; size as usize];
        let checksum = xxh3_64(&data);
        Self { data, checksum }
    }

    fn seal(&mut self) {
        self.checksum = xxh3_64(&self.data);
    }

    fn verify(&self) -> bool {
        xxh3_64(&self.data) == self.checksum
    }
}

#[derive(Debug)]
struct StoredObject {
    block_size: u64,
    blocks: BTreeMap<u64, Block>,
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<ObjectId, StoredObject>,
    next_object: u64,
    next_txn: u64,
    group: u64,
    busy: HashSet<ObjectId>,
    fail_next_open: bool,
    fail_next_commit: bool,
}

impl State {
    fn object(&self, object: ObjectId) -> StoreResult<&StoredObject> {
        self.objects
            .get(&object)
            .ok_or(StoreError::NoSuchObject(object))
    }

    fn object_mut(&mut self, object: ObjectId) -> StoreResult<&mut StoredObject> {
        self.objects
            .get_mut(&object)
            .ok_or(StoreError::NoSuchObject(object))
    }
}

/// A durable store that keeps objects in memory as sparse lists of checksummed blocks.
///
/// Every block carries an xxh3 checksum over its contents, verified on each read. A direct write
/// takes the checksum from one read of the caller's pages and the data from a second read, the
/// way a real store computes checksums and copies (or compresses) data in separate passes. If
/// the pages change in between, the block fails verification when read back.
///
/// Failures can be injected and counters observed to exercise the data path.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    commits: AtomicUsize,
    flushes: AtomicUsize,
    assigned_buffers: AtomicUsize,
    direct_writes: AtomicUsize,
    direct_reads: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty store in transaction group 1.
    #[must_use]
    pub fn new() -> Self {
        let store = Self::default();
        {
            let mut state = store.state.lock();
            state.next_object = 1;
            state.next_txn = 1;
            state.group = 1;
        }
        store
    }

    /// Closes the current transaction group. Later transactions belong to the next one.
    pub fn advance_group(&self) {
        self.state.lock().group += 1;
    }

    /// The transaction group new transactions are assigned to.
    #[must_use]
    pub fn group(&self) -> u64 {
        self.state.lock().group
    }

    /// Makes the next [`open_transaction()`][DurableStore::open_transaction] fail for lack of
    /// space.
    pub fn fail_next_open(&self) {
        self.state.lock().fail_next_open = true;
    }

    /// Makes the next [`commit()`][DurableStore::commit] fail.
    pub fn fail_next_commit(&self) {
        self.state.lock().fail_next_commit = true;
    }

    /// Marks the object as having changes the store cannot yet locate data and holes in.
    pub fn set_busy(&self, object: ObjectId, busy: bool) {
        let mut state = self.state.lock();
        if busy {
            state.busy.insert(object);
        } else {
            state.busy.remove(&object);
        }
    }

    /// Flips the bits of the stored byte at `offset` without updating the block's checksum.
    pub fn corrupt(&self, object: ObjectId, offset: u64) {
        let mut state = self.state.lock();
        let Ok(stored) = state.object_mut(object) else {
            return;
        };

        let block_size = stored.block_size;
        if let Some(block) = stored.blocks.get_mut(&(offset / block_size)) {
            block.data[(offset % block_size) as usize] ^= 0xff;
        }
    }

    /// Current block size of the object.
    #[must_use]
    pub fn block_size(&self, object: ObjectId) -> Option<u64> {
        self.state
            .lock()
            .objects
            .get(&object)
            .map(|stored| stored.block_size)
    }

    /// Number of successful commits.
    #[must_use]
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::Relaxed)
    }

    /// Number of flushes.
    #[must_use]
    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Number of loaned buffers written via [`assign_buffer()`][DurableStore::assign_buffer].
    #[must_use]
    pub fn assigned_buffers(&self) -> usize {
        self.assigned_buffers.load(Ordering::Relaxed)
    }

    /// Number of direct writes from pinned pages.
    #[must_use]
    pub fn direct_writes(&self) -> usize {
        self.direct_writes.load(Ordering::Relaxed)
    }

    /// Number of direct reads into pinned pages.
    #[must_use]
    pub fn direct_reads(&self) -> usize {
        self.direct_reads.load(Ordering::Relaxed)
    }

    /// Writes `len` bytes at `offset`, taking each block's bytes from `fill`.
    ///
    /// `fill` is called with the position within the written range and the destination slice,
    /// once to compute the checksum and once more for the stored bytes if `twice` is set.
    fn write_with(
        &self,
        object: ObjectId,
        offset: u64,
        len: usize,
        twice: bool,
        mut fill: impl FnMut(usize, &mut [u8]),
    ) -> StoreResult<()> {
        let mut state = self.state.lock();
        let stored = state.object_mut(object)?;
        let block_size = stored.block_size;
        let mut done = 0;

        while done < len {
            let at = offset + done as u64;
            let index = at / block_size;
            let in_block = (at % block_size) as usize;
            let piece = (block_size as usize - in_block).min(len - done);

            let block = stored
                .blocks
                .entry(index)
                .or_insert_with(|| Block::zeroed(block_size));

            let range = in_block..in_block + piece;
            fill(done, &mut block.data[range.clone()]);
            block.seal();

            if twice {
                // Give a racing store into unstable pages a chance to land between the passes.
                std::thread::yield_now();
                fill(done, &mut block.data[range]);
            }

            done += piece;
        }

        Ok(())
    }
}

impl DurableStore for MemoryStore {
    fn create_object(&self, block_size: u64) -> StoreResult<ObjectId> {
        let mut state = self.state.lock();
        let object = ObjectId(state.next_object);
        state.next_object += 1;
        state.objects.insert(
            object,
            StoredObject {
                block_size,
                blocks: BTreeMap::new(),
            },
        );
        Ok(object)
    }

    fn open_transaction(
        &self,
        object: ObjectId,
        _offset: u64,
        _len: u64,
    ) -> StoreResult<Transaction> {
        let mut state = self.state.lock();
        state.object(object)?;

        if std::mem::take(&mut state.fail_next_open) {
            return Err(StoreError::NoSpace);
        }

        let id = state.next_txn;
        state.next_txn += 1;
        Ok(Transaction::new(id, state.group))
    }

    fn commit(&self, txn: Transaction) -> StoreResult<()> {
        if std::mem::take(&mut self.state.lock().fail_next_commit) {
            return Err(StoreError::Failed(format!(
                "injected commit failure of transaction {}",
                txn.id()
            )));
        }

        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write(
        &self,
        _txn: &Transaction,
        object: ObjectId,
        offset: u64,
        src: &[u8],
    ) -> StoreResult<()> {
        self.write_with(object, offset, src.len(), false, |pos, dst| {
            dst.copy_from_slice(&src[pos..pos + dst.len()]);
        })
    }

    fn write_direct(
        &self,
        _txn: &Transaction,
        object: ObjectId,
        offset: u64,
        pages: PageSpan<'_>,
    ) -> StoreResult<()> {
        self.direct_writes.fetch_add(1, Ordering::Relaxed);
        self.write_with(object, offset, pages.len(), true, |pos, dst| {
            pages.subspan(pos, dst.len()).read(dst);
        })
    }

    fn read(&self, object: ObjectId, offset: u64, dst: &mut [u8]) -> StoreResult<()> {
        let state = self.state.lock();
        let stored = state.object(object)?;
        let block_size = stored.block_size;
        let mut done = 0;

        while done < dst.len() {
            let at = offset + done as u64;
            let index = at / block_size;
            let in_block = (at % block_size) as usize;
            let piece = (block_size as usize - in_block).min(dst.len() - done);
            let target = &mut dst[done..done + piece];

            match stored.blocks.get(&index) {
                Some(block) if !block.verify() => {
                    return Err(StoreError::ChecksumMismatch {
                        object,
                        offset: index * block_size,
                    });
                }
                Some(block) => target.copy_from_slice(&block.data[in_block..in_block + piece]),
                None => target.fill(0),
            }

            done += piece;
        }

        Ok(())
    }

    fn read_direct(&self, object: ObjectId, offset: u64, pages: PageSpan<'_>) -> StoreResult<()> {
        self.direct_reads.fetch_add(1, Ordering::Relaxed);

        let mut data = vec![0; pages.len()];
        self.read(object, offset, &mut data)?;
        pages.write(&data);
        Ok(())
    }

    fn borrow_buffer(&self, object: ObjectId, size: usize) -> LoanedBuffer {
        LoanedBuffer::new(object, size)
    }

    fn assign_buffer(
        &self,
        txn: &Transaction,
        object: ObjectId,
        offset: u64,
        buffer: LoanedBuffer,
    ) -> StoreResult<()> {
        self.assigned_buffers.fetch_add(1, Ordering::Relaxed);
        self.write(txn, object, offset, buffer.as_slice())
    }

    fn grow_block_size(&self, _txn: &Transaction, object: ObjectId, size: u64) -> StoreResult<u64> {
        let mut state = self.state.lock();
        let stored = state.object_mut(object)?;

        // Only a single-block object can change its block size.
        if size <= stored.block_size || stored.blocks.keys().any(|&index| index > 0) {
            return Ok(stored.block_size);
        }

        if let Some(block) = stored.blocks.get_mut(&0) {
            if !block.verify() {
                return Err(StoreError::ChecksumMismatch { object, offset: 0 });
            }
            block.data.resize(size as usize, 0);
            block.seal();
        }

        stored.block_size = size;
        Ok(size)
    }

    fn flush(&self, object: ObjectId) -> StoreResult<()> {
        self.state.lock().object(object)?;
        self.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn offset_next(&self, object: ObjectId, hole: bool, offset: u64) -> StoreResult<u64> {
        let state = self.state.lock();
        let stored = state.object(object)?;

        if state.busy.contains(&object) {
            return Err(StoreError::Busy(object));
        }

        let block_size = stored.block_size;
        let first = offset / block_size;

        if hole {
            let mut index = first;
            while stored.blocks.contains_key(&index) {
                index += 1;
            }
            return Ok(if index == first { offset } else { index * block_size });
        }

        match stored.blocks.range(first..).next() {
            Some((&index, _)) if index == first => Ok(offset),
            Some((&index, _)) => Ok(index * block_size),
            None => Err(StoreError::NotFound { object, offset }),
        }
    }
}
