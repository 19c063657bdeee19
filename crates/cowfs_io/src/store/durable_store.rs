// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;

use crate::{LoanedBuffer, ObjectId, PageSpan, StoreResult, Transaction};

/// The transactional object store under the data path.
///
/// The store owns allocation, write scheduling, checksumming and compression. The data path only
/// opens transactions, writes and reads chunks inside them and commits them.
///
/// Direct reads and writes receive a [`PageSpan`] over pinned caller pages. For writes, the pages
/// are stabilized, so the store may checksum or compress them in place.
///
/// # Thread safety
///
/// Implementations must be thread-safe.
pub trait DurableStore: Debug + Send + Sync {
    /// Creates a new, empty object with the given initial block size.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot allocate the object.
    fn create_object(&self, block_size: u64) -> StoreResult<ObjectId>;

    /// Opens a transaction for writing `len` bytes at `offset` in `object`. May block while the
    /// store applies backpressure.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be admitted (e.g. the store is out of space).
    fn open_transaction(&self, object: ObjectId, offset: u64, len: u64) -> StoreResult<Transaction>;

    /// Commits a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit failed.
    fn commit(&self, txn: Transaction) -> StoreResult<()>;

    /// Writes `src` at `offset` in `object` under `txn`, through the store's cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the write could not be recorded.
    fn write(
        &self,
        txn: &Transaction,
        object: ObjectId,
        offset: u64,
        src: &[u8],
    ) -> StoreResult<()>;

    /// Writes the bytes of stabilized pinned pages at `offset` in `object` under `txn`, bypassing
    /// the store's cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the write could not be recorded.
    fn write_direct(
        &self,
        txn: &Transaction,
        object: ObjectId,
        offset: u64,
        pages: PageSpan<'_>,
    ) -> StoreResult<()>;

    /// Reads `dst.len()` bytes at `offset` in `object`. Bytes beyond the stored data read as zero.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ChecksumMismatch`][crate::StoreError::ChecksumMismatch] if the data
    /// fails verification.
    fn read(&self, object: ObjectId, offset: u64, dst: &mut [u8]) -> StoreResult<()>;

    /// Reads into pinned pages, bypassing the store's cache.
    ///
    /// # Errors
    ///
    /// See [`read()`][Self::read].
    fn read_direct(&self, object: ObjectId, offset: u64, pages: PageSpan<'_>) -> StoreResult<()>;

    /// Lends a buffer of `size` bytes for a later [`assign_buffer()`][Self::assign_buffer].
    fn borrow_buffer(&self, object: ObjectId, size: usize) -> LoanedBuffer;

    /// Writes a loaned buffer at `offset` in `object` under `txn`, taking ownership of it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write could not be recorded.
    fn assign_buffer(
        &self,
        txn: &Transaction,
        object: ObjectId,
        offset: u64,
        buffer: LoanedBuffer,
    ) -> StoreResult<()>;

    /// Asks the store to grow the block size of `object` to `size` and returns the block size in
    /// effect afterward. The store may refuse (e.g. for an object with more than one block), in
    /// which case the old block size is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the store failed to process the request.
    fn grow_block_size(&self, txn: &Transaction, object: ObjectId, size: u64) -> StoreResult<u64>;

    /// Makes all committed changes to `object` durable before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if the changes could not be made durable.
    fn flush(&self, object: ObjectId) -> StoreResult<()>;

    /// Finds the first offset at or beyond `offset` that holds data (or a hole, if `hole` is set).
    ///
    /// # Errors
    ///
    /// * [`StoreError::NotFound`][crate::StoreError::NotFound] if there is no such offset.
    /// * [`StoreError::Busy`][crate::StoreError::Busy] if the object has unflushed changes.
    fn offset_next(&self, object: ObjectId, hole: bool, offset: u64) -> StoreResult<u64>;
}
