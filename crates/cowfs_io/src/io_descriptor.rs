// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The I/O descriptor: one move/skip/copy protocol over heterogeneous memory representations.

mod backend;
mod block_vector;
mod cursor;
mod direction;
mod iterator;
mod kernel_space;
mod segment;
mod segmented;
mod transfer;
mod user_iter;
mod user_space;

use std::sync::Arc;

pub use backend::BackendKind;
pub(crate) use backend::*;
pub(crate) use block_vector::*;
pub(crate) use cursor::*;
pub use direction::*;
pub use iterator::IoIterator;
pub(crate) use iterator::IteratorMemory;
pub(crate) use kernel_space::*;
pub use segment::*;
pub use transfer::*;
pub use user_iter::*;
pub(crate) use user_space::*;

use crate::{Host, PageSpan, PinnedPageSet, Result};

/// A logical byte buffer taking part in one read or write call, with a mutable transfer cursor.
///
/// The descriptor hides which kind of memory holds the bytes (see [`BackendKind`]). The data path
/// moves bytes between the descriptor and linear buffers with [`move_bytes()`][Self::move_bytes],
/// which consumes them, or [`copy_without_consuming()`][Self::copy_without_consuming], which
/// leaves the descriptor exactly as it was.
///
/// While a direct transfer is in flight the descriptor owns the [`PinnedPageSet`] backing it.
/// The set is released when the descriptor is dropped, or earlier via
/// [`release_pinned()`][Self::release_pinned].
///
/// # Thread safety
///
/// This type is `Send` but is only ever used by the thread performing the call.
#[derive(Debug)]
pub struct IoDescriptor {
    backend: Backend,
    cursor: Cursor,
    start_offset: u64,
    nofault: bool,
    direct: bool,
    pinned: Option<PinnedPageSet>,
}

impl IoDescriptor {
    fn with_backend(backend: Backend, resid: usize, offset: u64) -> Self {
        Self {
            backend,
            cursor: Cursor::new(resid, offset),
            start_offset: offset,
            nofault: false,
            direct: false,
            pinned: None,
        }
    }

    /// Creates a descriptor over caller memory, targeting the file at `offset`.
    #[must_use]
    pub fn user_space(host: Arc<dyn Host>, segments: Vec<UserSegment>, offset: u64) -> Self {
        let memory = UserSpaceMemory::new(host, segments);
        let resid = memory.total_len();
        Self::with_backend(Backend::UserSpace(memory), resid, offset)
    }

    /// Creates a descriptor over buffers owned by the caller of the data path.
    ///
    /// The buffers can be recovered with [`into_kernel_buffers()`][Self::into_kernel_buffers]
    /// after a read.
    #[must_use]
    pub fn kernel_space(buffers: Vec<Vec<u8>>, offset: u64) -> Self {
        let memory = KernelSpaceMemory::new(buffers);
        let resid = memory.total_len();
        Self::with_backend(Backend::KernelSpace(memory), resid, offset)
    }

    /// Creates a descriptor over a list of block-I/O vectors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`][crate::Error::Unsupported] if a vector does not fit inside
    /// its page.
    pub fn block_vector(host: Arc<dyn Host>, vectors: Vec<BioVec>, offset: u64) -> Result<Self> {
        let memory = BlockVectorMemory::new(host, vectors)?;
        let resid = memory.total_len();
        Ok(Self::with_backend(Backend::BlockVector(memory), resid, offset))
    }

    /// Creates a descriptor over a generic positional iterator.
    #[must_use]
    pub fn from_iterator(iter: Box<dyn IoIterator>, offset: u64) -> Self {
        let memory = IteratorMemory::new(iter);
        let resid = memory.count();
        Self::with_backend(Backend::GenericIterator(memory), resid, offset)
    }

    /// The kind of memory behind the descriptor.
    #[must_use]
    pub const fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Bytes remaining to be transferred.
    #[must_use]
    pub const fn resid(&self) -> usize {
        self.cursor.resid
    }

    /// File offset of the next byte to be transferred.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.cursor.offset
    }

    /// File offset the call started at (after append resolution).
    #[must_use]
    pub const fn start_offset(&self) -> u64 {
        self.start_offset
    }

    /// Repositions the descriptor in the file, e.g. once an append has resolved the end of file.
    pub fn set_offset(&mut self, offset: u64) {
        self.cursor.offset = offset;
        self.start_offset = offset;
    }

    /// Moves up to `buf.len()` bytes between the descriptor and the linear buffer, consuming them.
    ///
    /// Stops early if the descriptor runs out of bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryFault`][crate::Error::MemoryFault] if caller memory could not be
    /// accessed. The cursor reflects the bytes moved before the fault.
    pub fn move_bytes(&mut self, buf: Transfer<'_>) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        self.backend
            .mover()
            .move_bytes(&mut self.cursor, buf, self.nofault)
    }

    /// Copies bytes from the linear buffer into the descriptor.
    ///
    /// # Errors
    ///
    /// See [`move_bytes()`][Self::move_bytes].
    pub fn move_from(&mut self, src: &[u8]) -> Result<usize> {
        self.move_bytes(Transfer::ToDescriptor(src))
    }

    /// Copies bytes from the descriptor into the linear buffer.
    ///
    /// # Errors
    ///
    /// See [`move_bytes()`][Self::move_bytes].
    pub fn move_into(&mut self, dst: &mut [u8]) -> Result<usize> {
        self.move_bytes(Transfer::FromDescriptor(dst))
    }

    /// Performs the same transfer as [`move_bytes()`][Self::move_bytes] but leaves the
    /// descriptor unchanged on return, including any position state inside the backend.
    ///
    /// # Errors
    ///
    /// See [`move_bytes()`][Self::move_bytes].
    pub fn copy_without_consuming(&mut self, buf: Transfer<'_>) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let saved = self.cursor;
        let mover = self.backend.mover();

        let result = mover.move_bytes(&mut self.cursor, buf, self.nofault);
        mover.revert(saved.resid - self.cursor.resid);
        self.cursor = saved;

        result
    }

    /// Advances the cursor by `n` bytes without transferring them. Ignored if fewer than `n`
    /// bytes remain.
    pub fn skip(&mut self, n: usize) {
        if n > self.cursor.resid {
            return;
        }

        self.backend.mover().skip(&mut self.cursor, n);
    }

    /// Whether every remaining segment starts on a host page boundary and spans whole pages.
    #[must_use]
    pub fn page_aligned(&self) -> bool {
        self.backend.mover_ref().page_aligned(&self.cursor)
    }

    /// Whether the file offset and remaining length are multiples of `block_size`.
    #[must_use]
    pub const fn block_aligned(&self, block_size: u64) -> bool {
        self.cursor.offset % block_size == 0 && self.cursor.resid as u64 % block_size == 0
    }

    /// Brings the next `n` bytes of caller memory in so that copying them does not fault. Memory
    /// owned by the data path's host never faults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryFault`][crate::Error::MemoryFault] if the memory is not accessible.
    pub fn prefault(&self, n: usize) -> Result<()> {
        self.backend.mover_ref().prefault(&self.cursor, n)
    }

    /// The buffers behind a kernel-space descriptor.
    #[must_use]
    pub fn kernel_buffers(&self) -> Option<&[Vec<u8>]> {
        match &self.backend {
            Backend::KernelSpace(memory) => Some(memory.buffers()),
            _ => None,
        }
    }

    /// Consumes a kernel-space descriptor, returning its buffers.
    #[must_use]
    pub fn into_kernel_buffers(self) -> Option<Vec<Vec<u8>>> {
        match self.backend {
            Backend::KernelSpace(memory) => Some(memory.into_buffers()),
            _ => None,
        }
    }

    /// Whether the descriptor currently transfers directly through pinned pages.
    #[must_use]
    pub const fn is_direct(&self) -> bool {
        self.direct
    }

    /// The pinned pages backing a direct transfer, if any.
    #[must_use]
    pub const fn pinned_pages(&self) -> Option<&PinnedPageSet> {
        self.pinned.as_ref()
    }

    /// Releases the pinned pages, if any, and turns the descriptor back into a buffered one.
    pub fn release_pinned(&mut self) {
        self.direct = false;
        if let Some(pinned) = self.pinned.take() {
            pinned.release();
        }
    }

    pub(crate) fn attach_pinned(&mut self, pinned: PinnedPageSet) {
        self.pinned = Some(pinned);
        self.direct = true;
    }

    /// Temporarily routes the descriptor through the buffered path while keeping its pages pinned.
    pub(crate) fn suspend_direct(&mut self) {
        self.direct = false;
    }

    /// Resumes direct transfer after [`suspend_direct()`][Self::suspend_direct].
    pub(crate) fn resume_direct(&mut self) {
        self.direct = self.pinned.is_some();
    }

    pub(crate) const fn set_nofault(&mut self, nofault: bool) {
        self.nofault = nofault;
    }

    pub(crate) fn user_segments(&self) -> Option<Vec<UserSegment>> {
        self.backend.mover_ref().user_segments(&self.cursor)
    }

    /// The pinned pages holding the next `len` bytes of the descriptor.
    pub(crate) fn pinned_span(&self, len: usize) -> Option<PageSpan<'_>> {
        let pinned = self.pinned.as_ref()?;
        let position = pinned.base_resid().checked_sub(self.cursor.resid)?;
        pinned.span(position, len.min(self.cursor.resid))
    }

    /// Accounts for `n` bytes transferred directly through the pinned pages.
    pub(crate) fn advance_direct(&mut self, n: usize) {
        self.skip(n);
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    #[test]
    fn thread_safe_type() {
        assert_impl_all!(IoDescriptor: Send);
    }

    #[test]
    fn kernel_space_move_and_copy() {
        let mut uio = IoDescriptor::kernel_space(vec![vec![1, 2, 3], vec![4, 5]], 10);
        let mut peek = [0_u8; 4];

        assert_eq!(
            uio.copy_without_consuming(Transfer::FromDescriptor(&mut peek))
                .unwrap(),
            4
        );
        assert_eq!(peek, [1, 2, 3, 4]);
        assert_eq!(uio.resid(), 5);
        assert_eq!(uio.offset(), 10);

        let mut dst = [0_u8; 2];
        assert_eq!(uio.move_into(&mut dst).unwrap(), 2);
        assert_eq!(dst, [1, 2]);
        assert_eq!(uio.resid(), 3);
        assert_eq!(uio.offset(), 12);

        assert_eq!(uio.move_from(&[9, 9, 9, 9]).unwrap(), 3);
        assert_eq!(uio.resid(), 0);
        assert_eq!(
            uio.into_kernel_buffers().unwrap(),
            vec![vec![1, 2, 9], vec![9, 9]]
        );
    }

    #[test]
    fn skip_beyond_resid_is_ignored() {
        let mut uio = IoDescriptor::kernel_space(vec![vec![0; 8]], 0);

        uio.skip(9);
        assert_eq!(uio.resid(), 8);

        uio.skip(8);
        assert_eq!(uio.resid(), 0);
        assert_eq!(uio.offset(), 8);
    }

    #[test]
    fn block_alignment_uses_offset_and_length() {
        let uio = IoDescriptor::kernel_space(vec![vec![0; 1024]], 512);
        assert!(uio.block_aligned(512));
        assert!(!uio.block_aligned(1024));
    }

    #[test]
    fn kernel_space_is_never_pinnable() {
        let uio = IoDescriptor::kernel_space(vec![vec![0; 4096]], 0);
        assert!(uio.user_segments().is_none());
        uio.prefault(4096).unwrap();
    }
}
