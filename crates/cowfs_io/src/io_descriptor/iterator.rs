// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;

use crate::host::is_page_aligned;
use crate::io_descriptor::{ByteMover, Cursor};
use crate::{Error, MemoryFault, Result, Transfer, UserSegment};

/// A positional iterator over memory that tracks its own position, as supplied by the hosting
/// environment for splice-style and vectored transfers.
///
/// Unlike the segmented backends, the iterator owns its position. A "copy without consuming"
/// through an iterator therefore has to [`revert()`][Self::revert] the iterator explicitly.
pub trait IoIterator: Debug + Send {
    /// Bytes remaining in the iterator.
    fn count(&self) -> usize;

    /// Copies `src` into the iterator's memory and advances past it. Returns the bytes copied,
    /// which may be fewer than requested if the memory faulted or the consumer is full.
    fn copy_to_iter(&mut self, src: &[u8]) -> usize;

    /// Fills `dst` from the iterator's memory and advances past it. Returns the bytes copied.
    fn copy_from_iter(&mut self, dst: &mut [u8]) -> usize;

    /// Advances the position by `n` bytes without copying.
    fn advance(&mut self, n: usize);

    /// Moves the position back by `n` bytes.
    fn revert(&mut self, n: usize);

    /// Makes the next `n` bytes resident.
    ///
    /// # Errors
    ///
    /// Returns a fault if some of the memory cannot be made resident.
    fn fault_in_readable(&self, n: usize) -> std::result::Result<(), MemoryFault>;

    /// The remaining memory as caller address ranges, if the iterator is backed by caller memory.
    fn user_segments(&self) -> Option<Vec<UserSegment>>;
}

/// Generic iterator backend.
#[derive(Debug)]
pub(crate) struct IteratorMemory {
    iter: Box<dyn IoIterator>,
}

impl IteratorMemory {
    pub(crate) fn new(iter: Box<dyn IoIterator>) -> Self {
        Self { iter }
    }

    pub(crate) fn count(&self) -> usize {
        self.iter.count()
    }
}

impl ByteMover for IteratorMemory {
    fn move_bytes(
        &mut self,
        cursor: &mut Cursor,
        buf: Transfer<'_>,
        _nofault: bool,
    ) -> Result<usize> {
        let count = buf.len().min(cursor.resid);

        let moved = match buf {
            Transfer::ToDescriptor(src) => self.iter.copy_to_iter(&src[..count]),
            Transfer::FromDescriptor(dst) => self.iter.copy_from_iter(&mut dst[..count]),
        };

        // A consumer that takes nothing (e.g. a full pipe) is reported as a fault so the caller
        // can back off and retry.
        if moved == 0 {
            return Err(Error::MemoryFault);
        }

        cursor.consume_linear(moved);
        Ok(moved)
    }

    fn skip(&mut self, cursor: &mut Cursor, n: usize) {
        self.iter.advance(n);
        cursor.consume_linear(n);
    }

    fn revert(&mut self, n: usize) {
        self.iter.revert(n);
    }

    fn page_aligned(&self, _cursor: &Cursor) -> bool {
        self.iter.user_segments().is_some_and(|segments| {
            segments
                .iter()
                .all(|s| is_page_aligned(s.addr) && is_page_aligned(s.len as u64))
        })
    }

    fn prefault(&self, cursor: &Cursor, n: usize) -> Result<()> {
        self.iter.fault_in_readable(n.min(cursor.resid))?;
        Ok(())
    }

    fn user_segments(&self, _cursor: &Cursor) -> Option<Vec<UserSegment>> {
        self.iter.user_segments()
    }
}
