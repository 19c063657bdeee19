// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::host::is_page_aligned;
use crate::io_descriptor::Cursor;
use crate::{Error, MemoryFault, Result, Transfer};

/// Memory made of an ordered list of segments that the cursor walks by index and skip.
///
/// The user-space, kernel-space and block-vector backends all share this walk; they only differ
/// in how one contiguous piece of one segment is copied.
pub(crate) trait SegmentedMemory {
    fn segment_count(&self) -> usize;

    fn segment_len(&self, index: usize) -> usize;

    /// Address of the first byte of the segment, used for alignment checks.
    fn segment_addr(&self, index: usize) -> u64;

    /// Copies `buf.len()` bytes between the linear buffer and the segment, starting `skip` bytes
    /// into the segment. The caller guarantees the range lies within the segment.
    fn transfer(
        &mut self,
        index: usize,
        skip: usize,
        buf: Transfer<'_>,
        nofault: bool,
    ) -> std::result::Result<(), MemoryFault>;
}

/// Moves up to `buf.len()` bytes, advancing the cursor by what was actually copied.
///
/// On a fault, the cursor still reflects the partial progress made before the fault.
pub(crate) fn move_segmented<M: SegmentedMemory>(
    memory: &mut M,
    cursor: &mut Cursor,
    mut buf: Transfer<'_>,
    nofault: bool,
) -> Result<usize> {
    let requested = buf.len();
    let mut done = 0;

    while done < requested && cursor.resid > 0 && cursor.index < memory.segment_count() {
        let segment_len = memory.segment_len(cursor.index);
        let count = (segment_len - cursor.skip)
            .min(requested - done)
            .min(cursor.resid);

        if count == 0 {
            // Empty segment.
            cursor.index += 1;
            cursor.skip = 0;
            continue;
        }

        let result = memory.transfer(
            cursor.index,
            cursor.skip,
            buf.slice(done..done + count),
            nofault,
        );

        let copied = match result {
            Ok(()) => count,
            Err(fault) => fault.copied.min(count),
        };

        cursor.consume(copied, segment_len);
        done += copied;

        if result.is_err() {
            return Err(Error::MemoryFault);
        }
    }

    Ok(done)
}

/// Advances the cursor by `n` bytes without transferring anything.
pub(crate) fn skip_segmented<M: SegmentedMemory>(memory: &M, cursor: &mut Cursor, n: usize) {
    if n > cursor.resid {
        return;
    }

    cursor.skip += n;
    while cursor.index < memory.segment_count() {
        let segment_len = memory.segment_len(cursor.index);
        if cursor.skip < segment_len {
            break;
        }

        cursor.skip -= segment_len;
        cursor.index += 1;
    }

    cursor.resid -= n;
    cursor.offset += n as u64;
}

/// Whether every remaining non-empty segment starts on a page boundary and spans whole pages.
pub(crate) fn page_aligned_segmented<M: SegmentedMemory>(memory: &M, cursor: &Cursor) -> bool {
    let mut skip = cursor.skip;

    for index in cursor.index..memory.segment_count() {
        let addr = memory.segment_addr(index) + skip as u64;
        let size = (memory.segment_len(index) - skip) as u64;
        skip = 0;

        if size == 0 {
            continue;
        }

        if !is_page_aligned(addr) || !is_page_aligned(size) {
            return false;
        }
    }

    true
}

/// Calls `visit(index, skip, len)` for each remaining piece of memory up to `n` bytes.
pub(crate) fn for_each_remaining<M: SegmentedMemory>(
    memory: &M,
    cursor: &Cursor,
    n: usize,
    mut visit: impl FnMut(usize, usize, usize) -> Result<()>,
) -> Result<()> {
    let mut left = n.min(cursor.resid);
    let mut skip = cursor.skip;
    let mut index = cursor.index;

    while left > 0 && index < memory.segment_count() {
        let count = (memory.segment_len(index) - skip).min(left);
        if count > 0 {
            visit(index, skip, count)?;
        }

        left -= count;
        skip = 0;
        index += 1;
    }

    Ok(())
}
