// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::io_descriptor::segmented::{
    SegmentedMemory, move_segmented, page_aligned_segmented, skip_segmented,
};
use crate::io_descriptor::{ByteMover, Cursor};
use crate::{MemoryFault, Result, Transfer, UserSegment};

/// Scatter list over buffers owned by the host side of the data path. Never faults.
#[derive(Debug)]
pub(crate) struct KernelSpaceMemory {
    buffers: Vec<Vec<u8>>,
}

impl KernelSpaceMemory {
    pub(crate) const fn new(buffers: Vec<Vec<u8>>) -> Self {
        Self { buffers }
    }

    pub(crate) fn total_len(&self) -> usize {
        self.buffers.iter().map(Vec::len).sum()
    }

    pub(crate) fn buffers(&self) -> &[Vec<u8>] {
        &self.buffers
    }

    pub(crate) fn into_buffers(self) -> Vec<Vec<u8>> {
        self.buffers
    }
}

impl SegmentedMemory for KernelSpaceMemory {
    fn segment_count(&self) -> usize {
        self.buffers.len()
    }

    fn segment_len(&self, index: usize) -> usize {
        self.buffers[index].len()
    }

    fn segment_addr(&self, index: usize) -> u64 {
        self.buffers[index].as_ptr() as u64
    }

    fn transfer(
        &mut self,
        index: usize,
        skip: usize,
        buf: Transfer<'_>,
        _nofault: bool,
    ) -> std::result::Result<(), MemoryFault> {
        let segment = &mut self.buffers[index];

        match buf {
            Transfer::ToDescriptor(src) => {
                segment[skip..skip + src.len()].copy_from_slice(src);
            }
            Transfer::FromDescriptor(dst) => {
                let len = dst.len();
                dst.copy_from_slice(&segment[skip..skip + len]);
            }
        }

        Ok(())
    }
}

impl ByteMover for KernelSpaceMemory {
    fn move_bytes(
        &mut self,
        cursor: &mut Cursor,
        buf: Transfer<'_>,
        nofault: bool,
    ) -> Result<usize> {
        move_segmented(self, cursor, buf, nofault)
    }

    fn skip(&mut self, cursor: &mut Cursor, n: usize) {
        skip_segmented(self, cursor, n);
    }

    fn page_aligned(&self, cursor: &Cursor) -> bool {
        page_aligned_segmented(self, cursor)
    }

    fn prefault(&self, _cursor: &Cursor, _n: usize) -> Result<()> {
        Ok(())
    }

    fn user_segments(&self, _cursor: &Cursor) -> Option<Vec<UserSegment>> {
        None
    }
}
