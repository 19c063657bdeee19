// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use crate::constants::PAGE_SIZE;
use crate::io_descriptor::segmented::{SegmentedMemory, move_segmented, skip_segmented};
use crate::io_descriptor::{ByteMover, Cursor};
use crate::{BioVec, Error, Host, MemoryFault, Result, Transfer, UserSegment};

/// List of block-I/O vectors, each a range inside one physical page.
#[derive(Debug)]
pub(crate) struct BlockVectorMemory {
    host: Arc<dyn Host>,
    vectors: Vec<BioVec>,
}

impl BlockVectorMemory {
    pub(crate) fn new(host: Arc<dyn Host>, vectors: Vec<BioVec>) -> Result<Self> {
        if vectors.iter().any(|v| v.offset + v.len > PAGE_SIZE) {
            return Err(Error::Unsupported("block vector crosses a page boundary"));
        }

        Ok(Self { host, vectors })
    }

    pub(crate) fn total_len(&self) -> usize {
        self.vectors.iter().map(|v| v.len).sum()
    }
}

impl SegmentedMemory for BlockVectorMemory {
    fn segment_count(&self) -> usize {
        self.vectors.len()
    }

    fn segment_len(&self, index: usize) -> usize {
        self.vectors[index].len
    }

    fn segment_addr(&self, index: usize) -> u64 {
        self.vectors[index].offset as u64
    }

    fn transfer(
        &mut self,
        index: usize,
        skip: usize,
        buf: Transfer<'_>,
        _nofault: bool,
    ) -> std::result::Result<(), MemoryFault> {
        let vector = self.vectors[index];
        let offset = vector.offset + skip;

        match buf {
            Transfer::ToDescriptor(src) => self.host.write_page(vector.page, offset, src),
            Transfer::FromDescriptor(dst) => self.host.read_page(vector.page, offset, dst),
        }

        Ok(())
    }
}

impl ByteMover for BlockVectorMemory {
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

    // Block vectors are never eligible for direct transfer.
    fn page_aligned(&self, _cursor: &Cursor) -> bool {
        false
    }

    fn prefault(&self, _cursor: &Cursor, _n: usize) -> Result<()> {
        Ok(())
    }

    fn user_segments(&self, _cursor: &Cursor) -> Option<Vec<UserSegment>> {
        None
    }
}
