// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use crate::io_descriptor::segmented::{
    SegmentedMemory, for_each_remaining, move_segmented, page_aligned_segmented, skip_segmented,
};
use crate::io_descriptor::{ByteMover, Cursor};
use crate::{Host, MemoryFault, Result, Transfer, UserSegment};

/// Scatter list over caller memory, accessed through the host.
#[derive(Debug)]
pub(crate) struct UserSpaceMemory {
    host: Arc<dyn Host>,
    segments: Vec<UserSegment>,
}

impl UserSpaceMemory {
    pub(crate) fn new(host: Arc<dyn Host>, segments: Vec<UserSegment>) -> Self {
        Self { host, segments }
    }

    pub(crate) fn total_len(&self) -> usize {
        self.segments.iter().map(|s| s.len).sum()
    }
}

impl SegmentedMemory for UserSpaceMemory {
    fn segment_count(&self) -> usize {
        self.segments.len()
    }

    fn segment_len(&self, index: usize) -> usize {
        self.segments[index].len
    }

    fn segment_addr(&self, index: usize) -> u64 {
        self.segments[index].addr
    }

    fn transfer(
        &mut self,
        index: usize,
        skip: usize,
        buf: Transfer<'_>,
        nofault: bool,
    ) -> std::result::Result<(), MemoryFault> {
        let addr = self.segments[index].addr + skip as u64;

        match buf {
            Transfer::ToDescriptor(src) => self.host.copy_to_user(addr, src),
            Transfer::FromDescriptor(dst) => self.host.copy_from_user(dst, addr, nofault),
        }
    }
}

impl ByteMover for UserSpaceMemory {
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

    fn prefault(&self, cursor: &Cursor, n: usize) -> Result<()> {
        for_each_remaining(self, cursor, n, |index, skip, len| {
            self.host
                .fault_in_readable(self.segments[index].addr + skip as u64, len)?;
            Ok(())
        })
    }

    fn user_segments(&self, cursor: &Cursor) -> Option<Vec<UserSegment>> {
        let mut segments = Vec::new();
        let mut left = cursor.resid;
        let mut skip = cursor.skip;

        for segment in self.segments.iter().skip(cursor.index) {
            if left == 0 {
                break;
            }

            let len = (segment.len - skip).min(left);
            if len > 0 {
                segments.push(UserSegment::new(segment.addr + skip as u64, len));
            }

            left -= len;
            skip = 0;
        }

        Some(segments)
    }
}
