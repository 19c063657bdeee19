// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Transfer position of an I/O descriptor.
///
/// `resid` only ever decreases, except when a "copy without consuming" restores a saved cursor.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct Cursor {
    /// Bytes remaining to be transferred.
    pub(crate) resid: usize,

    /// Index of the current segment (segmented backends only).
    pub(crate) index: usize,

    /// Bytes already consumed from the current segment (segmented backends only).
    pub(crate) skip: usize,

    /// File offset of the next byte.
    pub(crate) offset: u64,
}

impl Cursor {
    pub(crate) const fn new(resid: usize, offset: u64) -> Self {
        Self {
            resid,
            index: 0,
            skip: 0,
            offset,
        }
    }

    /// Accounts for `n` bytes consumed from the current segment of length `segment_len`.
    pub(crate) fn consume(&mut self, n: usize, segment_len: usize) {
        debug_assert!(self.skip + n <= segment_len);
        debug_assert!(n <= self.resid);

        self.skip += n;
        if self.skip == segment_len {
            self.skip = 0;
            self.index += 1;
        }

        self.resid -= n;
        self.offset += n as u64;
    }

    /// Accounts for `n` bytes consumed by a backend that tracks its own position.
    pub(crate) fn consume_linear(&mut self, n: usize) {
        debug_assert!(n <= self.resid);

        self.resid -= n;
        self.offset += n as u64;
    }
}
