// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::PageId;

/// A contiguous range of caller (user-space) memory.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UserSegment {
    /// Virtual address of the first byte.
    pub addr: u64,

    /// Length of the range in bytes.
    pub len: usize,
}

impl UserSegment {
    /// Creates a segment describing `[addr, addr + len)`.
    #[must_use]
    pub const fn new(addr: u64, len: usize) -> Self {
        Self { addr, len }
    }
}

/// A range of bytes inside one physical page, as found in block-I/O vector lists.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BioVec {
    /// The page holding the bytes.
    pub page: PageId,

    /// Offset of the first byte inside the page.
    pub offset: usize,

    /// Length of the range in bytes.
    pub len: usize,
}

impl BioVec {
    /// Creates a vector entry describing `len` bytes at `offset` inside `page`.
    #[must_use]
    pub const fn new(page: PageId, offset: usize, len: usize) -> Self {
        Self { page, offset, len }
    }
}
