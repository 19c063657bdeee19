// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Display};

use crate::constants::{PAGE_SIZE, PAGE_SIZE_U64};

/// Identity of a physical page of host memory.
///
/// Two virtual pages that resolve to the same `PageId` share the same physical memory.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PageId(pub u64);

impl Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page#{}", self.0)
    }
}

/// What the host knows about a physical page that matters for stabilization.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PageKind {
    /// An ordinary page owned by one virtual range.
    Normal,

    /// The host's shared read-only all-zero page, mapped by untouched anonymous memory. It may be
    /// swapped for another page at any time and must never be handed to the store as stable.
    SharedZero,

    /// A page merged by the host across unrelated virtual ranges with identical contents
    /// (copy-on-write shared).
    Merged,
}

pub(crate) const fn page_align_down(addr: u64) -> u64 {
    addr & !(PAGE_SIZE_U64 - 1)
}

pub(crate) const fn page_align_up(addr: u64) -> u64 {
    page_align_down(addr + PAGE_SIZE_U64 - 1)
}

pub(crate) const fn is_page_aligned(value: u64) -> bool {
    value & (PAGE_SIZE_U64 - 1) == 0
}

/// Number of pages touched by the byte range `[addr, addr + len)`.
pub(crate) const fn pages_spanned(addr: u64, len: usize) -> usize {
    if len == 0 {
        return 0;
    }

    ((page_align_up(addr + len as u64) - page_align_down(addr)) / PAGE_SIZE_U64) as usize
}

pub(crate) const fn div_round_up_pages(len: usize) -> usize {
    len.div_ceil(PAGE_SIZE)
}
