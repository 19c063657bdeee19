// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;

use crate::{MemoryFault, PageId, PageKind};

/// The memory services the hosting environment provides to the data path.
///
/// Addresses are virtual addresses in the caller's address space. Pages are physical pages,
/// identified by [`PageId`].
///
/// # Stable pages
///
/// Once a page is marked as under writeback via [`set_page_writeback()`][Self::set_page_writeback],
/// the host guarantees that stores from the caller's address space into that page wait until
/// [`end_page_writeback()`][Self::end_page_writeback] is called. This is the property that lets
/// the durable store checksum or compress pinned caller pages in place.
///
/// # Thread safety
///
/// Implementations must be thread-safe; many data path calls use the host concurrently.
pub trait Host: Debug + Send + Sync {
    /// Copies `dst.len()` bytes of caller memory starting at `addr` into `dst`.
    ///
    /// If `nofault` is set, pages that are not resident are treated as a fault instead of being
    /// brought in. The writer uses this while a transaction is open so that a slow page-in cannot
    /// hold up the transaction.
    fn copy_from_user(&self, dst: &mut [u8], addr: u64, nofault: bool) -> Result<(), MemoryFault>;

    /// Copies `src` into caller memory starting at `addr`.
    fn copy_to_user(&self, addr: u64, src: &[u8]) -> Result<(), MemoryFault>;

    /// Makes the caller memory `[addr, addr + len)` resident so that later copies do not fault.
    fn fault_in_readable(&self, addr: u64, len: usize) -> Result<(), MemoryFault>;

    /// Pins `count` pages of caller memory starting at the page-aligned `addr`.
    ///
    /// `write` requests write intent: the data path will write into these pages (a read from the
    /// file into caller memory), so any copy-on-write sharing must be broken first.
    ///
    /// Returns a fault if not even the first page could be pinned. May return fewer pages than
    /// requested if pinning stopped part way; those pages are pinned and owned by the caller.
    fn pin_user_pages(
        &self,
        addr: u64,
        count: usize,
        write: bool,
    ) -> Result<Vec<PageId>, MemoryFault>;

    /// Drops one pin on a page.
    fn unpin_page(&self, page: PageId);

    /// Classifies a page for stabilization purposes.
    fn page_kind(&self, page: PageId) -> PageKind;

    /// Allocates a private zero-filled page.
    fn alloc_zeroed_page(&self) -> PageId;

    /// Frees a page obtained from [`alloc_zeroed_page()`][Self::alloc_zeroed_page].
    fn free_page(&self, page: PageId);

    /// Locks a page, waiting for any other holder to unlock it.
    fn lock_page(&self, page: PageId);

    /// Unlocks a page locked via [`lock_page()`][Self::lock_page].
    fn unlock_page(&self, page: PageId);

    /// Waits until the page is no longer under writeback.
    fn wait_on_writeback(&self, page: PageId);

    /// Clears the dirty bit ahead of handing the page to the store. Returns whether it was set.
    fn clear_page_dirty_for_io(&self, page: PageId) -> bool;

    /// Marks the page as under writeback, freezing it against stores from the caller.
    fn set_page_writeback(&self, page: PageId);

    /// Ends writeback on the page, waking any waiters.
    fn end_page_writeback(&self, page: PageId);

    /// Reads page contents starting at `offset` within the page into `dst`.
    fn read_page(&self, page: PageId, offset: usize, dst: &mut [u8]);

    /// Writes `src` into the page starting at `offset` within the page.
    fn write_page(&self, page: PageId, offset: usize, src: &[u8]);
}
