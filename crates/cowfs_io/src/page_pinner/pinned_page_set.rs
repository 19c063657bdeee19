// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use tracing::{Level, event};

use crate::constants::PAGE_SIZE;
use crate::{Direction, Host, PageId, PageKind, PageSpan};

#[derive(Debug)]
struct PinEntry {
    /// Occurrences of the physical page in this set. The set holds one host pin for all of them.
    refs: usize,
    kind: PageKind,
    prepared: bool,
    stable: bool,
}

/// The caller pages pinned for one direct transfer, in the order they appear in the descriptor.
///
/// A physical page that backs more than one virtual range of the transfer is pinned once and
/// reference counted. Every virtual page that aliased the shared zero page gets a private
/// zero-filled page of its own when the set is stabilized. Dropping the set (or calling
/// [`release()`][Self::release]) ends writeback on stabilized pages, frees the private zero-page
/// substitutes and unpins every page exactly once.
/// Releasing a set that was only partly populated is safe.
#[derive(Debug)]
pub struct PinnedPageSet {
    host: Arc<dyn Host>,
    direction: Direction,

    /// Pages as pinned, one per virtual page of the transfer.
    origins: Vec<PageId>,

    /// Pages the data moves through. Differs from `origins` where a page was substituted.
    pages: Vec<PageId>,

    entries: HashMap<PageId, PinEntry>,

    /// Bytes remaining in the descriptor when the pages were pinned. Used to locate the current
    /// cursor position inside the set.
    base_resid: usize,

    stabilized: bool,
}

impl PinnedPageSet {
    pub(crate) fn new(host: Arc<dyn Host>, direction: Direction, base_resid: usize) -> Self {
        Self {
            host,
            direction,
            origins: Vec::new(),
            pages: Vec::new(),
            entries: HashMap::new(),
            base_resid,
            stabilized: false,
        }
    }

    /// Takes ownership of one pin on `page`.
    pub(crate) fn push(&mut self, page: PageId) {
        match self.entries.entry(page) {
            Entry::Occupied(mut occupied) => {
                // The set keeps a single pin per physical page.
                occupied.get_mut().refs += 1;
                self.host.unpin_page(page);

                event!(
                    Level::TRACE,
                    message = "page appears more than once in transfer",
                    %page,
                    refs = occupied.get().refs
                );
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PinEntry {
                    refs: 1,
                    kind: self.host.page_kind(page),
                    prepared: false,
                    stable: false,
                });
            }
        }

        self.origins.push(page);
        self.pages.push(page);
    }

    /// Number of virtual pages in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Whether the set holds no pages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// The pages the transfer moves data through, in descriptor order.
    #[must_use]
    pub fn pages(&self) -> &[PageId] {
        &self.pages
    }

    /// The direction of the transfer the pages were pinned for.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Whether the pages have been stabilized.
    #[must_use]
    pub const fn is_stabilized(&self) -> bool {
        self.stabilized
    }

    /// Whether the page at `index` aliased the shared zero page and was replaced by a private
    /// zero-filled page.
    #[must_use]
    pub fn is_zero_substituted(&self, index: usize) -> bool {
        self.origins.get(index) != self.pages.get(index)
    }

    /// Number of virtual pages of the transfer backed by the physical page `page`.
    #[must_use]
    pub fn references(&self, page: PageId) -> usize {
        self.entries.get(&page).map_or(0, |entry| entry.refs)
    }

    pub(crate) const fn base_resid(&self) -> usize {
        self.base_resid
    }

    pub(crate) fn span(&self, position: usize, len: usize) -> Option<PageSpan<'_>> {
        if position + len > self.pages.len() * PAGE_SIZE {
            return None;
        }

        Some(PageSpan::new(self.host.as_ref(), &self.pages, position, len))
    }

    /// Freezes the pages against concurrent change so the store may checksum or compress them in
    /// place. Only write transfers are stabilized.
    pub(crate) fn stabilize(&mut self) {
        if self.stabilized || self.direction != Direction::Write {
            return;
        }

        for (index, origin) in self.origins.iter().enumerate() {
            let Some(entry) = self.entries.get_mut(origin) else {
                continue;
            };

            match entry.kind {
                PageKind::SharedZero => {
                    // The shared zero page is never stable. Swap in a private copy per virtual
                    // page and let go of the shared one right away.
                    if !entry.prepared {
                        self.host.unpin_page(*origin);
                        entry.prepared = true;
                    }

                    let substitute = self.host.alloc_zeroed_page();
                    self.pages[index] = substitute;

                    event!(
                        Level::DEBUG,
                        message = "replaced shared zero page with private page",
                        index,
                        %substitute
                    );
                }
                PageKind::Normal | PageKind::Merged if !entry.prepared => {
                    entry.prepared = true;
                    self.host.lock_page(*origin);
                    self.host.wait_on_writeback(*origin);
                    self.host.clear_page_dirty_for_io(*origin);
                    self.host.set_page_writeback(*origin);
                    self.host.unlock_page(*origin);
                    entry.stable = true;
                }
                PageKind::Normal | PageKind::Merged => {}
            }
        }

        self.stabilized = true;
    }

    /// Releases every page in the set. Equivalent to dropping the set.
    pub fn release(mut self) {
        self.release_pages();
    }

    fn release_pages(&mut self) {
        let pages = std::mem::take(&mut self.pages);

        for (origin, page) in self.origins.drain(..).zip(pages) {
            if page != origin {
                self.host.free_page(page);
            }

            let Some(entry) = self.entries.get_mut(&origin) else {
                continue;
            };

            entry.refs -= 1;
            if entry.refs > 0 {
                continue;
            }

            let Some(entry) = self.entries.remove(&origin) else {
                continue;
            };

            if entry.kind == PageKind::SharedZero && entry.prepared {
                // The original pin was dropped during stabilization.
                continue;
            }

            if entry.stable {
                self.host.end_page_writeback(origin);
            }

            self.host.unpin_page(origin);
        }

        debug_assert!(self.entries.is_empty());
    }
}

impl Drop for PinnedPageSet {
    fn drop(&mut self) {
        self.release_pages();
    }
}
