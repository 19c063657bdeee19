// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Pinning, stabilizing and releasing caller pages for direct (page-cache bypassing) transfers.

mod page_span;
mod pinned_page_set;

use std::sync::Arc;

pub use page_span::*;
pub use pinned_page_set::*;
use tracing::{Level, event};

use crate::host::{div_round_up_pages, page_align_down, pages_spanned};
use crate::{Direction, Error, Host, IoDescriptor, Result};

/// Pins the caller memory behind an [`IoDescriptor`] so that the durable store can transfer data
/// to or from it without an intermediate copy.
#[derive(Clone, Debug)]
pub struct PagePinner {
    host: Arc<dyn Host>,
}

impl PagePinner {
    /// Creates a pinner that pins through `host`.
    #[must_use]
    pub const fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }

    /// Pins the pages backing the remaining bytes of `uio`, in descriptor order.
    ///
    /// A transfer that reads from the file into caller memory pins with write intent.
    ///
    /// # Errors
    ///
    /// * [`Error::Unsupported`] if the memory is not caller memory, or if fewer pages were pinned
    ///   than the descriptor spans.
    /// * [`Error::Misaligned`] if the descriptor is not page aligned.
    /// * [`Error::MemoryFault`] if the host refused to pin the memory.
    ///
    /// No pages remain pinned when an error is returned.
    pub fn acquire(&self, uio: &IoDescriptor, direction: Direction) -> Result<PinnedPageSet> {
        let Some(segments) = uio.user_segments() else {
            return Err(Error::Unsupported("descriptor memory cannot be pinned"));
        };

        if !uio.page_aligned() {
            return Err(Error::Misaligned);
        }

        let wanted = uio.resid();
        let mut pinned = PinnedPageSet::new(Arc::clone(&self.host), direction, wanted);

        for segment in segments.iter().filter(|s| s.len > 0) {
            let count = pages_spanned(segment.addr, segment.len);
            let pages = self
                .host
                .pin_user_pages(
                    page_align_down(segment.addr),
                    count,
                    direction.writes_memory(),
                )
                .map_err(|fault| {
                    event!(
                        Level::WARN,
                        message = "failed to pin caller pages",
                        addr = segment.addr,
                        count,
                        copied = fault.copied
                    );
                    Error::MemoryFault
                })?;

            let got = pages.len();
            for page in pages {
                pinned.push(page);
            }

            if got != count {
                // Dropping the partial set unpins what was pinned so far.
                event!(
                    Level::WARN,
                    message = "pinned fewer caller pages than requested",
                    addr = segment.addr,
                    requested = count,
                    pinned = got
                );
                return Err(Error::Unsupported("short page pin"));
            }
        }

        if pinned.len() != div_round_up_pages(wanted) {
            event!(
                Level::WARN,
                message = "pinned page count does not match transfer length",
                pages = pinned.len(),
                bytes = wanted
            );
            return Err(Error::Unsupported("pinned extent mismatch"));
        }

        Ok(pinned)
    }

    /// Freezes the pinned pages of a write against concurrent change. Reads are left untouched.
    pub fn stabilize(&self, pinned: &mut PinnedPageSet) {
        pinned.stabilize();
    }

    /// Releases a set of pinned pages. Equivalent to dropping it.
    pub fn release(&self, pinned: PinnedPageSet) {
        pinned.release();
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::{always, eq};

    use super::*;
    use crate::constants::PAGE_SIZE;
    use crate::{MemoryFault, MockHost, PageId, PageKind, UserSegment};

    const PAGE: u64 = PAGE_SIZE as u64;

    fn descriptor(host: &Arc<MockHost>, segments: Vec<UserSegment>) -> IoDescriptor {
        IoDescriptor::user_space(Arc::clone(host) as Arc<dyn Host>, segments, 0)
    }

    #[test]
    fn read_pins_with_write_intent() {
        let mut host = MockHost::new();
        host.expect_pin_user_pages()
            .with(eq(4 * PAGE), eq(2), eq(true))
            .times(1)
            .returning(|_, _, _| Ok(vec![PageId(1), PageId(2)]));
        host.expect_page_kind().return_const(PageKind::Normal);
        host.expect_unpin_page().times(2).return_const(());
        let host = Arc::new(host);

        let uio = descriptor(&host, vec![UserSegment::new(4 * PAGE, 2 * PAGE_SIZE)]);
        let pinned = PagePinner::new(host.clone())
            .acquire(&uio, Direction::Read)
            .unwrap();

        assert_eq!(pinned.pages(), &[PageId(1), PageId(2)]);
        assert_eq!(pinned.direction(), Direction::Read);
    }

    #[test]
    fn short_pin_is_unsupported_and_unwound() {
        let mut host = MockHost::new();
        host.expect_pin_user_pages()
            .with(eq(0), eq(1), eq(false))
            .times(1)
            .returning(|_, _, _| Ok(vec![PageId(1)]));
        host.expect_pin_user_pages()
            .with(eq(8 * PAGE), eq(3), eq(false))
            .times(1)
            .returning(|_, _, _| Ok(vec![PageId(2)]));
        host.expect_page_kind().return_const(PageKind::Normal);
        host.expect_unpin_page()
            .with(eq(PageId(1)))
            .times(1)
            .return_const(());
        host.expect_unpin_page()
            .with(eq(PageId(2)))
            .times(1)
            .return_const(());
        let host = Arc::new(host);

        let uio = descriptor(
            &host,
            vec![UserSegment::new(0, PAGE_SIZE), UserSegment::new(8 * PAGE, 3 * PAGE_SIZE)],
        );
        let result = PagePinner::new(host.clone())
            .acquire(&uio, Direction::Write);

        assert!(matches!(result, Err(Error::Unsupported(_))));
    }

    #[test]
    fn pin_fault_releases_earlier_segments() {
        let mut host = MockHost::new();
        let mut calls = 0;
        host.expect_pin_user_pages()
            .with(always(), eq(1), eq(false))
            .times(2)
            .returning(move |_, _, _| {
                calls += 1;
                if calls == 1 { Ok(vec![PageId(5)]) } else { Err(MemoryFault::immediate()) }
            });
        host.expect_page_kind().return_const(PageKind::Normal);
        host.expect_unpin_page()
            .with(eq(PageId(5)))
            .times(1)
            .return_const(());
        let host = Arc::new(host);

        let uio = descriptor(
            &host,
            vec![UserSegment::new(0, PAGE_SIZE), UserSegment::new(PAGE, PAGE_SIZE)],
        );
        let result = PagePinner::new(host.clone())
            .acquire(&uio, Direction::Write);

        assert!(matches!(result, Err(Error::MemoryFault)));
    }

    #[test]
    fn misaligned_and_unpinnable_memory_is_rejected() {
        let host = Arc::new(MockHost::new());
        let pinner = PagePinner::new(host.clone());

        let uio = descriptor(&host, vec![UserSegment::new(512, PAGE_SIZE)]);
        assert!(matches!(
            pinner.acquire(&uio, Direction::Write),
            Err(Error::Misaligned)
        ));

        let uio = IoDescriptor::kernel_space(vec![vec![0; PAGE_SIZE]], 0);
        assert!(matches!(
            pinner.acquire(&uio, Direction::Write),
            Err(Error::Unsupported(_))
        ));
    }
}
