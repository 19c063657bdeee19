// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::constants::PAGE_SIZE;
use crate::{Host, PageId};

/// A byte range over pinned pages, handed to the durable store for a direct transfer.
///
/// The range starts `offset` bytes into the first page and is contiguous across the pages.
#[derive(Clone, Copy, Debug)]
pub struct PageSpan<'a> {
    host: &'a dyn Host,
    pages: &'a [PageId],
    offset: usize,
    len: usize,
}

impl<'a> PageSpan<'a> {
    pub(crate) fn new(host: &'a dyn Host, pages: &'a [PageId], offset: usize, len: usize) -> Self {
        debug_assert!(offset + len <= pages.len() * PAGE_SIZE);
        Self {
            host,
            pages,
            offset,
            len,
        }
    }

    /// Length of the range in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the range is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The pages covering the range.
    #[must_use]
    pub const fn pages(&self) -> &'a [PageId] {
        self.pages
    }

    /// Narrows the span to `len` bytes starting `start` bytes into it.
    #[must_use]
    pub fn subspan(&self, start: usize, len: usize) -> Self {
        debug_assert!(start + len <= self.len);
        Self::new(self.host, self.pages, self.offset + start, len)
    }

    /// Reads the range into `dst`, which must be exactly as long as the range.
    pub fn read(&self, dst: &mut [u8]) {
        debug_assert_eq!(dst.len(), self.len);
        self.walk(|page, in_page, start, len| {
            self.host.read_page(page, in_page, &mut dst[start..start + len]);
        });
    }

    /// Writes `src`, which must be exactly as long as the range, into the pages.
    pub fn write(&self, src: &[u8]) {
        debug_assert_eq!(src.len(), self.len);
        self.walk(|page, in_page, start, len| {
            self.host.write_page(page, in_page, &src[start..start + len]);
        });
    }

    fn walk(&self, mut visit: impl FnMut(PageId, usize, usize, usize)) {
        let mut done = 0;

        while done < self.len {
            let position = self.offset + done;
            let in_page = position % PAGE_SIZE;
            let len = (PAGE_SIZE - in_page).min(self.len - done);

            visit(self.pages[position / PAGE_SIZE], in_page, done, len);
            done += len;
        }
    }
}
