// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::constants::{PAGE_SIZE, PAGE_SIZE_U64};
use crate::{CachedPages, ObjectId};

/// A page cache holding the memory-mapped pages of objects, keyed by page-aligned offset.
///
/// Pages are added with [`cache_page()`][Self::cache_page], standing in for a file region that a
/// process has mapped and stored into.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug, Default)]
pub struct MemoryPageCache {
    pages: Mutex<BTreeMap<(ObjectId, u64), Vec<u8>>>,
    flushes: AtomicUsize,
}

impl MemoryPageCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caches the page of `object` containing `offset` with `data`, padded or cut to a page.
    pub fn cache_page(&self, object: ObjectId, offset: u64, mut data: Vec<u8>) {
        data.resize(PAGE_SIZE, 0);
        self.pages
            .lock()
            .insert((object, offset - offset % PAGE_SIZE_U64), data);
    }

    /// The cached page of `object` containing `offset`.
    #[must_use]
    pub fn page(&self, object: ObjectId, offset: u64) -> Option<Vec<u8>> {
        self.pages
            .lock()
            .get(&(object, offset - offset % PAGE_SIZE_U64))
            .cloned()
    }

    /// Number of flushes requested.
    #[must_use]
    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::Relaxed)
    }
}

impl CachedPages for MemoryPageCache {
    fn has_cached_data(&self, object: ObjectId, start: u64, end: u64) -> bool {
        if start >= end {
            return false;
        }

        let first = start - start % PAGE_SIZE_U64;
        self.pages
            .lock()
            .range((object, first)..(object, end))
            .next()
            .is_some()
    }

    fn read_cached(&self, object: ObjectId, offset: u64, dst: &mut [u8]) -> bool {
        let in_page = (offset % PAGE_SIZE_U64) as usize;

        match self.pages.lock().get(&(object, offset - in_page as u64)) {
            Some(page) => {
                dst.copy_from_slice(&page[in_page..in_page + dst.len()]);
                true
            }
            None => false,
        }
    }

    fn update_pages(&self, object: ObjectId, offset: u64, src: &[u8]) {
        let end = offset + src.len() as u64;
        let first = offset - offset % PAGE_SIZE_U64;

        let mut pages = self.pages.lock();
        for (&(_, page_offset), page) in pages.range_mut((object, first)..(object, end)) {
            let from = page_offset.max(offset);
            let to = (page_offset + PAGE_SIZE_U64).min(end);

            page[(from - page_offset) as usize..(to - page_offset) as usize]
                .copy_from_slice(&src[(from - offset) as usize..(to - offset) as usize]);
        }
    }

    fn flush_cached(&self, _object: ObjectId) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }
}
