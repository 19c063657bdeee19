// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;

use crate::ObjectId;

/// The host's page cache for memory-mapped files.
///
/// Buffered transfers route through cached pages where present so that readers and writers stay
/// coherent with memory mappings of the file. Direct transfers never fall back to this path once
/// their pages are pinned.
pub trait CachedPages: Debug + Send + Sync {
    /// Whether any page of `object` in `[start, end)` is cached.
    fn has_cached_data(&self, object: ObjectId, start: u64, end: u64) -> bool;

    /// Fills `dst` from the cached page holding `[offset, offset + dst.len())`, which lies within
    /// one page. Returns `false` if that page is not cached.
    fn read_cached(&self, object: ObjectId, offset: u64, dst: &mut [u8]) -> bool;

    /// Refreshes any cached pages of `object` overlapping `[offset, offset + src.len())` with
    /// `src`.
    fn update_pages(&self, object: ObjectId, offset: u64, src: &[u8]);

    /// Writes back dirty cached pages of `object` to the store.
    fn flush_cached(&self, object: ObjectId);
}

/// The page cache of a host that never memory-maps files.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCachedPages;

impl CachedPages for NoCachedPages {
    fn has_cached_data(&self, _object: ObjectId, _start: u64, _end: u64) -> bool {
        false
    }

    fn read_cached(&self, _object: ObjectId, _offset: u64, _dst: &mut [u8]) -> bool {
        false
    }

    #[cfg_attr(test, mutants::skip)]
    fn update_pages(&self, _object: ObjectId, _offset: u64, _src: &[u8]) {}

    #[cfg_attr(test, mutants::skip)]
    fn flush_cached(&self, _object: ObjectId) {}
}
