// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::{HashMap, HashSet};

use parking_lot::{Condvar, Mutex};

use crate::constants::{PAGE_SIZE, PAGE_SIZE_U64};
use crate::host::div_round_up_pages;
use crate::{Host, MemoryFault, PageId, PageKind};

// Leaves page zero and everything below unmapped, so small addresses always fault.
const FIRST_VPN: u64 = 0x1_0000;

#[derive(Debug)]
struct Frame {
    data: Vec<u8>,
    kind: PageKind,
    mappings: usize,
    pins: usize,
    writeback: bool,
    dirty: bool,
    locked: bool,

    // Allocated through `alloc_zeroed_page()`, owned by the data path rather than a mapping.
    kernel: bool,
}

impl Frame {
    fn new(kind: PageKind, kernel: bool) -> Self {
        Self {
            data: vec![0; PAGE_SIZE],
            kind,
            mappings: 0,
            pins: 0,
            writeback: false,
            dirty: false,
            locked: false,
            kernel,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Mapping {
    frame: u64,
    resident: bool,
}

#[derive(Debug)]
struct State {
    frames: HashMap<u64, Frame>,
    next_frame: u64,
    mappings: HashMap<u64, Mapping>,
    next_vpn: u64,
    zero_frame: u64,
    short_pin: Option<usize>,
    copy_faults: HashSet<u64>,
}

impl State {
    fn new() -> Self {
        let mut state = Self {
            frames: HashMap::new(),
            next_frame: 1,
            mappings: HashMap::new(),
            next_vpn: FIRST_VPN,
            zero_frame: 0,
            short_pin: None,
            copy_faults: HashSet::new(),
        };

        state.zero_frame = state.allocate_frame(PageKind::SharedZero, false);
        state
    }

    fn allocate_frame(&mut self, kind: PageKind, kernel: bool) -> u64 {
        let id = self.next_frame;
        self.next_frame += 1;
        self.frames.insert(id, Frame::new(kind, kernel));
        id
    }

    /// Reserves `pages` virtual pages followed by an unmapped guard page.
    fn reserve(&mut self, pages: usize) -> u64 {
        let base = self.next_vpn;
        self.next_vpn += pages as u64 + 1;
        base
    }

    fn map(&mut self, vpn: u64, frame: u64) {
        if let Some(f) = self.frames.get_mut(&frame) {
            f.mappings += 1;
        }

        if let Some(old) = self.mappings.insert(vpn, Mapping { frame, resident: true }) {
            self.release_mapping(old.frame);
        }
    }

    fn unmap(&mut self, vpn: u64) {
        if let Some(old) = self.mappings.remove(&vpn) {
            self.release_mapping(old.frame);
        }
    }

    fn release_mapping(&mut self, frame: u64) {
        if let Some(f) = self.frames.get_mut(&frame) {
            f.mappings = f.mappings.saturating_sub(1);
        }
        self.collect(frame);
    }

    /// Frees a frame nobody maps, pins or owns.
    fn collect(&mut self, frame: u64) {
        let unused = self.frames.get(&frame).is_some_and(|f| {
            f.mappings == 0 && f.pins == 0 && !f.kernel && f.kind != PageKind::SharedZero
        });

        if unused {
            self.frames.remove(&frame);
        }
    }

    /// Gives the virtual page a frame of its own, copying the shared contents (copy-on-write).
    fn make_private(&mut self, vpn: u64) -> Option<u64> {
        let mapping = *self.mappings.get(&vpn)?;
        let frame = self.frames.get(&mapping.frame)?;

        if frame.kind == PageKind::Normal && frame.mappings == 1 {
            return Some(mapping.frame);
        }

        let data = frame.data.clone();
        let private = self.allocate_frame(PageKind::Normal, false);
        if let Some(f) = self.frames.get_mut(&private) {
            f.data = data;
        }

        self.map(vpn, private);
        Some(private)
    }

    fn frame_of(&self, addr: u64) -> Option<u64> {
        self.mappings
            .get(&(addr / PAGE_SIZE_U64))
            .map(|mapping| mapping.frame)
    }
}

/// A host with a simulated virtual address space over physical page frames.
///
/// Memory from [`allocate()`][Self::allocate] starts out mapped to the shared zero page, like
/// untouched anonymous memory. Stores through [`store()`][Self::store] (or
/// [`Host::copy_to_user()`]) break copy-on-write sharing and wait while the target page is under
/// writeback, which is the stable-page guarantee the data path relies on. Pins with write intent
/// break copy-on-write sharing too.
///
/// Faults, short pins and paged-out memory can be injected to exercise error paths.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug)]
pub struct SimulatedHost {
    state: Mutex<State>,
    changed: Condvar,
}

impl SimulatedHost {
    /// Creates a host with an empty address space.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::new()),
            changed: Condvar::new(),
        }
    }

    /// Maps `len` bytes (rounded up to whole pages) of untouched memory backed by the shared zero
    /// page and returns its page-aligned address.
    pub fn allocate(&self, len: usize) -> u64 {
        let mut state = self.state.lock();
        let pages = div_round_up_pages(len);
        let base = state.reserve(pages);
        let zero = state.zero_frame;

        for vpn in base..base + pages as u64 {
            state.map(vpn, zero);
        }

        base * PAGE_SIZE_U64
    }

    /// Maps `len` bytes (rounded up to whole pages) of private memory filled with `byte`.
    pub fn allocate_filled(&self, len: usize, byte: u8) -> u64 {
        let mut state = self.state.lock();
        let pages = div_round_up_pages(len);
        let base = state.reserve(pages);

        for vpn in base..base + pages as u64 {
            let frame = state.allocate_frame(PageKind::Normal, false);
            if let Some(f) = state.frames.get_mut(&frame) {
                f.data.fill(byte);
            }
            state.map(vpn, frame);
        }

        base * PAGE_SIZE_U64
    }

    /// Stores `src` at `addr` as the owner of the memory would.
    ///
    /// # Errors
    ///
    /// Returns a fault if part of the range is not mapped.
    pub fn store(&self, addr: u64, src: &[u8]) -> Result<(), MemoryFault> {
        let mut state = self.state.lock();
        let mut done = 0;

        while done < src.len() {
            let at = addr + done as u64;
            let vpn = at / PAGE_SIZE_U64;
            let in_page = (at % PAGE_SIZE_U64) as usize;
            let len = (PAGE_SIZE - in_page).min(src.len() - done);

            let Some(mapping) = state.mappings.get(&vpn).copied() else {
                return Err(MemoryFault { copied: done });
            };

            if state.frames.get(&mapping.frame).is_some_and(|f| f.writeback) {
                // Stable page, wait and look the page up again.
                self.changed.wait(&mut state);
                continue;
            }

            let Some(frame) = state.make_private(vpn) else {
                return Err(MemoryFault { copied: done });
            };

            if let Some(m) = state.mappings.get_mut(&vpn) {
                m.resident = true;
            }

            if let Some(f) = state.frames.get_mut(&frame) {
                f.data[in_page..in_page + len].copy_from_slice(&src[done..done + len]);
                f.dirty = true;
            }

            done += len;
        }

        Ok(())
    }

    /// Loads `len` bytes at `addr` as the owner of the memory would.
    ///
    /// # Errors
    ///
    /// Returns a fault if part of the range is not mapped.
    pub fn load(&self, addr: u64, len: usize) -> Result<Vec<u8>, MemoryFault> {
        let mut data = vec![0; len];
        self.copy_in(&mut data, addr, false)?;
        Ok(data)
    }

    /// Makes the page at `source` share the frame of the page at `target`, as the host's
    /// same-page merging would for pages with identical contents.
    pub fn merge_pages(&self, target: u64, source: u64) {
        let mut state = self.state.lock();

        let Some(frame) = state.frame_of(target) else {
            return;
        };

        if let Some(f) = state.frames.get_mut(&frame) {
            f.kind = PageKind::Merged;
        }

        state.map(source / PAGE_SIZE_U64, frame);
    }

    /// Removes the mapping of every page overlapping `[addr, addr + len)`.
    pub fn unmap(&self, addr: u64, len: usize) {
        let mut state = self.state.lock();

        for vpn in Self::vpns(addr, len) {
            state.unmap(vpn);
        }
    }

    /// Pages out every page overlapping `[addr, addr + len)`. Copies that may not fault then
    /// fail on them until they are faulted in again.
    pub fn page_out(&self, addr: u64, len: usize) {
        let mut state = self.state.lock();

        for vpn in Self::vpns(addr, len) {
            if let Some(m) = state.mappings.get_mut(&vpn) {
                m.resident = false;
            }
        }
    }

    /// Makes the next [`Host::pin_user_pages()`] call pin at most `pages` pages.
    pub fn inject_short_pin(&self, pages: usize) {
        self.state.lock().short_pin = Some(pages);
    }

    /// Makes the next copy from the page at `addr` fault once, even though the page is mapped
    /// and resident.
    pub fn inject_copy_fault(&self, addr: u64) {
        self.state.lock().copy_faults.insert(addr / PAGE_SIZE_U64);
    }

    /// The physical page currently behind `addr`.
    #[must_use]
    pub fn translate(&self, addr: u64) -> Option<PageId> {
        self.state.lock().frame_of(addr).map(PageId)
    }

    /// Number of pins held on the page currently behind `addr`.
    #[must_use]
    pub fn pins(&self, addr: u64) -> usize {
        let state = self.state.lock();
        state
            .frame_of(addr)
            .and_then(|frame| state.frames.get(&frame))
            .map_or(0, |f| f.pins)
    }

    /// Number of pins held on all pages.
    #[must_use]
    pub fn total_pins(&self) -> usize {
        self.state.lock().frames.values().map(|f| f.pins).sum()
    }

    /// Number of pages allocated by the data path and not yet freed.
    #[must_use]
    pub fn kernel_pages(&self) -> usize {
        self.state
            .lock()
            .frames
            .values()
            .filter(|f| f.kernel)
            .count()
    }

    /// Whether any page is currently under writeback.
    #[must_use]
    pub fn any_writeback(&self) -> bool {
        self.state.lock().frames.values().any(|f| f.writeback)
    }

    fn vpns(addr: u64, len: usize) -> std::ops::Range<u64> {
        let first = addr / PAGE_SIZE_U64;
        let last = (addr + len as u64).div_ceil(PAGE_SIZE_U64);
        first..last
    }

    fn copy_in(&self, dst: &mut [u8], addr: u64, nofault: bool) -> Result<(), MemoryFault> {
        let mut state = self.state.lock();
        let mut done = 0;

        while done < dst.len() {
            let at = addr + done as u64;
            let vpn = at / PAGE_SIZE_U64;
            let in_page = (at % PAGE_SIZE_U64) as usize;
            let len = (PAGE_SIZE - in_page).min(dst.len() - done);

            let Some(mapping) = state.mappings.get(&vpn).copied() else {
                return Err(MemoryFault { copied: done });
            };

            if state.copy_faults.remove(&vpn) || (nofault && !mapping.resident) {
                return Err(MemoryFault { copied: done });
            }

            if let Some(m) = state.mappings.get_mut(&vpn) {
                m.resident = true;
            }

            if let Some(f) = state.frames.get(&mapping.frame) {
                dst[done..done + len].copy_from_slice(&f.data[in_page..in_page + len]);
            }

            done += len;
        }

        Ok(())
    }

    fn with_frame<R>(&self, page: PageId, f: impl FnOnce(&mut Frame) -> R) -> Option<R> {
        self.state.lock().frames.get_mut(&page.0).map(f)
    }
}

impl Default for SimulatedHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for SimulatedHost {
    fn copy_from_user(&self, dst: &mut [u8], addr: u64, nofault: bool) -> Result<(), MemoryFault> {
        self.copy_in(dst, addr, nofault)
    }

    fn copy_to_user(&self, addr: u64, src: &[u8]) -> Result<(), MemoryFault> {
        self.store(addr, src)
    }

    fn fault_in_readable(&self, addr: u64, len: usize) -> Result<(), MemoryFault> {
        let mut state = self.state.lock();

        for vpn in Self::vpns(addr, len) {
            let Some(mapping) = state.mappings.get_mut(&vpn) else {
                let copied = (vpn * PAGE_SIZE_U64).saturating_sub(addr) as usize;
                return Err(MemoryFault { copied });
            };
            mapping.resident = true;
        }

        Ok(())
    }

    fn pin_user_pages(
        &self,
        addr: u64,
        count: usize,
        write: bool,
    ) -> Result<Vec<PageId>, MemoryFault> {
        let mut state = self.state.lock();
        let limit = state.short_pin.take().map_or(count, |pages| pages.min(count));
        let first = addr / PAGE_SIZE_U64;
        let mut pages = Vec::with_capacity(limit);

        for vpn in first..first + limit as u64 {
            let Some(mapping) = state.mappings.get(&vpn).copied() else {
                break;
            };

            let frame = if write {
                match state.make_private(vpn) {
                    Some(frame) => frame,
                    None => break,
                }
            } else {
                mapping.frame
            };

            if let Some(m) = state.mappings.get_mut(&vpn) {
                m.resident = true;
            }

            if let Some(f) = state.frames.get_mut(&frame) {
                f.pins += 1;
            }

            pages.push(PageId(frame));
        }

        if pages.is_empty() && count > 0 {
            return Err(MemoryFault::immediate());
        }

        Ok(pages)
    }

    fn unpin_page(&self, page: PageId) {
        let mut state = self.state.lock();

        if let Some(f) = state.frames.get_mut(&page.0) {
            f.pins = f.pins.saturating_sub(1);
        }
        state.collect(page.0);
    }

    fn page_kind(&self, page: PageId) -> PageKind {
        self.with_frame(page, |f| f.kind)
            .unwrap_or(PageKind::Normal)
    }

    fn alloc_zeroed_page(&self) -> PageId {
        PageId(self.state.lock().allocate_frame(PageKind::Normal, true))
    }

    fn free_page(&self, page: PageId) {
        let mut state = self.state.lock();

        if state.frames.get(&page.0).is_some_and(|f| f.kernel) {
            state.frames.remove(&page.0);
        }
    }

    fn lock_page(&self, page: PageId) {
        let mut state = self.state.lock();

        while state.frames.get(&page.0).is_some_and(|f| f.locked) {
            self.changed.wait(&mut state);
        }

        if let Some(f) = state.frames.get_mut(&page.0) {
            f.locked = true;
        }
    }

    fn unlock_page(&self, page: PageId) {
        self.with_frame(page, |f| f.locked = false);
        self.changed.notify_all();
    }

    fn wait_on_writeback(&self, page: PageId) {
        let mut state = self.state.lock();

        while state.frames.get(&page.0).is_some_and(|f| f.writeback) {
            self.changed.wait(&mut state);
        }
    }

    fn clear_page_dirty_for_io(&self, page: PageId) -> bool {
        self.with_frame(page, |f| std::mem::replace(&mut f.dirty, false))
            .unwrap_or(false)
    }

    fn set_page_writeback(&self, page: PageId) {
        self.with_frame(page, |f| f.writeback = true);
    }

    fn end_page_writeback(&self, page: PageId) {
        self.with_frame(page, |f| f.writeback = false);
        self.changed.notify_all();
    }

    fn read_page(&self, page: PageId, offset: usize, dst: &mut [u8]) {
        self.with_frame(page, |f| {
            dst.copy_from_slice(&f.data[offset..offset + dst.len()]);
        });
    }

    fn write_page(&self, page: PageId, offset: usize, src: &[u8]) {
        self.with_frame(page, |f| {
            f.data[offset..offset + src.len()].copy_from_slice(src);
        });
    }
}
