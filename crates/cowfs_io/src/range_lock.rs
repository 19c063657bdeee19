// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Display};

use parking_lot::{Condvar, Mutex};
use tracing::{Level, event};

/// How a byte range is locked.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LockMode {
    /// Shared with other readers, excludes writers.
    Reader,

    /// Exclusive.
    Writer,

    /// Exclusive, with the offset resolved to the end of the file once the lock can be granted.
    /// An append lock is held as a writer lock.
    Append,
}

impl Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reader => f.write_str("reader"),
            Self::Writer => f.write_str("writer"),
            Self::Append => f.write_str("append"),
        }
    }
}

/// A lock request as seen by a resolver passed to [`RangeLock::enter_with()`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LockRequest {
    /// First byte of the range.
    pub offset: u64,

    /// Length of the range. [`u64::MAX`] locks the whole object.
    pub len: u64,

    /// Mode of the request. A resolver turns [`LockMode::Append`] into [`LockMode::Writer`].
    pub mode: LockMode,
}

impl LockRequest {
    const fn end(&self) -> u64 {
        self.offset.saturating_add(self.len)
    }

    const fn conflicts_with(&self, other: &Self) -> bool {
        if matches!((self.mode, other.mode), (LockMode::Reader, LockMode::Reader)) {
            return false;
        }

        self.len > 0 && other.len > 0 && self.offset < other.end() && other.offset < self.end()
    }
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    held: Vec<(u64, LockRequest)>,

    /// Requests that could not be granted yet, as last resolved, keyed by arrival order.
    waiting: Vec<(u64, LockRequest)>,
}

impl State {
    fn blocked(&self, id: u64, request: &LockRequest) -> bool {
        self.held.iter().any(|(_, held)| held.conflicts_with(request))
            || self
                .waiting
                .iter()
                .any(|(waiting_id, waiting)| *waiting_id < id && waiting.conflicts_with(request))
    }

    /// Records the request as waiting. Returns whether what other waiters see of it changed.
    fn wait_as(&mut self, id: u64, request: LockRequest) -> bool {
        match self.waiting.iter_mut().find(|(waiting_id, _)| *waiting_id == id) {
            Some(entry) if entry.1 == request => false,
            Some(entry) => {
                entry.1 = request;
                true
            }
            None => {
                self.waiting.push((id, request));
                false
            }
        }
    }
}

/// Serializes overlapping byte-range operations on one object.
///
/// Readers share overlapping ranges; writers and appenders exclude everyone else on the ranges
/// they hold. Operations on disjoint ranges proceed concurrently. A held range is released when
/// its [`LockedRange`] is dropped.
///
/// Overlapping requests are granted in arrival order: a reader that arrives after a waiting
/// writer queues behind it instead of sharing the range with the readers that hold it.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug, Default)]
pub struct RangeLock {
    state: Mutex<State>,
    released: Condvar,
}

impl RangeLock {
    /// Creates a lock with no ranges held.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks `[offset, offset + len)`, waiting for conflicting holders to release it.
    ///
    /// An [`LockMode::Append`] request without a resolver is held as a writer lock on the range
    /// given.
    pub fn enter(&self, offset: u64, len: u64, mode: LockMode) -> LockedRange<'_> {
        self.enter_with(offset, len, mode, |request| {
            if request.mode == LockMode::Append {
                request.mode = LockMode::Writer;
            }
        })
    }

    /// Locks a range whose final extent is decided by `resolve`.
    ///
    /// For writer and append requests, `resolve` runs under the lock's internal mutex before every
    /// attempt to grant the lock, so it observes state that cannot change until the lock is
    /// granted or the attempt waits. It may move or widen the range (e.g. to the end of file, or to
    /// the whole object) and must turn an append request into a writer request. Reader requests
    /// are never passed to `resolve`.
    pub fn enter_with(
        &self,
        offset: u64,
        len: u64,
        mode: LockMode,
        mut resolve: impl FnMut(&mut LockRequest),
    ) -> LockedRange<'_> {
        let original = LockRequest { offset, len, mode };
        let mut state = self.state.lock();

        let id = state.next_id;
        state.next_id += 1;

        loop {
            let mut request = original;
            if mode != LockMode::Reader {
                resolve(&mut request);
                if request.mode == LockMode::Append {
                    request.mode = LockMode::Writer;
                }
            }

            if !state.blocked(id, &request) {
                let queued = state.waiting.len();
                state.waiting.retain(|(waiting_id, _)| *waiting_id != id);
                state.held.push((id, request));

                if state.waiting.len() != queued {
                    // The range granted may differ from the one later requests queued behind.
                    self.released.notify_all();
                }

                return LockedRange {
                    lock: self,
                    id,
                    request,
                };
            }

            if state.wait_as(id, request) {
                // Later requests may no longer overlap the moved range.
                self.released.notify_all();
            }

            self.released.wait(&mut state);
        }
    }

    fn update(&self, id: u64, request: LockRequest) {
        let mut state = self.state.lock();
        if let Some(entry) = state.held.iter_mut().find(|(held_id, _)| *held_id == id) {
            entry.1 = request;
        }

        self.released.notify_all();
    }

    fn exit(&self, id: u64) {
        let mut state = self.state.lock();
        state.held.retain(|(held_id, _)| *held_id != id);

        self.released.notify_all();
    }

    #[cfg(test)]
    fn waiters(&self) -> usize {
        self.state.lock().waiting.len()
    }
}

/// A byte range held under a [`RangeLock`]. The range is unlocked when this is dropped.
#[derive(Debug)]
pub struct LockedRange<'a> {
    lock: &'a RangeLock,
    id: u64,
    request: LockRequest,
}

impl LockedRange<'_> {
    /// First byte of the held range.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.request.offset
    }

    /// Length of the held range.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.request.len
    }

    /// Whether the held range is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.request.len == 0
    }

    /// Mode the range is held in. Never [`LockMode::Append`].
    #[must_use]
    pub const fn mode(&self) -> LockMode {
        self.request.mode
    }

    /// Whether the range covers the whole object.
    #[must_use]
    pub const fn is_whole_object(&self) -> bool {
        self.request.offset == 0 && self.request.len == u64::MAX
    }

    /// Narrows the held range to `[offset, offset + len)`, letting waiters on the released part
    /// proceed.
    pub fn reduce(&mut self, offset: u64, len: u64) {
        debug_assert!(offset >= self.request.offset);
        debug_assert!(offset.saturating_add(len) <= self.request.end());

        event!(
            Level::DEBUG,
            message = "narrowing range lock",
            from_offset = self.request.offset,
            from_len = self.request.len,
            offset,
            len
        );

        self.request.offset = offset;
        self.request.len = len;
        self.lock.update(self.id, self.request);
    }
}

impl Drop for LockedRange<'_> {
    fn drop(&mut self) {
        self.lock.exit(self.id);
    }
}
