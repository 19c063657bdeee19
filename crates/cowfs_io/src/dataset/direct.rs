// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use tracing::{Level, event};

use crate::constants::PAGE_SIZE_U64;
use crate::{
    Credentials, Dataset, Direction, DirectPolicy, Error, FileNode, IoDescriptor, IoFlags, Result,
};

impl Dataset {
    /// Whether a call with `flags` should attempt a direct transfer under the dataset's policy.
    #[must_use]
    pub fn check_direct_enabled(&self, flags: IoFlags) -> bool {
        match self.config.direct() {
            DirectPolicy::Disabled => false,
            DirectPolicy::Standard => flags.direct,
            DirectPolicy::Always => true,
        }
    }

    /// Decides whether a call transfers directly between the descriptor's memory and the store.
    ///
    /// Returns `Ok(true)` once the descriptor's pages are pinned (and, for writes, stabilized);
    /// the descriptor then owns them until it is dropped or
    /// [`IoDescriptor::release_pinned()`] is called. `flags.direct` is updated to reflect the
    /// decision.
    ///
    /// Returns `Ok(false)` if the call must use the store's cache: the dataset disables direct
    /// transfer, the call did not ask for it, or part of the range is memory-mapped. Under
    /// [`DirectPolicy::Always`], calls that are not page aligned (or, for writes, shorter than
    /// a file block) quietly use the cache too.
    ///
    /// # Errors
    ///
    /// * [`Error::Misaligned`] if the caller asked for a direct transfer and the descriptor's
    ///   memory, offset or length is not page aligned.
    /// * Errors of [`PagePinner::acquire()`][crate::PagePinner::acquire].
    pub fn setup_direct(
        &self,
        file: &FileNode,
        uio: &mut IoDescriptor,
        direction: Direction,
        flags: &mut IoFlags,
    ) -> Result<bool> {
        let policy = self.config.direct();
        if policy == DirectPolicy::Disabled {
            flags.direct = false;
            return Ok(false);
        }

        let aligned = uio.page_aligned() && uio.block_aligned(PAGE_SIZE_U64);

        if policy == DirectPolicy::Always
            && aligned
            && (direction == Direction::Read || uio.resid() as u64 >= file.block_size())
        {
            flags.direct = true;
        }

        if !flags.direct || uio.resid() == 0 {
            flags.direct = false;
            return Ok(false);
        }

        if !aligned {
            return Err(Error::Misaligned);
        }

        let start = uio.offset();
        let end = start + uio.resid() as u64;
        if self.cache.has_cached_data(file.object(), start, end) {
            event!(
                Level::DEBUG,
                message = "memory-mapped range, using buffered transfer",
                object = %file.object(),
                start,
                end
            );
            flags.direct = false;
            return Ok(false);
        }

        let mut pinned = self.pinner.acquire(uio, direction)?;
        self.pinner.stabilize(&mut pinned);
        uio.attach_pinned(pinned);

        event!(
            Level::TRACE,
            message = "direct transfer set up",
            object = %file.object(),
            %direction,
            offset = start,
            len = end - start
        );

        Ok(true)
    }

    /// Reads from `file` into `uio`, directly if possible, releasing any pinned pages afterward.
    ///
    /// # Errors
    ///
    /// Errors of [`setup_direct()`][Self::setup_direct] and [`read()`][Self::read].
    pub fn pread(&self, file: &FileNode, uio: &mut IoDescriptor, flags: IoFlags) -> Result<usize> {
        let mut flags = flags;
        let direct = self.setup_direct(file, uio, Direction::Read, &mut flags)?;

        let result = self.read(file, uio, flags);

        if direct {
            uio.release_pinned();
        }

        result
    }

    /// Writes `uio` to `file`, directly if possible, releasing any pinned pages afterward.
    ///
    /// # Errors
    ///
    /// Errors of [`setup_direct()`][Self::setup_direct] and [`write()`][Self::write].
    pub fn pwrite(
        &self,
        file: &FileNode,
        uio: &mut IoDescriptor,
        flags: IoFlags,
        credentials: Credentials,
    ) -> Result<usize> {
        let mut flags = flags;
        let direct = self.setup_direct(file, uio, Direction::Write, &mut flags)?;

        let result = self.write(file, uio, flags, credentials);

        if direct {
            uio.release_pinned();
        }

        result
    }
}
