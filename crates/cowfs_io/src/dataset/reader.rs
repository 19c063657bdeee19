// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use tracing::{Level, event};

use crate::constants::{MAX_ACCESS, MAX_OFFSET, PAGE_SIZE_U64};
use crate::{Dataset, Error, FileNode, IoDescriptor, IoFlags, LockMode, Result, SyncPolicy};

impl Dataset {
    /// Reads from `file` at the descriptor's offset into the descriptor's memory, up to the end
    /// of the file.
    ///
    /// Ranges that are memory-mapped are served from the cached pages so that the reader sees
    /// stores made through the mapping. If the descriptor has pinned pages attached, the bulk of
    /// the read goes straight into them and only the part past the last whole page of the file
    /// is copied through the cache.
    ///
    /// A memory fault after at least one byte was moved ends the read early but is not an error.
    ///
    /// # Errors
    ///
    /// * [`Error::AccessDenied`] if the file is quarantined.
    /// * [`Error::IsDirectory`] if the file is a directory.
    /// * [`Error::InvalidOffset`] if the offset is beyond the largest file offset.
    /// * [`Error::Io`] if the store found the data corrupt.
    /// * [`Error::MemoryFault`] if no byte could be moved into caller memory.
    pub fn read(&self, file: &FileNode, uio: &mut IoDescriptor, flags: IoFlags) -> Result<usize> {
        let attributes = file.attributes();

        if attributes.flags.quarantined {
            return Err(Error::AccessDenied);
        }

        if attributes.flags.directory {
            return Err(Error::IsDirectory);
        }

        if uio.offset() > MAX_OFFSET {
            return Err(Error::InvalidOffset(uio.offset()));
        }

        let start_resid = uio.resid();
        if start_resid == 0 {
            return Ok(0);
        }

        if flags.read_sync || self.config.sync() == SyncPolicy::Always {
            self.flush_file(file)?;
        }

        let range = file
            .range_lock()
            .enter(uio.offset(), start_resid as u64, LockMode::Reader);

        let size = file.size();
        if uio.offset() >= size {
            return Ok(0);
        }

        let chunk_size = if uio.is_direct() {
            MAX_ACCESS
        } else {
            self.config.read_chunk_size()
        };

        let mut n = (start_resid as u64).min(size - uio.offset());

        // Pinned pages can only take whole pages, the rest goes through the cache.
        let mut tail = 0;
        if uio.is_direct() {
            tail = n % PAGE_SIZE_U64;
            n -= tail;
        }

        let mut error = None;

        while n > 0 {
            let offset = uio.offset();
            let nbytes = n.min(chunk_size - offset % chunk_size);

            let mapped = !uio.is_direct()
                && self
                    .cache
                    .has_cached_data(file.object(), offset, offset + nbytes);

            let result = if mapped {
                self.read_mapped(file, uio, nbytes as usize)
            } else {
                self.read_chunk(file, uio, nbytes as usize)
            };

            if let Err(e) = result {
                error = Some(e);
                break;
            }

            event!(
                Level::TRACE,
                message = "read chunk",
                object = %file.object(),
                offset,
                len = nbytes,
                mapped,
                direct = uio.is_direct()
            );

            n -= nbytes;
        }

        if matches!(error, Some(Error::MemoryFault)) && uio.resid() < start_resid {
            // Progress was made, report a short read.
            error = None;
        }

        if error.is_none() && tail > 0 {
            uio.suspend_direct();
            if let Err(e) = self.read_chunk(file, uio, tail as usize) {
                error = Some(e);
            }
            uio.resume_direct();
        }

        drop(range);

        let moved = start_resid - uio.resid();
        self.stats.record_read(moved);

        match error {
            Some(Error::MemoryFault) if moved > 0 => Ok(moved),
            Some(e) => {
                event!(
                    Level::DEBUG,
                    message = "read failed",
                    object = %file.object(),
                    moved,
                    error = %e
                );
                Err(e)
            }
            None => Ok(moved),
        }
    }

    /// Reads `len` bytes from the store, directly into pinned pages if the descriptor has them.
    fn read_chunk(&self, file: &FileNode, uio: &mut IoDescriptor, len: usize) -> Result<()> {
        if uio.is_direct() {
            let span = uio
                .pinned_span(len)
                .ok_or(Error::Unsupported("pinned pages do not cover the chunk"))?;
            let moved = span.len();
            self.store.read_direct(file.object(), uio.offset(), span)?;
            uio.advance_direct(moved);
            return Ok(());
        }

        let mut buf = vec![0; len];
        self.store.read(file.object(), uio.offset(), &mut buf)?;
        uio.move_from(&buf)?;
        Ok(())
    }

    /// Reads `len` bytes a page at a time, preferring the cached pages of a mapped range.
    fn read_mapped(&self, file: &FileNode, uio: &mut IoDescriptor, len: usize) -> Result<()> {
        let mut left = len as u64;
        let mut buf = Vec::new();

        while left > 0 {
            let offset = uio.offset();
            let piece = left.min(PAGE_SIZE_U64 - offset % PAGE_SIZE_U64);

            buf.clear();
            buf.resize(piece as usize, 0);

            if !self.cache.read_cached(file.object(), offset, &mut buf) {
                self.store.read(file.object(), offset, &mut buf)?;
            }

            uio.move_from(&buf)?;
            left -= piece;
        }

        Ok(())
    }
}
