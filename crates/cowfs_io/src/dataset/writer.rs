// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use tracing::{Level, event};

use crate::constants::{DEFAULT_PROJECT_ID, MAX_OFFSET};
use crate::{
    Credentials, Dataset, Error, FileAttributes, FileNode, IdentityKind, IoDescriptor, IoFlags,
    LockMode, LoanedBuffer, LockedRange, Result, SyncPolicy, Transaction, Transfer,
};

impl Dataset {
    /// Writes the remaining bytes of `uio` to `file` at the descriptor's offset (or at the end of
    /// the file for appends).
    ///
    /// The write is cut into chunks that never cross a `max_block_size` boundary, each written and
    /// committed in its own store transaction. Chunks committed before an error remain durable, so
    /// the returned count (or the descriptor's cursor, on error) may reflect partial progress.
    ///
    /// If caller memory faults part way, the bytes that landed are committed, the rest of the
    /// memory is faulted in and the write continues.
    ///
    /// If the descriptor was set up for a direct transfer but the write first has to grow the
    /// file's block size, the first chunk goes through the store's cache and the rest is direct.
    ///
    /// # Errors
    ///
    /// * [`Error::ReadOnly`], [`Error::NotPermitted`] and [`Error::InvalidOffset`] if the write
    ///   may not happen at all.
    /// * [`Error::FileTooLarge`] if the offset is beyond the file size limit.
    /// * [`Error::QuotaExceeded`] if an owner of the file is over quota before any byte was
    ///   written.
    /// * [`Error::MemoryFault`] if caller memory could not be faulted in, even after partial
    ///   progress.
    /// * Store errors, if no byte was written.
    ///
    /// In replay mode, errors are returned even after partial progress.
    pub fn write(
        &self,
        file: &FileNode,
        uio: &mut IoDescriptor,
        flags: IoFlags,
        credentials: Credentials,
    ) -> Result<usize> {
        let start_resid = uio.resid();
        if start_resid == 0 {
            return Ok(0);
        }

        let attributes = file.attributes();
        self.validate_write(file, uio, flags, &attributes)?;

        let max_block_size = self.config.max_block_size();
        uio.prefault(start_resid.min(max_block_size as usize))?;

        let mut range = self.lock_for_write(file, uio, flags);
        let start = uio.offset();

        if start >= self.config.file_size_limit() || start >= MAX_OFFSET {
            return Err(Error::FileTooLarge);
        }

        let mut n = (start_resid as u64).min(MAX_OFFSET - start);
        let end_size = file.size().max(start + n);

        let mut deferred_direct = false;
        if uio.is_direct() && range.is_whole_object() {
            event!(
                Level::DEBUG,
                message = "deferring direct transfer until the block size is grown",
                object = %file.object(),
                offset = start
            );
            uio.suspend_direct();
            deferred_direct = true;
        }

        let mut setid_group = None;
        let mut error = None;

        while n > 0 {
            let offset = uio.offset();

            if let Some((kind, id)) = self.over_quota(&attributes) {
                event!(
                    Level::WARN,
                    message = "block quota exceeded, stopping write",
                    object = %file.object(),
                    %kind,
                    id,
                    offset
                );
                error = Some(Error::QuotaExceeded { kind, id });
                break;
            }

            let loaned = match self.prefill(file, uio, n, offset) {
                Ok(loaned) => loaned,
                Err(e) => {
                    error = Some(e);
                    break;
                }
            };

            let txn = match self
                .store
                .open_transaction(file.object(), offset, n.min(max_block_size))
            {
                Ok(txn) => txn,
                Err(e) => {
                    error = Some(e.into());
                    break;
                }
            };

            if range.is_whole_object() {
                if let Err(e) = self.grow_block_size(file, &txn, end_size) {
                    self.clear_setid(file, &txn, credentials, &mut setid_group);
                    self.abandon(file, txn);
                    error = Some(e);
                    break;
                }

                range.reduce(offset, n);
            }

            let nbytes = n.min(max_block_size - offset % max_block_size);
            let before = uio.resid();

            let result = match loaned {
                Some(buffer) => self.assign_prefilled(file, &txn, uio, offset, buffer),
                None => {
                    uio.set_nofault(true);
                    let result = self.write_chunk(file, &txn, uio, offset, nbytes as usize);
                    uio.set_nofault(false);
                    result
                }
            };

            let tx_bytes = (before - uio.resid()) as u64;

            match result {
                Ok(()) => {}
                Err(Error::MemoryFault) => {
                    // Keep what landed and retry the rest once it is faulted in.
                    self.clear_setid(file, &txn, credentials, &mut setid_group);
                    if tx_bytes > 0 {
                        file.advance_size(uio.offset());
                        self.log_write(&txn, file, offset, tx_bytes, flags);
                    }

                    if let Err(e) = self.commit(txn) {
                        error = Some(e);
                        break;
                    }

                    n -= tx_bytes;
                    event!(
                        Level::DEBUG,
                        message = "caller memory faulted, retrying after prefault",
                        object = %file.object(),
                        offset,
                        written = tx_bytes,
                        remaining = n
                    );

                    if let Err(e) = uio.prefault(n.min(max_block_size) as usize) {
                        error = Some(e);
                        break;
                    }

                    continue;
                }
                Err(e) => {
                    self.clear_setid(file, &txn, credentials, &mut setid_group);
                    self.abandon(file, txn);
                    error = Some(e);
                    break;
                }
            }

            if tx_bytes == 0 {
                self.abandon(file, txn);
                break;
            }

            if !flags.direct {
                if let Err(e) = self.update_cached_pages(file, offset, tx_bytes) {
                    error = Some(e);
                }
            }

            self.clear_setid(file, &txn, credentials, &mut setid_group);

            file.advance_size(uio.offset());
            if self.config.replay() && self.replay_eof() != 0 {
                file.force_size(self.replay_eof());
            }

            self.log_write(&txn, file, offset, tx_bytes, flags);

            event!(
                Level::TRACE,
                message = "write chunk committed",
                object = %file.object(),
                offset,
                len = tx_bytes,
                direct = uio.is_direct(),
                group = txn.group()
            );

            if let Err(e) = self.commit(txn) {
                error = Some(e);
            }

            if deferred_direct {
                uio.resume_direct();
                deferred_direct = false;
            }

            if error.is_some() {
                break;
            }

            n -= tx_bytes;

            if n > 0 {
                if let Err(e) = uio.prefault(n.min(max_block_size) as usize) {
                    error = Some(e);
                    break;
                }
            }
        }

        if deferred_direct {
            uio.resume_direct();
        }

        drop(range);

        let written = start_resid - uio.resid();

        if self.config.replay() || written == 0 || matches!(error, Some(Error::MemoryFault)) {
            return match error {
                Some(e) => Err(e),
                None => Ok(written),
            };
        }

        if let Some(e) = error {
            event!(
                Level::DEBUG,
                message = "write stopped early",
                object = %file.object(),
                written,
                error = %e
            );
        }

        let sync = self.config.sync();
        if sync != SyncPolicy::Disabled && (flags.wants_sync() || sync == SyncPolicy::Always) {
            self.flush_file(file)?;
        }

        self.stats.record_write(written);
        Ok(written)
    }

    fn validate_write(
        &self,
        file: &FileNode,
        uio: &IoDescriptor,
        flags: IoFlags,
        attributes: &FileAttributes,
    ) -> Result<()> {
        if self.config.read_only() {
            return Err(Error::ReadOnly);
        }

        if attributes.flags.immutable {
            return Err(Error::NotPermitted("file is immutable"));
        }

        if attributes.flags.append_only && !flags.append && uio.offset() < file.size() {
            return Err(Error::NotPermitted("file is append-only"));
        }

        if !flags.append && uio.offset() > MAX_OFFSET {
            return Err(Error::InvalidOffset(uio.offset()));
        }

        Ok(())
    }

    /// Takes the range lock for a write. An append resolves its offset once the lock is granted
    /// and repositions the descriptor there.
    fn lock_for_write<'a>(
        &self,
        file: &'a FileNode,
        uio: &mut IoDescriptor,
        flags: IoFlags,
    ) -> LockedRange<'a> {
        let max_block_size = self.config.max_block_size();
        let len = uio.resid() as u64;

        if flags.append {
            let range = file
                .range_lock()
                .enter_with(0, len, LockMode::Append, |request| {
                    file.resolve_write_lock(request, max_block_size);
                });

            // A whole-object lock keeps the size from changing, so the end of file is current.
            let offset = if range.is_whole_object() {
                file.size()
            } else {
                range.offset()
            };
            uio.set_offset(offset);

            range
        } else {
            file.range_lock()
                .enter_with(uio.offset(), len, LockMode::Writer, |request| {
                    file.resolve_write_lock(request, max_block_size);
                })
        }
    }

    fn over_quota(&self, attributes: &FileAttributes) -> Option<(IdentityKind, u64)> {
        if self.quota.over_block_quota(IdentityKind::User, attributes.uid) {
            return Some((IdentityKind::User, attributes.uid));
        }

        if self.quota.over_block_quota(IdentityKind::Group, attributes.gid) {
            return Some((IdentityKind::Group, attributes.gid));
        }

        if attributes.project != DEFAULT_PROJECT_ID
            && self
                .quota
                .over_block_quota(IdentityKind::Project, attributes.project)
        {
            return Some((IdentityKind::Project, attributes.project));
        }

        None
    }

    /// Fills a loaned buffer from the descriptor before a transaction is opened, if the chunk
    /// covers a whole maximum-size block at or beyond the end of file.
    fn prefill(
        &self,
        file: &FileNode,
        uio: &mut IoDescriptor,
        n: u64,
        offset: u64,
    ) -> Result<Option<LoanedBuffer>> {
        let max_block_size = self.config.max_block_size();

        if n < max_block_size
            || offset < file.size()
            || offset % max_block_size != 0
            || file.block_size() != max_block_size
            || uio.is_direct()
        {
            return Ok(None);
        }

        let mut buffer = self
            .store
            .borrow_buffer(file.object(), max_block_size as usize);

        let copied =
            uio.copy_without_consuming(Transfer::FromDescriptor(buffer.as_mut_slice()))?;
        if copied != buffer.len() {
            // Short copies go through the regular chunk path.
            return Ok(None);
        }

        Ok(Some(buffer))
    }

    fn assign_prefilled(
        &self,
        file: &FileNode,
        txn: &Transaction,
        uio: &mut IoDescriptor,
        offset: u64,
        buffer: LoanedBuffer,
    ) -> Result<()> {
        let len = buffer.len();
        self.store
            .assign_buffer(txn, file.object(), offset, buffer)?;
        uio.skip(len);
        Ok(())
    }

    /// Moves `len` bytes of the descriptor into the store under `txn`, directly from the pinned
    /// pages or through a linear buffer. After a memory fault, the bytes copied before the fault
    /// are still written and the cursor reflects them.
    fn write_chunk(
        &self,
        file: &FileNode,
        txn: &Transaction,
        uio: &mut IoDescriptor,
        offset: u64,
        len: usize,
    ) -> Result<()> {
        if uio.is_direct() {
            let span = uio
                .pinned_span(len)
                .ok_or(Error::Unsupported("pinned pages do not cover the chunk"))?;
            let moved = span.len();
            self.store.write_direct(txn, file.object(), offset, span)?;
            uio.advance_direct(moved);
            return Ok(());
        }

        let mut buf = vec![0; len];
        let before = uio.resid();
        let result = uio.move_into(&mut buf);
        let moved = before - uio.resid();

        if moved > 0 {
            self.store.write(txn, file.object(), offset, &buf[..moved])?;
        }

        result.map(|_| ())
    }

    /// Grows the block size of a file whose range lock was widened to the whole object.
    fn grow_block_size(&self, file: &FileNode, txn: &Transaction, end_size: u64) -> Result<()> {
        let max_block_size = self.config.max_block_size();
        let current = file.block_size();

        let wanted = if current > max_block_size {
            // Already beyond the record size: only round up to the next power of two.
            end_size.min(current.next_power_of_two())
        } else {
            end_size.min(max_block_size)
        };

        let effective = self.store.grow_block_size(txn, file.object(), wanted)?;
        file.set_block_size(effective);

        event!(
            Level::DEBUG,
            message = "grew file block size",
            object = %file.object(),
            from = current,
            requested = wanted,
            to = effective
        );

        Ok(())
    }

    fn update_cached_pages(&self, file: &FileNode, offset: u64, len: u64) -> Result<()> {
        if !self
            .cache
            .has_cached_data(file.object(), offset, offset + len)
        {
            return Ok(());
        }

        let mut data = vec![0; len as usize];
        self.store.read(file.object(), offset, &mut data)?;
        self.cache.update_pages(file.object(), offset, &data);
        Ok(())
    }

    /// Clears the set-id bits of the file if necessary, logging the change at most once per
    /// transaction group of this call.
    fn clear_setid(
        &self,
        file: &FileNode,
        txn: &Transaction,
        credentials: Credentials,
        logged_group: &mut Option<u64>,
    ) {
        let Some(mode) = file.clear_setid_bits(credentials.privileged) else {
            return;
        };

        if *logged_group == Some(txn.group()) {
            return;
        }

        if let Some(log) = &self.log {
            log.log_setattr_mode(txn, file.object(), mode);
        }
        *logged_group = Some(txn.group());

        event!(
            Level::INFO,
            message = "cleared set-id bits after unprivileged write",
            object = %file.object(),
            mode = format_args!("{mode:o}"),
            group = txn.group()
        );
    }

    fn log_write(&self, txn: &Transaction, file: &FileNode, offset: u64, len: u64, flags: IoFlags) {
        if let Some(log) = &self.log {
            log.log_write(txn, file.object(), offset, len, flags.wants_sync());
        }
    }

    fn commit(&self, txn: Transaction) -> Result<()> {
        self.store.commit(txn)?;
        Ok(())
    }

    /// Commits a transaction whose chunk failed. A failure to commit is logged and otherwise
    /// dropped in favor of the error that ended the chunk.
    fn abandon(&self, file: &FileNode, txn: Transaction) {
        let id = txn.id();
        if let Err(e) = self.store.commit(txn) {
            event!(
                Level::WARN,
                message = "failed to commit transaction of a failed chunk",
                object = %file.object(),
                txn = id,
                error = %e
            );
        }
    }
}
