// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The transactional read and write paths of a dataset.

mod builder;
mod direct;
mod reader;
mod stats;
mod sync;
mod writer;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub use builder::*;
pub use stats::*;
pub use sync::SeekKind;

use crate::constants::MIN_BLOCK_SIZE;
use crate::{
    CachedPages, DatasetConfig, DurableStore, FileAttributes, FileNode, Host, IntentLog,
    PagePinner, QuotaTracker, Result,
};

/// A dataset: the files of one filesystem and the collaborators their data flows through.
///
/// The dataset exposes the data path to the filesystem-call layer:
///
/// * [`read()`][Self::read] and [`write()`][Self::write] move the bytes of an [`IoDescriptor`]
///   from or to a file in bounded chunks, each chunk of a write in its own store transaction.
/// * [`setup_direct()`][Self::setup_direct] decides whether a call bypasses the store's cache
///   and, if so, pins (and for writes, stabilizes) the descriptor's pages.
/// * [`pread()`][Self::pread] and [`pwrite()`][Self::pwrite] combine the two.
///
/// # Thread safety
///
/// This type is thread-safe. Any number of reads and writes may run concurrently on the same
/// file; overlapping ranges are serialized by the file's [`RangeLock`][crate::RangeLock].
///
/// [`IoDescriptor`]: crate::IoDescriptor
#[derive(Debug)]
pub struct Dataset {
    host: Arc<dyn Host>,
    store: Arc<dyn DurableStore>,
    log: Option<Arc<dyn IntentLog>>,
    quota: Arc<dyn QuotaTracker>,
    cache: Arc<dyn CachedPages>,
    pinner: PagePinner,
    config: DatasetConfig,
    stats: IoStats,
    replay_eof: AtomicU64,
}

impl Dataset {
    /// Starts building a dataset over a host and a durable store.
    #[must_use]
    pub fn builder(host: Arc<dyn Host>, store: Arc<dyn DurableStore>) -> DatasetBuilder {
        DatasetBuilder::new(host, store)
    }

    /// The settings the dataset was built with.
    #[must_use]
    pub const fn config(&self) -> &DatasetConfig {
        &self.config
    }

    /// Byte and call counters of the dataset.
    #[must_use]
    pub const fn stats(&self) -> &IoStats {
        &self.stats
    }

    /// The host the dataset's descriptors live in.
    #[must_use]
    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    /// Creates an empty file.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot create the file's object.
    pub fn create_file(&self, attributes: FileAttributes) -> Result<Arc<FileNode>> {
        let object = self.store.create_object(MIN_BLOCK_SIZE)?;
        Ok(Arc::new(FileNode::new(object, MIN_BLOCK_SIZE, attributes)))
    }

    /// Sets the end of file that replayed writes force on their file. Zero leaves sizes alone.
    pub fn set_replay_eof(&self, eof: u64) {
        self.replay_eof.store(eof, Ordering::Release);
    }

    fn replay_eof(&self) -> u64 {
        self.replay_eof.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    #[test]
    fn thread_safe_type() {
        assert_impl_all!(Dataset: Send, Sync);
    }
}
