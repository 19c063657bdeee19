// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use tracing::{Level, event};

use crate::{Dataset, Error, FileNode, LockMode, Result, StoreError, SyncPolicy};

/// What [`Dataset::seek()`] looks for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SeekKind {
    /// The next offset that holds data.
    Data,

    /// The next offset inside a hole. The end of file counts as a hole.
    Hole,
}

impl Dataset {
    /// Makes every write to `file` that has returned durable.
    ///
    /// Does nothing if the dataset's sync policy is [`SyncPolicy::Disabled`].
    ///
    /// # Errors
    ///
    /// Returns an error if the store could not make the writes durable.
    pub fn fsync(&self, file: &FileNode) -> Result<()> {
        if self.config.sync() == SyncPolicy::Disabled {
            return Ok(());
        }

        self.flush_file(file)
    }

    pub(crate) fn flush_file(&self, file: &FileNode) -> Result<()> {
        file.begin_sync();
        let result = self.store.flush(file.object());
        file.end_sync();

        event!(
            Level::TRACE,
            message = "flushed file",
            object = %file.object(),
            ok = result.is_ok()
        );

        Ok(result?)
    }

    /// Finds the next offset at or beyond `offset` that holds data or lies in a hole.
    ///
    /// # Errors
    ///
    /// * [`Error::NoSuchOffset`] if `offset` is at or beyond the end of file, or there is no data
    ///   beyond it.
    /// * Other store errors.
    pub fn seek(&self, file: &FileNode, kind: SeekKind, offset: u64) -> Result<u64> {
        let hole = kind == SeekKind::Hole;
        let size = file.size();

        if offset >= size {
            return Err(Error::NoSuchOffset(offset));
        }

        // Pending stores through a mapping must reach the store before it can answer.
        if self.cache.has_cached_data(file.object(), 0, size) {
            self.cache.flush_cached(file.object());
        }

        let range = file.range_lock().enter(0, u64::MAX, LockMode::Reader);
        let result = self.store.offset_next(file.object(), hole, offset);
        drop(range);

        let next = match result {
            Ok(next) => next,
            Err(StoreError::NotFound { .. }) => return Err(Error::NoSuchOffset(offset)),
            Err(StoreError::Busy(_)) => {
                // The store cannot tell yet, so everything up to the end of file is data.
                event!(
                    Level::DEBUG,
                    message = "store busy, treating range as data",
                    object = %file.object(),
                    offset
                );
                return Ok(if hole { size } else { offset });
            }
            Err(e) => return Err(e.into()),
        };

        Ok(next.min(size).max(offset))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::fake::{MemoryStore, SimulatedHost};
    use crate::{Credentials, DatasetConfig, FileAttributes, IoDescriptor, IoFlags};

    fn setup(config: DatasetConfig) -> (Dataset, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let dataset = Dataset::builder(
            Arc::new(SimulatedHost::new()),
            Arc::clone(&store) as Arc<dyn crate::DurableStore>,
        )
        .with_config(config)
        .build()
        .unwrap();
        (dataset, store)
    }

    fn write(dataset: &Dataset, file: &FileNode, data: &[u8], offset: u64) {
        let mut uio = IoDescriptor::kernel_space(vec![data.to_vec()], offset);
        dataset
            .write(file, &mut uio, IoFlags::new(), Credentials::default())
            .unwrap();
    }

    #[test]
    fn fsync_flushes_unless_disabled() {
        let (dataset, store) = setup(DatasetConfig::default());
        let file = dataset.create_file(FileAttributes::default()).unwrap();

        dataset.fsync(&file).unwrap();
        assert_eq!(store.flushes(), 1);
        assert_eq!(file.sync_writers(), 0);

        let (dataset, store) = setup(DatasetConfig::default().with_sync(SyncPolicy::Disabled));
        let file = dataset.create_file(FileAttributes::default()).unwrap();

        dataset.fsync(&file).unwrap();
        assert_eq!(store.flushes(), 0);
    }

    #[test]
    fn seek_data_and_holes() {
        let (dataset, _) = setup(DatasetConfig::default().with_max_block_size(4096));
        let file = dataset.create_file(FileAttributes::default()).unwrap();

        write(&dataset, &file, &[1; 4096], 0);
        write(&dataset, &file, &[1; 4096], 3 * 4096);
        dataset.fsync(&file).unwrap();

        assert_eq!(dataset.seek(&file, SeekKind::Data, 0).unwrap(), 0);
        assert_eq!(dataset.seek(&file, SeekKind::Hole, 0).unwrap(), 4096);
        assert_eq!(
            dataset.seek(&file, SeekKind::Data, 4096).unwrap(),
            3 * 4096
        );
        assert_eq!(
            dataset.seek(&file, SeekKind::Hole, 3 * 4096).unwrap(),
            4 * 4096
        );

        assert!(matches!(
            dataset.seek(&file, SeekKind::Data, 4 * 4096),
            Err(Error::NoSuchOffset(_))
        ));
    }

    #[test]
    fn seek_on_busy_object_treats_everything_as_data() {
        let (dataset, store) = setup(DatasetConfig::default());
        let file = dataset.create_file(FileAttributes::default()).unwrap();
        write(&dataset, &file, &[1; 100], 0);

        store.set_busy(file.object(), true);

        assert_eq!(dataset.seek(&file, SeekKind::Data, 10).unwrap(), 10);
        assert_eq!(dataset.seek(&file, SeekKind::Hole, 10).unwrap(), 100);
    }
}
