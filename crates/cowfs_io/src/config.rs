// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::constants::{
    DEFAULT_MAX_BLOCK_SIZE, DEFAULT_READ_CHUNK_SIZE, MAX_OFFSET, MAX_RECORD_SIZE, MIN_BLOCK_SIZE,
};
use crate::{Error, Result};

/// Whether a dataset transfers data directly between caller memory and the store.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DirectPolicy {
    /// Direct transfer requests are served through the store's cache.
    Disabled,

    /// Transfers are direct when the caller asks for it.
    #[default]
    Standard,

    /// Every suitably aligned transfer is direct. Misaligned transfers are quietly served through
    /// the store's cache.
    Always,
}

/// When a dataset makes writes durable before returning.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SyncPolicy {
    /// Synchronous requests are treated as asynchronous.
    Disabled,

    /// Writes are synchronous when the caller or the file asks for it.
    #[default]
    Standard,

    /// Every write is synchronous and reads flush pending writes first.
    Always,
}

/// Tunable settings of a dataset.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DatasetConfig {
    max_block_size: u64,
    read_chunk_size: u64,
    direct: DirectPolicy,
    sync: SyncPolicy,
    read_only: bool,
    file_size_limit: u64,
    replay: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            direct: DirectPolicy::default(),
            sync: SyncPolicy::default(),
            read_only: false,
            file_size_limit: MAX_OFFSET,
            replay: false,
        }
    }
}

impl DatasetConfig {
    /// Sets the largest block size files may grow to (the record size). Must be a power of two
    /// between [`MIN_BLOCK_SIZE`] and [`MAX_RECORD_SIZE`].
    #[must_use]
    pub const fn with_max_block_size(mut self, size: u64) -> Self {
        self.max_block_size = size;
        self
    }

    /// Sets how many bytes a buffered read moves per chunk.
    #[must_use]
    pub const fn with_read_chunk_size(mut self, size: u64) -> Self {
        self.read_chunk_size = size;
        self
    }

    /// Sets the direct transfer policy.
    #[must_use]
    pub const fn with_direct(mut self, policy: DirectPolicy) -> Self {
        self.direct = policy;
        self
    }

    /// Sets the synchronous durability policy.
    #[must_use]
    pub const fn with_sync(mut self, policy: SyncPolicy) -> Self {
        self.sync = policy;
        self
    }

    /// Makes the dataset read-only.
    #[must_use]
    pub const fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Sets the largest file size a writer may produce (the per-process file size limit).
    #[must_use]
    pub const fn with_file_size_limit(mut self, limit: u64) -> Self {
        self.file_size_limit = limit;
        self
    }

    /// Puts the dataset in intent-log replay mode.
    #[must_use]
    pub const fn with_replay(mut self, replay: bool) -> Self {
        self.replay = replay;
        self
    }

    /// The largest block size files may grow to.
    #[must_use]
    pub const fn max_block_size(&self) -> u64 {
        self.max_block_size
    }

    /// Bytes a buffered read moves per chunk.
    #[must_use]
    pub const fn read_chunk_size(&self) -> u64 {
        self.read_chunk_size
    }

    /// The direct transfer policy.
    #[must_use]
    pub const fn direct(&self) -> DirectPolicy {
        self.direct
    }

    /// The synchronous durability policy.
    #[must_use]
    pub const fn sync(&self) -> SyncPolicy {
        self.sync
    }

    /// Whether the dataset is read-only.
    #[must_use]
    pub const fn read_only(&self) -> bool {
        self.read_only
    }

    /// The largest file size a writer may produce.
    #[must_use]
    pub const fn file_size_limit(&self) -> u64 {
        self.file_size_limit
    }

    /// Whether the dataset is replaying its intent log.
    #[must_use]
    pub const fn replay(&self) -> bool {
        self.replay
    }

    /// Checks that the settings are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first bad setting.
    pub fn validate(&self) -> Result<()> {
        if !self.max_block_size.is_power_of_two()
            || !(MIN_BLOCK_SIZE..=MAX_RECORD_SIZE).contains(&self.max_block_size)
        {
            return Err(Error::InvalidConfig(format!(
                "max block size {} is not a power of two in [{MIN_BLOCK_SIZE}, {MAX_RECORD_SIZE}]",
                self.max_block_size
            )));
        }

        if self.read_chunk_size == 0 {
            return Err(Error::InvalidConfig("read chunk size must not be zero".to_string()));
        }

        if self.file_size_limit == 0 {
            return Err(Error::InvalidConfig("file size limit must not be zero".to_string()));
        }

        Ok(())
    }
}
