// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

use crate::ObjectId;

/// An error reported by the durable store.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum StoreError {
    /// Data read back does not match the checksum recorded when it was written.
    #[error("checksum mismatch in {object} at offset {offset}")]
    ChecksumMismatch {
        /// The object holding the bad block.
        object: ObjectId,
        /// Offset of the bad block.
        offset: u64,
    },

    /// There is no data (or hole) at or beyond the offset.
    #[error("nothing found in {object} at or beyond offset {offset}")]
    NotFound {
        /// The object that was searched.
        object: ObjectId,
        /// Offset the search started at.
        offset: u64,
    },

    /// The object has changes that are not yet flushed, so its layout cannot be inspected.
    #[error("{0} has unflushed changes")]
    Busy(ObjectId),

    /// The object does not exist.
    #[error("{0} does not exist")]
    NoSuchObject(ObjectId),

    /// The store has no space left for the transaction.
    #[error("no space left in store")]
    NoSpace,

    /// The store failed to perform the operation.
    #[error("store failure: {0}")]
    Failed(String),
}

impl StoreError {
    /// The POSIX error code that represents this error.
    #[must_use]
    pub const fn errno(&self) -> i32 {
        match self {
            Self::ChecksumMismatch { .. } | Self::Failed(_) => libc::EIO,
            Self::NotFound { .. } => libc::ENXIO,
            Self::Busy(_) => libc::EBUSY,
            Self::NoSuchObject(_) => libc::ENOENT,
            Self::NoSpace => libc::ENOSPC,
        }
    }
}

/// A specialized `Result` for durable store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping() {
        assert_eq!(StoreError::Busy(ObjectId(1)).errno(), libc::EBUSY);
        assert_eq!(
            StoreError::NotFound {
                object: ObjectId(1),
                offset: 0
            }
            .errno(),
            libc::ENXIO
        );
        assert_eq!(
            StoreError::Failed("disk gone".to_string()).errno(),
            libc::EIO
        );
    }
}
