// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

use crate::{IdentityKind, MemoryFault, StoreError};

/// Any error that may arise from the data path, either raised by the data path itself or
/// forwarded from one of the collaborators it drives (host memory, durable store).
///
/// Each variant maps onto the POSIX error code that the filesystem-call layer returns to the
/// caller, see [`Error::errno()`].
///
/// Errors returned by read and write operations do not imply that zero bytes were moved. The
/// cursor of the [`IoDescriptor`][crate::IoDescriptor] always reflects the bytes that were
/// actually transferred before the error.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A direct transfer was explicitly requested but the memory, offset or length of the
    /// request is not page and block aligned.
    #[error("direct transfer requires page-aligned memory, offset and length")]
    Misaligned,

    /// An identity that owns the file is over its block quota. Chunks committed before the quota
    /// was found to be exceeded remain durable.
    #[error("block quota exceeded for {kind} {id}")]
    QuotaExceeded {
        /// The kind of identity that is over quota.
        kind: IdentityKind,
        /// The identity that is over quota.
        id: u64,
    },

    /// The operation would move the file beyond the largest representable or permitted size.
    #[error("file too large")]
    FileTooLarge,

    /// The file offset of the request is not valid.
    #[error("invalid file offset {0}")]
    InvalidOffset(u64),

    /// The file flags do not permit the operation (immutable file or append-only violation).
    #[error("operation not permitted: {0}")]
    NotPermitted(&'static str),

    /// The dataset is read-only.
    #[error("dataset is read-only")]
    ReadOnly,

    /// The file may not be accessed (e.g. it is quarantined).
    #[error("access denied")]
    AccessDenied,

    /// The target of a read is a directory.
    #[error("is a directory")]
    IsDirectory,

    /// The host could not access or pin the caller's memory.
    ///
    /// This is the only recoverable kind: the write path commits what it managed to move,
    /// pre-faults the remainder and keeps going.
    #[error("bad address in caller memory")]
    MemoryFault,

    /// The request uses a descriptor or memory layout that the data path cannot represent.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// The durable store could not return consistent data (e.g. a checksum failed).
    #[error("I/O error")]
    Io,

    /// There is no data (or hole) at or beyond the requested offset.
    #[error("no data or hole at or beyond offset {0}")]
    NoSuchOffset(u64),

    /// A dataset was configured with invalid settings.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// We are forwarding an error reported by the durable store.
    #[error(transparent)]
    Store(StoreError),
}

impl Error {
    /// The POSIX error code that represents this error at the filesystem-call boundary.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::Misaligned | Self::InvalidOffset(_) | Self::InvalidConfig(_) => libc::EINVAL,
            Self::QuotaExceeded { .. } => libc::EDQUOT,
            Self::FileTooLarge => libc::EFBIG,
            Self::NotPermitted(_) => libc::EPERM,
            Self::ReadOnly => libc::EROFS,
            Self::AccessDenied => libc::EACCES,
            Self::IsDirectory => libc::EISDIR,
            Self::MemoryFault => libc::EFAULT,
            Self::Unsupported(_) => libc::EOPNOTSUPP,
            Self::Io => libc::EIO,
            Self::NoSuchOffset(_) => libc::ENXIO,
            Self::Store(e) => e.errno(),
        }
    }

    /// Whether this is the recoverable memory fault that triggers retry on the write path.
    #[must_use]
    pub const fn is_memory_fault(&self) -> bool {
        matches!(self, Self::MemoryFault)
    }
}

/// A specialized `Result` for data path operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<MemoryFault> for Error {
    fn from(_: MemoryFault) -> Self {
        Self::MemoryFault
    }
}

impl From<StoreError> for Error {
    fn from(value: StoreError) -> Self {
        match value {
            // Checksum failures are never surfaced to callers as such.
            StoreError::ChecksumMismatch { .. } => Self::Io,
            other => Self::Store(other),
        }
    }
}

/// Represents the data path error as a standard I/O error carrying the matching OS error code.
impl From<Error> for std::io::Error {
    fn from(value: Error) -> Self {
        Self::from_raw_os_error(value.errno())
    }
}
