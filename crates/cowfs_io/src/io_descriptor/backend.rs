// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;

use crate::io_descriptor::{
    BlockVectorMemory, Cursor, IteratorMemory, KernelSpaceMemory, UserSpaceMemory,
};
use crate::{Result, Transfer, UserSegment};

/// The move/skip/copy protocol every descriptor backend implements.
pub(crate) trait ByteMover: Debug + Send {
    /// Moves up to `buf.len()` bytes, advancing the cursor by the bytes actually moved (also when
    /// returning a memory fault).
    fn move_bytes(
        &mut self,
        cursor: &mut Cursor,
        buf: Transfer<'_>,
        nofault: bool,
    ) -> Result<usize>;

    /// Advances the cursor by `n` bytes. The caller has checked `n <= cursor.resid`.
    fn skip(&mut self, cursor: &mut Cursor, n: usize);

    /// Undoes any internal position state for the last `n` bytes moved. Backends whose position
    /// lives entirely in the cursor have nothing to undo.
    fn revert(&mut self, _n: usize) {}

    fn page_aligned(&self, cursor: &Cursor) -> bool;

    /// Brings the next `n` bytes of memory in so that copying them does not fault.
    fn prefault(&self, cursor: &Cursor, n: usize) -> Result<()>;

    /// The remaining caller memory as user-space ranges, or `None` if the memory is not caller
    /// memory and therefore cannot be pinned.
    fn user_segments(&self, cursor: &Cursor) -> Option<Vec<UserSegment>>;
}

/// The kind of memory behind an [`IoDescriptor`][crate::IoDescriptor].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BackendKind {
    /// A scatter list over caller memory.
    UserSpace,

    /// A scatter list over buffers owned by the data path's host.
    KernelSpace,

    /// A list of (page, offset, length) block-I/O vectors.
    BlockVector,

    /// A generic positional iterator, see [`IoIterator`][crate::IoIterator].
    GenericIterator,
}

/// Backend of an I/O descriptor, selected once when the descriptor is constructed.
#[derive(Debug)]
pub(crate) enum Backend {
    UserSpace(UserSpaceMemory),
    KernelSpace(KernelSpaceMemory),
    BlockVector(BlockVectorMemory),
    GenericIterator(IteratorMemory),
}

impl Backend {
    pub(crate) const fn kind(&self) -> BackendKind {
        match self {
            Self::UserSpace(_) => BackendKind::UserSpace,
            Self::KernelSpace(_) => BackendKind::KernelSpace,
            Self::BlockVector(_) => BackendKind::BlockVector,
            Self::GenericIterator(_) => BackendKind::GenericIterator,
        }
    }

    pub(crate) fn mover(&mut self) -> &mut dyn ByteMover {
        match self {
            Self::UserSpace(memory) => memory,
            Self::KernelSpace(memory) => memory,
            Self::BlockVector(memory) => memory,
            Self::GenericIterator(memory) => memory,
        }
    }

    pub(crate) fn mover_ref(&self) -> &dyn ByteMover {
        match self {
            Self::UserSpace(memory) => memory,
            Self::KernelSpace(memory) => memory,
            Self::BlockVector(memory) => memory,
            Self::GenericIterator(memory) => memory,
        }
    }
}
