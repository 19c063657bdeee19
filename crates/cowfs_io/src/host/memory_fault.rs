// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

/// The host could not access caller memory.
///
/// Copies that fault part of the way through report how many bytes were copied before the fault
/// so that callers can account for the partial progress.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[error("memory fault after {copied} bytes")]
pub struct MemoryFault {
    /// Number of bytes successfully copied before the fault.
    pub copied: usize,
}

impl MemoryFault {
    /// A fault that happened before any byte was copied.
    #[must_use]
    pub const fn immediate() -> Self {
        Self { copied: 0 }
    }
}
