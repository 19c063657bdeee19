// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Display};

/// Direction of a data transfer, as seen from the file.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Direction {
    /// Data flows from the file into the descriptor's memory. The data path writes into the
    /// caller's pages, so pinning requires write intent.
    Read,

    /// Data flows from the descriptor's memory into the file. Pinned pages must be stabilized
    /// before the store may checksum or compress them.
    Write,
}

impl Direction {
    /// Whether the data path writes into the descriptor's memory.
    #[must_use]
    pub const fn writes_memory(self) -> bool {
        matches!(self, Self::Read)
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}
