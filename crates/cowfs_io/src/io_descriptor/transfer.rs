// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::ops::Range;

use crate::Direction;

/// A linear buffer taking part in a byte move, tagged with the direction of the move.
///
/// The length of the buffer is the maximum number of bytes the move transfers; a move stops
/// early when the descriptor runs out of bytes.
#[derive(Debug)]
pub enum Transfer<'b> {
    /// The bytes are copied into the descriptor's memory ([`Direction::Read`]).
    ToDescriptor(&'b [u8]),

    /// The descriptor's memory is copied into the buffer ([`Direction::Write`]).
    FromDescriptor(&'b mut [u8]),
}

impl Transfer<'_> {
    /// Number of bytes in the linear buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::ToDescriptor(src) => src.len(),
            Self::FromDescriptor(dst) => dst.len(),
        }
    }

    /// Whether the linear buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The direction of the move, as seen from the file.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        match self {
            Self::ToDescriptor(_) => Direction::Read,
            Self::FromDescriptor(_) => Direction::Write,
        }
    }

    /// Reborrows part of the linear buffer.
    pub(crate) fn slice(&mut self, range: Range<usize>) -> Transfer<'_> {
        match self {
            Self::ToDescriptor(src) => Transfer::ToDescriptor(&src[range]),
            Self::FromDescriptor(dst) => Transfer::FromDescriptor(&mut dst[range]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_keeps_direction() {
        let mut data = [1_u8, 2, 3, 4];
        let mut transfer = Transfer::FromDescriptor(&mut data);

        let sub = transfer.slice(1..3);
        assert_eq!(sub.len(), 2);
        assert_eq!(sub.direction(), Direction::Write);

        let source = [9_u8; 8];
        let mut transfer = Transfer::ToDescriptor(&source);
        assert_eq!(transfer.slice(0..0).len(), 0);
        assert_eq!(transfer.direction(), Direction::Read);
    }
}
