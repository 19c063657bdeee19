// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ObjectId;

/// A block-sized buffer lent by the durable store.
///
/// The writer fills it before opening a transaction and then hands it back to the store with
/// [`DurableStore::assign_buffer()`][crate::DurableStore::assign_buffer], so that a slow copy
/// from caller memory never happens while a transaction is open.
#[derive(Debug)]
pub struct LoanedBuffer {
    object: ObjectId,
    data: Vec<u8>,
}

impl LoanedBuffer {
    /// Creates a zero-filled buffer of `size` bytes lent for `object`.
    #[must_use]
    pub fn new(object: ObjectId, size: usize) -> Self {
        Self {
            object,
            data: vec![0; size],
        }
    }

    /// The object the buffer was lent for.
    #[must_use]
    pub const fn object(&self) -> ObjectId {
        self.object
    }

    /// Length of the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The buffer contents.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// The buffer contents, for filling.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consumes the buffer, returning its contents.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}
