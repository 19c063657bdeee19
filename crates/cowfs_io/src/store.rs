// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The durable object store the data path writes through: transactions, chunk writes and reads,
//! loaned buffers, block-size growth and flushing.

mod durable_store;
mod loaned_buffer;
mod store_error;
mod transaction;

use std::fmt::{self, Display};

pub use durable_store::*;
pub use loaned_buffer::*;
pub use store_error::*;
pub use transaction::*;

/// Identity of an object (a file's data) in the durable store.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ObjectId(pub u64);

impl Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}
