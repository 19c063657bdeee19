// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The data path of a copy-on-write, transactional filesystem: the component that moves bytes
//! between caller memory and the durable object store.
//!
//! The data path keeps checksums consistent even when the caller's buffer is concurrently
//! mutated, paged out or shared with other mappings, and it accepts memory in several
//! representations (caller iovecs, kernel buffers, block-I/O vectors and generic iterators).
//!
//! The crate consists of the following major components:
//!
//! 1. The [`IoDescriptor`] describes the caller's memory and the file offset of a request, and
//!    moves bytes between that memory and linear buffers whatever the memory's representation.
//! 1. The [`PagePinner`] pins the caller's pages for direct transfers that bypass the store's
//!    cache and stabilizes them, so the store may checksum or compress them in place.
//! 1. The [`Dataset`] drives reads and writes of a [`FileNode`] in bounded chunks, each chunk of
//!    a write committed in its own store transaction, under the file's [`RangeLock`].
//!
//! The hosting environment and the other collaborators of the data path are contracts:
//!
//! * [`Host`] for access to caller memory, page pinning and stable pages.
//! * [`DurableStore`] for the transactional object store.
//! * [`IntentLog`], [`QuotaTracker`] and [`CachedPages`] for synchronous durability, block quota
//!   and memory-mapped page coherency.
//!
//! The `fakes` feature (enabled by default) provides in-memory implementations of every
//! contract, such as [`SimulatedHost`] and [`MemoryStore`], to exercise the data path end to
//! end within one process.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use cowfs_io::{
//!     Credentials, Dataset, FileAttributes, IoDescriptor, IoFlags, MemoryStore, SimulatedHost,
//! };
//!
//! let dataset = Dataset::builder(Arc::new(SimulatedHost::new()), Arc::new(MemoryStore::new()))
//!     .build()?;
//! let file = dataset.create_file(FileAttributes::default())?;
//!
//! let mut uio = IoDescriptor::kernel_space(vec![b"hello".to_vec()], 0);
//! dataset.write(&file, &mut uio, IoFlags::new(), Credentials::default())?;
//!
//! let mut uio = IoDescriptor::kernel_space(vec![vec![0; 5]], 0);
//! dataset.read(&file, &mut uio, IoFlags::new())?;
//! assert_eq!(uio.into_kernel_buffers().unwrap()[0], b"hello");
//! # Ok::<(), cowfs_io::Error>(())
//! ```

pub mod constants;

mod config;
mod credentials;
mod dataset;
mod error;
mod file_node;
mod flags;
mod host;
mod intent_log;
mod io_descriptor;
mod page_cache;
mod page_pinner;
mod quota;
mod range_lock;
mod store;

pub use config::*;
pub use credentials::*;
pub use dataset::*;
pub use error::*;
pub use file_node::*;
pub use flags::*;
pub use host::*;
pub use intent_log::*;
pub use io_descriptor::*;
pub use page_cache::*;
pub use page_pinner::*;
pub use quota::*;
pub use range_lock::*;
pub use store::*;

#[cfg(any(feature = "fakes", test))]
mod fake;
#[cfg(any(feature = "fakes", test))]
pub use fake::*;

#[cfg(test)]
mod tests {
    #[test]
    fn is_64_bit() {
        // File offsets, page addresses and lengths move between u64 and usize freely.
        static_assertions::const_assert!(size_of::<usize>() >= 8);
    }
}
