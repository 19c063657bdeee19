// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The contract that the hosting environment's memory manager must satisfy for the data path:
//! copying to and from caller memory, pinning caller pages and keeping pinned pages stable.

mod host_memory;
mod memory_fault;
mod page;

pub use host_memory::*;
pub use memory_fault::*;
pub use page::*;

#[cfg(test)]
mod mocks;
#[cfg(test)]
pub(crate) use mocks::*;
