// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Fakes enabled by the `fakes` feature. In-memory implementations of every collaborator of the
//! data path, so that reads and writes can be exercised end to end within one process.
//!
//! For test and example purposes only.

mod memory_intent_log;
mod memory_page_cache;
mod memory_store;
mod simulated_host;
mod static_quota;

pub use memory_intent_log::*;
pub use memory_page_cache::*;
pub use memory_store::*;
pub use simulated_host::*;
pub use static_quota::*;
