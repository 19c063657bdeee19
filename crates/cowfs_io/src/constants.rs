// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Sizes and limits shared by the data path.

/// Size of a host memory page. Direct transfers pin and stabilize memory in units of this size.
pub const PAGE_SIZE: usize = 4096;

/// Smallest block size an object may have. Block sizes grow from here as a file is written.
pub const MIN_BLOCK_SIZE: u64 = 512;

/// Largest record size a dataset may be configured with.
pub const MAX_RECORD_SIZE: u64 = 16 * 1024 * 1024;

/// Default maximum block size (the dataset "record size").
pub const DEFAULT_MAX_BLOCK_SIZE: u64 = 128 * 1024;

/// Default number of bytes moved per chunk of a buffered read.
pub const DEFAULT_READ_CHUNK_SIZE: u64 = 1024 * 1024;

/// Chunk size used by direct reads, whose pages are already pinned up front.
pub const MAX_ACCESS: u64 = 64 * 1024 * 1024;

/// Largest representable file offset.
pub const MAX_OFFSET: u64 = i64::MAX as u64;

/// Project id of files that do not belong to any project. Project quota is not consulted for them.
pub const DEFAULT_PROJECT_ID: u64 = 0;

pub(crate) const PAGE_SIZE_U64: u64 = PAGE_SIZE as u64;
