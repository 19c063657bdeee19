// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Per-call flags of a read or write.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct IoFlags {
    /// Write at the end of the file, whatever the descriptor's offset.
    pub append: bool,

    /// Make the data and all metadata durable before returning.
    pub sync: bool,

    /// Make the data durable before returning.
    pub dsync: bool,

    /// The caller asks for a direct transfer that bypasses the store's cache.
    pub direct: bool,

    /// Flush pending writes of the file before reading.
    pub read_sync: bool,
}

impl IoFlags {
    /// Flags of a plain buffered call.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            append: false,
            sync: false,
            dsync: false,
            direct: false,
            read_sync: false,
        }
    }

    /// Sets [`append`][Self::append].
    #[must_use]
    pub const fn with_append(mut self) -> Self {
        self.append = true;
        self
    }

    /// Sets [`sync`][Self::sync].
    #[must_use]
    pub const fn with_sync(mut self) -> Self {
        self.sync = true;
        self
    }

    /// Sets [`dsync`][Self::dsync].
    #[must_use]
    pub const fn with_dsync(mut self) -> Self {
        self.dsync = true;
        self
    }

    /// Sets [`direct`][Self::direct].
    #[must_use]
    pub const fn with_direct(mut self) -> Self {
        self.direct = true;
        self
    }

    /// Sets [`read_sync`][Self::read_sync].
    #[must_use]
    pub const fn with_read_sync(mut self) -> Self {
        self.read_sync = true;
        self
    }

    /// Whether the caller waits for the written data to be durable.
    #[must_use]
    pub const fn wants_sync(&self) -> bool {
        self.sync || self.dsync
    }
}

/// Persistent attribute flags of a file.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FileFlags {
    /// The file may not be modified.
    pub immutable: bool,

    /// The file may only be written at its end.
    pub append_only: bool,

    /// The file was flagged by a scanner and may not be read.
    pub quarantined: bool,

    /// The file is a directory.
    pub directory: bool,
}
