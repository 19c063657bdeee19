// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;

use crate::{ObjectId, Transaction};

/// The intent log that records changes for synchronous durability and replay.
///
/// Records are made under the transaction that carries the change.
pub trait IntentLog: Debug + Send + Sync {
    /// Records a write of `len` bytes at `offset` in `object`. `sync` is set when the caller waits
    /// for the write to be durable.
    fn log_write(&self, txn: &Transaction, object: ObjectId, offset: u64, len: u64, sync: bool);

    /// Records a change of the file mode bits of `object`.
    fn log_setattr_mode(&self, txn: &Transaction, object: ObjectId, mode: u32);
}
