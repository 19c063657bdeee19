// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// An open transaction in the durable store, obtained from
/// [`DurableStore::open_transaction()`][crate::DurableStore::open_transaction] and consumed by
/// [`DurableStore::commit()`][crate::DurableStore::commit].
///
/// Every change made under the transaction becomes durable together with the rest of its
/// transaction group.
#[derive(Debug, Eq, PartialEq)]
pub struct Transaction {
    id: u64,
    group: u64,
}

impl Transaction {
    /// Creates a transaction handle. Only store implementations create transactions.
    #[must_use]
    pub const fn new(id: u64, group: u64) -> Self {
        Self { id, group }
    }

    /// Identity of the transaction, unique within the store.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// The transaction group the transaction was assigned to.
    #[must_use]
    pub const fn group(&self) -> u64 {
        self.group
    }
}
