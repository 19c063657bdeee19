// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashSet;

use parking_lot::Mutex;

use crate::{IdentityKind, QuotaTracker};

/// A quota tracker whose over-quota identities are set explicitly.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug, Default)]
pub struct StaticQuota {
    over: Mutex<HashSet<(IdentityKind, u64)>>,
}

impl StaticQuota {
    /// Creates a tracker with every identity within quota.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the identity is over its block quota.
    pub fn set_over(&self, kind: IdentityKind, id: u64, over: bool) {
        let mut set = self.over.lock();
        if over {
            set.insert((kind, id));
        } else {
            set.remove(&(kind, id));
        }
    }
}

impl QuotaTracker for StaticQuota {
    fn over_block_quota(&self, kind: IdentityKind, id: u64) -> bool {
        self.over.lock().contains(&(kind, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_are_distinct_per_kind() {
        let quota = StaticQuota::new();
        quota.set_over(IdentityKind::User, 5, true);

        assert!(quota.over_block_quota(IdentityKind::User, 5));
        assert!(!quota.over_block_quota(IdentityKind::Group, 5));

        quota.set_over(IdentityKind::User, 5, false);
        assert!(!quota.over_block_quota(IdentityKind::User, 5));
    }
}
