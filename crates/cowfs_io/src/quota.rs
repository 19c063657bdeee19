// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug, Display};

/// The kind of identity a block quota is tracked for.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum IdentityKind {
    /// The owning user.
    User,

    /// The owning group.
    Group,

    /// The project the file belongs to.
    Project,
}

impl Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Group => f.write_str("group"),
            Self::Project => f.write_str("project"),
        }
    }
}

/// Block quota accounting, consulted before every chunk of a write.
pub trait QuotaTracker: Debug + Send + Sync {
    /// Whether `id` has used up its block quota.
    fn over_block_quota(&self, kind: IdentityKind, id: u64) -> bool;
}

/// A quota tracker under which nobody is ever over quota.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoQuota;

impl QuotaTracker for NoQuota {
    #[cfg_attr(test, mutants::skip)]
    fn over_block_quota(&self, _kind: IdentityKind, _id: u64) -> bool {
        false
    }
}
