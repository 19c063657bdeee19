// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// The identity performing a call.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Credentials {
    /// User id of the caller.
    pub uid: u32,

    /// Group id of the caller.
    pub gid: u32,

    /// Whether the caller may keep set-id bits on files it writes.
    pub privileged: bool,
}

impl Credentials {
    /// Credentials of an unprivileged caller.
    #[must_use]
    pub const fn user(uid: u32, gid: u32) -> Self {
        Self {
            uid,
            gid,
            privileged: false,
        }
    }

    /// Credentials of a privileged caller.
    #[must_use]
    pub const fn privileged() -> Self {
        Self {
            uid: 0,
            gid: 0,
            privileged: true,
        }
    }
}
