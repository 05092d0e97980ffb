// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Event kind

use core::fmt;
use core::ops::Range;

use serde::{Deserialize, Serialize};

const REPLACEABLE_RANGE: Range<u16> = 10_000..20_000;
const EPHEMERAL_RANGE: Range<u16> = 20_000..30_000;
const ADDRESSABLE_RANGE: Range<u16> = 30_000..40_000;

/// Event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kind(u16);

impl Kind {
    /// Profile metadata
    pub const METADATA: Self = Self(0);
    /// Short text note
    pub const TEXT_NOTE: Self = Self(1);
    /// Contact list
    pub const CONTACTS: Self = Self(3);
    /// Event deletion request
    pub const DELETION: Self = Self(5);
    /// Relay list (read/write markers)
    pub const RELAY_LIST: Self = Self(10_002);
    /// Inbox relay list for direct-message delivery
    pub const INBOX_RELAYS: Self = Self(10_050);
    /// Client authentication
    pub const CLIENT_AUTH: Self = Self(22_242);

    /// Construct from raw kind number
    #[inline]
    pub const fn new(kind: u16) -> Self {
        Self(kind)
    }

    /// Get as [`u16`]
    #[inline]
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Per-pubkey singleton kinds: only the newest event per `(pubkey, kind)`
    /// is retained.
    #[inline]
    pub fn is_replaceable(&self) -> bool {
        matches!(*self, Self::METADATA | Self::CONTACTS) || REPLACEABLE_RANGE.contains(&self.0)
    }

    /// Kinds that are relayed but never stored.
    #[inline]
    pub fn is_ephemeral(&self) -> bool {
        EPHEMERAL_RANGE.contains(&self.0)
    }

    /// Per-pubkey+identifier singleton kinds: only the newest event per
    /// `(pubkey, kind, "d" tag)` is retained.
    #[inline]
    pub fn is_addressable(&self) -> bool {
        ADDRESSABLE_RANGE.contains(&self.0)
    }

    /// Everything that is not replaceable, ephemeral or addressable.
    #[inline]
    pub fn is_regular(&self) -> bool {
        !self.is_replaceable() && !self.is_ephemeral() && !self.is_addressable()
    }
}

impl From<u16> for Kind {
    fn from(kind: u16) -> Self {
        Self(kind)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges() {
        assert!(Kind::METADATA.is_replaceable());
        assert!(Kind::CONTACTS.is_replaceable());
        assert!(Kind::RELAY_LIST.is_replaceable());
        assert!(Kind::new(19_999).is_replaceable());
        assert!(Kind::new(22_242).is_ephemeral());
        assert!(Kind::new(30_023).is_addressable());
        assert!(Kind::TEXT_NOTE.is_regular());
        assert!(Kind::DELETION.is_regular());
    }
}
