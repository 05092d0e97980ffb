// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

use thiserror::Error;

/// Engine error.
///
/// Only caller-input problems surface here, before any I/O is attempted.
/// Per-relay transport, protocol and authentication failures are reported
/// through the operation's own status surface and never abort the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Can't subscribe without filters
    #[error("filters empty")]
    EmptyFilters,
    /// Neither the caller nor the router produced any target relay
    #[error("no relays available for this operation")]
    NoRelays,
    /// Structural event error from the repository
    #[error(transparent)]
    Store(#[from] skiff_store::Error),
}
