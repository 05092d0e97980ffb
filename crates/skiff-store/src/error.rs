// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

use thiserror::Error;

/// Repository error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Addressable events are identified by their `d` tag; without one the
    /// event can't be indexed at all.
    #[error("addressable event without identifier tag")]
    MissingIdentifier,
}
