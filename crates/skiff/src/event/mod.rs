// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Event

use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

pub mod id;
pub mod kind;
pub mod tag;
pub mod unsigned;

use self::id::EventId;
use self::kind::Kind;
use self::tag::Tags;
use crate::address::Address;
use crate::key::PublicKey;
use crate::types::time::Timestamp;
use crate::util::JsonUtil;

/// Event error
#[derive(Debug)]
pub enum Error {
    /// Error serializing or deserializing JSON data
    Json(serde_json::Error),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(e) => write!(f, "json: {e}"),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// A signed, immutable event.
///
/// The engine treats incoming events as already verified: id and signature
/// checks are the job of an external collaborator, so `sig` is carried as an
/// opaque string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Content hash, the event's identity
    pub id: EventId,
    /// Author
    pub pubkey: PublicKey,
    /// Creation timestamp (seconds)
    pub created_at: Timestamp,
    /// Kind
    pub kind: Kind,
    /// Tags
    pub tags: Tags,
    /// Content
    pub content: String,
    /// Signature (opaque)
    pub sig: String,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Event {}

impl Hash for Event {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    /// Newest first, ties broken by id, so sorted collections iterate in
    /// reverse chronological order.
    fn cmp(&self, other: &Self) -> Ordering {
        if self.created_at != other.created_at {
            other.created_at.cmp(&self.created_at)
        } else {
            self.id.cmp(&other.id)
        }
    }
}

impl Event {
    /// Check if the kind is replaceable
    #[inline]
    pub fn is_replaceable(&self) -> bool {
        self.kind.is_replaceable()
    }

    /// Check if the kind is addressable
    #[inline]
    pub fn is_addressable(&self) -> bool {
        self.kind.is_addressable()
    }

    /// Check if the kind is ephemeral
    #[inline]
    pub fn is_ephemeral(&self) -> bool {
        self.kind.is_ephemeral()
    }

    /// The `d` identifier, if present
    #[inline]
    pub fn identifier(&self) -> Option<&str> {
        self.tags.identifier()
    }

    /// The replaceable/addressable identity of this event, if it has one.
    ///
    /// `None` for regular kinds, and for addressable kinds missing their
    /// `d` identifier.
    pub fn address(&self) -> Option<Address> {
        if self.kind.is_replaceable() {
            Some(Address::new(self.kind, self.pubkey))
        } else if self.kind.is_addressable() {
            let identifier: &str = self.identifier()?;
            Some(Address::new(self.kind, self.pubkey).identifier(identifier))
        } else {
            None
        }
    }
}

impl JsonUtil for Event {
    type Err = Error;
}
