// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Wire messages

use core::fmt;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub mod client;
pub mod relay;

pub use self::client::ClientMessage;
pub use self::relay::RelayMessage;

const SUBSCRIPTION_ID_LEN: usize = 32;

/// Message error
#[derive(Debug)]
pub enum MessageError {
    /// The frame is not a valid message of the protocol
    InvalidMessageFormat,
    /// Json error
    Json(serde_json::Error),
}

impl std::error::Error for MessageError {}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidMessageFormat => write!(f, "invalid message format"),
            Self::Json(e) => write!(f, "json: {e}"),
        }
    }
}

impl From<serde_json::Error> for MessageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// Subscription id, locally generated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Construct from a string
    pub fn new<S>(id: S) -> Self
    where
        S: Into<String>,
    {
        Self(id.into())
    }

    /// Generate a new random id
    pub fn generate() -> Self {
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SUBSCRIPTION_ID_LEN)
            .map(char::from)
            .collect();
        Self(id)
    }

    /// Get as `&str`
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Machine-readable prefix of `OK` and `CLOSED` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineReadablePrefix {
    /// `auth-required:`
    AuthRequired,
    /// `blocked:`
    Blocked,
    /// `duplicate:`
    Duplicate,
    /// `error:`
    Error,
    /// `invalid:`
    Invalid,
    /// `pow:`
    Pow,
    /// `rate-limited:`
    RateLimited,
    /// `restricted:`
    Restricted,
}

impl MachineReadablePrefix {
    /// Parse the prefix of a message, if it has one.
    pub fn parse(message: &str) -> Option<Self> {
        match message.split_once(':') {
            Some(("auth-required", ..)) => Some(Self::AuthRequired),
            Some(("blocked", ..)) => Some(Self::Blocked),
            Some(("duplicate", ..)) => Some(Self::Duplicate),
            Some(("error", ..)) => Some(Self::Error),
            Some(("invalid", ..)) => Some(Self::Invalid),
            Some(("pow", ..)) => Some(Self::Pow),
            Some(("rate-limited", ..)) => Some(Self::RateLimited),
            Some(("restricted", ..)) => Some(Self::Restricted),
            _ => None,
        }
    }
}
