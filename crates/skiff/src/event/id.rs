// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Event id

use core::fmt;
use core::str::FromStr;

use serde::de::Error as DeserializerError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Event id error
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Hex decoding error
    Hex(hex::FromHexError),
    /// Invalid length
    InvalidLength,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hex(e) => write!(f, "hex: {e}"),
            Self::InvalidLength => write!(f, "invalid event id length"),
        }
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Self::Hex(e)
    }
}

/// Event id (32-byte content hash).
///
/// The hash is computed by whoever signs the event; this crate treats it as
/// the event's opaque identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId([u8; 32]);

impl EventId {
    /// Construct from 32 bytes
    #[inline]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// All-zeros id, useful in tests
    #[inline]
    pub const fn all_zeros() -> Self {
        Self([0u8; 32])
    }

    /// Parse from a 64-char hex string
    pub fn from_hex(hex_str: &str) -> Result<Self, Error> {
        let bytes: Vec<u8> = hex::decode(hex_str)?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| Error::InvalidLength)?;
        Ok(Self(bytes))
    }

    /// Get as byte slice
    #[inline]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encode as lowercase hex
    #[inline]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for EventId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for EventId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hex_str: String = String::deserialize(deserializer)?;
        Self::from_hex(&hex_str).map_err(DeserializerError::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip() {
        let hex_str = "70b10f70c1318967eddf12527799411b1a9780ad9c43858f5e5fcd45486a13a5";
        let id = EventId::from_hex(hex_str).unwrap();
        assert_eq!(id.to_hex(), hex_str);
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let a = EventId::from_bytes([0x01; 32]);
        let b = EventId::from_bytes([0x02; 32]);
        assert!(a < b);
    }
}
