// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Public keys

use core::fmt;
use core::str::FromStr;

use serde::de::Error as DeserializerError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Public key error
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
            Self::InvalidLength => write!(f, "invalid public key length"),
        }
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Self::Hex(e)
    }
}

/// Author public key (32 bytes).
///
/// Treated as an opaque identifier: key derivation and signature checks
/// belong to external collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Length, in bytes
    pub const LEN: usize = 32;

    /// Construct from 32 bytes
    #[inline]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
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

impl FromStr for PublicKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
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
        let hex_str = "379e863e8357163b5bce5d2688dc4f1dcc2d505222fb8d74db600f30535dfdfe";
        let pk = PublicKey::from_hex(hex_str).unwrap();
        assert_eq!(pk.to_hex(), hex_str);
    }

    #[test]
    fn test_invalid_length() {
        assert_eq!(
            PublicKey::from_hex("deadbeef").unwrap_err(),
            Error::InvalidLength
        );
    }
}
