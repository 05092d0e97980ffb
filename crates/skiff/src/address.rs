// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Addressable event identity

use core::fmt;
use core::str::FromStr;

use crate::event::kind::Kind;
use crate::key::{self, PublicKey};

/// Address error
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Invalid format (expected `kind:pubkey:identifier`)
    InvalidFormat,
    /// Invalid kind number
    InvalidKind,
    /// Public key error
    PublicKey(key::Error),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFormat => write!(f, "invalid address format"),
            Self::InvalidKind => write!(f, "invalid kind"),
            Self::PublicKey(e) => write!(f, "public key: {e}"),
        }
    }
}

impl From<key::Error> for Error {
    fn from(e: key::Error) -> Self {
        Self::PublicKey(e)
    }
}

/// Identity of a replaceable or addressable event: `kind:pubkey:identifier`.
///
/// The identifier is empty for plain replaceable kinds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    /// Kind
    pub kind: Kind,
    /// Author
    pub public_key: PublicKey,
    /// The `d` tag value (empty for replaceable kinds)
    pub identifier: String,
}

impl Address {
    /// Construct a replaceable-event address (empty identifier)
    #[inline]
    pub fn new(kind: Kind, public_key: PublicKey) -> Self {
        Self {
            kind,
            public_key,
            identifier: String::new(),
        }
    }

    /// Set the identifier
    pub fn identifier<S>(mut self, identifier: S) -> Self
    where
        S: Into<String>,
    {
        self.identifier = identifier.into();
        self
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut split = s.splitn(3, ':');

        let kind: u16 = split
            .next()
            .ok_or(Error::InvalidFormat)?
            .parse()
            .map_err(|_| Error::InvalidKind)?;
        let public_key: PublicKey = PublicKey::from_hex(split.next().ok_or(Error::InvalidFormat)?)?;
        let identifier: &str = split.next().ok_or(Error::InvalidFormat)?;

        Ok(Self {
            kind: Kind::new(kind),
            public_key,
            identifier: identifier.to_string(),
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.public_key, self.identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PK: &str = "379e863e8357163b5bce5d2688dc4f1dcc2d505222fb8d74db600f30535dfdfe";

    #[test]
    fn test_roundtrip() {
        let addr = Address::new(Kind::new(30_023), PublicKey::from_hex(PK).unwrap())
            .identifier("my-article");
        let s = addr.to_string();
        assert_eq!(s, format!("30023:{PK}:my-article"));
        assert_eq!(Address::from_str(&s).unwrap(), addr);
    }

    #[test]
    fn test_empty_identifier() {
        let s = format!("10002:{PK}:");
        let addr = Address::from_str(&s).unwrap();
        assert!(addr.identifier.is_empty());
        assert_eq!(addr.to_string(), s);
    }

    #[test]
    fn test_invalid() {
        assert!(Address::from_str("x:y").is_err());
        assert!(Address::from_str("30023:nothex:id").is_err());
    }
}
