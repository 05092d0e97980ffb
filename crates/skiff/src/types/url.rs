// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Relay url

use core::fmt;
use core::str::FromStr;

use serde::de::Error as DeserializerError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Relay url error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Scheme is not `ws` or `wss`
    UnsupportedScheme,
    /// Missing or empty host
    InvalidHost,
    /// Invalid port
    InvalidPort,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedScheme => write!(f, "unsupported scheme: expected ws:// or wss://"),
            Self::InvalidHost => write!(f, "invalid host"),
            Self::InvalidPort => write!(f, "invalid port"),
        }
    }
}

/// Validated and normalized websocket relay url.
///
/// The scheme and host are lowercased and a trailing slash on the root path
/// is dropped, so `WSS://Relay.Example.com/` and `wss://relay.example.com`
/// compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelayUrl(String);

impl RelayUrl {
    /// Parse and normalize a relay url
    pub fn parse(url: &str) -> Result<Self, Error> {
        let url: &str = url.trim();

        let (scheme, rest) = url.split_once("://").ok_or(Error::UnsupportedScheme)?;
        let scheme: String = scheme.to_ascii_lowercase();

        if scheme != "ws" && scheme != "wss" {
            return Err(Error::UnsupportedScheme);
        }

        let (authority, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };

        if authority.is_empty() {
            return Err(Error::InvalidHost);
        }

        // Validate the port, if any
        let host: String = match authority.rsplit_once(':') {
            Some((host, port)) => {
                if port.parse::<u16>().is_err() {
                    return Err(Error::InvalidPort);
                }

                if host.is_empty() {
                    return Err(Error::InvalidHost);
                }

                format!("{}:{port}", host.to_ascii_lowercase())
            }
            None => authority.to_ascii_lowercase(),
        };

        // Drop the trailing slash of a root path
        let path: &str = if path == "/" { "" } else { path };

        Ok(Self(format!("{scheme}://{host}{path}")))
    }

    /// Get url as `&str`
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if the url uses TLS (`wss://`)
    #[inline]
    pub fn is_secure(&self) -> bool {
        self.0.starts_with("wss://")
    }
}

impl FromStr for RelayUrl {
    type Err = Error;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        Self::parse(url)
    }
}

impl fmt::Display for RelayUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for RelayUrl {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RelayUrl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let url: String = String::deserialize(deserializer)?;
        Self::parse(&url).map_err(DeserializerError::custom)
    }
}
