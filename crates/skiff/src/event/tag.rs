// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Tags

use core::fmt;
use core::ops::Deref;
use core::str::FromStr;
use std::collections::{BTreeMap, BTreeSet};

use serde::de::Error as DeserializerError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::address::Address;
use crate::event::id::EventId;
use crate::filter::SingleLetterTag;
use crate::key::PublicKey;
use crate::types::url::RelayUrl;

/// Tag error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Tag has no elements
    Empty,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty tag"),
        }
    }
}

/// A single tag: a non-empty ordered list of strings.
///
/// The first element is the tag name, the second (if any) its primary value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Tag(Vec<String>);

impl Tag {
    /// Construct from a list of elements.
    pub fn parse<I, S>(elements: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let buf: Vec<String> = elements.into_iter().map(|e| e.into()).collect();

        if buf.is_empty() {
            return Err(Error::Empty);
        }

        Ok(Self(buf))
    }

    /// An `e` tag referencing an event, with optional relay hint.
    pub fn event(id: EventId, relay: Option<&RelayUrl>) -> Self {
        let mut buf: Vec<String> = vec![String::from("e"), id.to_hex()];
        if let Some(relay) = relay {
            buf.push(relay.to_string());
        }
        Self(buf)
    }

    /// A `p` tag referencing a public key.
    pub fn public_key(public_key: PublicKey) -> Self {
        Self(vec![String::from("p"), public_key.to_hex()])
    }

    /// An `a` tag referencing a replaceable/addressable identity.
    pub fn address(address: &Address) -> Self {
        Self(vec![String::from("a"), address.to_string()])
    }

    /// A `d` identifier tag.
    pub fn identifier<S>(identifier: S) -> Self
    where
        S: Into<String>,
    {
        Self(vec![String::from("d"), identifier.into()])
    }

    /// A `relay` tag (used by auth events).
    pub fn relay(url: &RelayUrl) -> Self {
        Self(vec![String::from("relay"), url.to_string()])
    }

    /// A `challenge` tag (used by auth events).
    pub fn challenge<S>(challenge: S) -> Self
    where
        S: Into<String>,
    {
        Self(vec![String::from("challenge"), challenge.into()])
    }

    /// Tag name (the first element)
    #[inline]
    pub fn name(&self) -> &str {
        // SAFETY: construction guarantees at least one element
        &self.0[0]
    }

    /// Primary value (the second element, if any)
    #[inline]
    pub fn content(&self) -> Option<&str> {
        self.0.get(1).map(|s| s.as_str())
    }

    /// All elements
    #[inline]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Single-letter tag name, if the name is exactly one letter
    pub fn single_letter_tag(&self) -> Option<SingleLetterTag> {
        SingleLetterTag::from_str(self.name()).ok()
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let buf: Vec<String> = Vec::deserialize(deserializer)?;
        Self::parse(buf).map_err(DeserializerError::custom)
    }
}

/// Ordered list of [`Tag`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(Vec<Tag>);

impl Tags {
    /// Construct from a list of tags
    #[inline]
    pub fn new(tags: Vec<Tag>) -> Self {
        Self(tags)
    }

    /// The `d` identifier, if present
    pub fn identifier(&self) -> Option<&str> {
        self.0
            .iter()
            .find(|tag| tag.name() == "d")
            .and_then(|tag| tag.content())
    }

    /// Event ids referenced by `e` tags
    pub fn event_ids(&self) -> impl Iterator<Item = EventId> + '_ {
        self.0
            .iter()
            .filter(|tag| tag.name() == "e")
            .filter_map(|tag| tag.content())
            .filter_map(|value| EventId::from_hex(value).ok())
    }

    /// Public keys referenced by `p` tags
    pub fn public_keys(&self) -> impl Iterator<Item = PublicKey> + '_ {
        self.0
            .iter()
            .filter(|tag| tag.name() == "p")
            .filter_map(|tag| tag.content())
            .filter_map(|value| PublicKey::from_hex(value).ok())
    }

    /// Addresses referenced by `a` tags
    pub fn addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.0
            .iter()
            .filter(|tag| tag.name() == "a")
            .filter_map(|tag| tag.content())
            .filter_map(|value| Address::from_str(value).ok())
    }

    /// Relay hints: the third element of `e`/`a`/`p` tags plus the value of
    /// `r` and `relay` tags.
    pub fn relay_hints(&self) -> impl Iterator<Item = RelayUrl> + '_ {
        self.0.iter().filter_map(|tag| {
            let candidate: Option<&String> = match tag.name() {
                "e" | "a" | "p" => tag.as_slice().get(2),
                "r" | "relay" => tag.as_slice().get(1),
                _ => None,
            };
            candidate.and_then(|url| RelayUrl::parse(url).ok())
        })
    }

    /// Index of single-letter tag values, used for filter matching.
    pub fn indexes(&self) -> BTreeMap<SingleLetterTag, BTreeSet<String>> {
        let mut indexes: BTreeMap<SingleLetterTag, BTreeSet<String>> = BTreeMap::new();
        for tag in self.0.iter() {
            if let (Some(letter), Some(content)) = (tag.single_letter_tag(), tag.content()) {
                indexes.entry(letter).or_default().insert(content.to_string());
            }
        }
        indexes
    }
}

impl Deref for Tags {
    type Target = [Tag];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromIterator<Tag> for Tags {
    fn from_iter<T: IntoIterator<Item = Tag>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Tags {
    type Item = Tag;
    type IntoIter = std::vec::IntoIter<Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PK: &str = "379e863e8357163b5bce5d2688dc4f1dcc2d505222fb8d74db600f30535dfdfe";
    const ID: &str = "70b10f70c1318967eddf12527799411b1a9780ad9c43858f5e5fcd45486a13a5";

    #[test]
    fn test_empty_tag_rejected() {
        let json = "[[]]";
        assert!(serde_json::from_str::<Tags>(json).is_err());
    }

    #[test]
    fn test_accessors() {
        let tags = Tags::new(vec![
            Tag::identifier("thing"),
            Tag::event(EventId::from_hex(ID).unwrap(), None),
            Tag::public_key(PublicKey::from_hex(PK).unwrap()),
        ]);

        assert_eq!(tags.identifier(), Some("thing"));
        assert_eq!(tags.event_ids().count(), 1);
        assert_eq!(tags.public_keys().count(), 1);
    }

    #[test]
    fn test_relay_hints() {
        let url = RelayUrl::parse("wss://relay.example.com").unwrap();
        let tags = Tags::new(vec![
            Tag::event(EventId::all_zeros(), Some(&url)),
            Tag::parse(["r", "wss://other.example.com"]).unwrap(),
            Tag::parse(["r", "not a url"]).unwrap(),
        ]);

        let hints: Vec<RelayUrl> = tags.relay_hints().collect();
        assert_eq!(hints.len(), 2);
        assert!(hints.contains(&url));
    }

    #[test]
    fn test_serde_shape() {
        let tags = Tags::new(vec![Tag::identifier("x")]);
        assert_eq!(serde_json::to_string(&tags).unwrap(), r#"[["d","x"]]"#);
    }
}
