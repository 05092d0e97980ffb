// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Filters

use core::fmt;
use core::hash::Hash;
use core::str::FromStr;
use std::collections::{BTreeMap, BTreeSet};

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::event::id::EventId;
use crate::event::kind::Kind;
use crate::event::Event;
use crate::key::PublicKey;
use crate::types::time::Timestamp;
use crate::util::JsonUtil;

type GenericTags = BTreeMap<SingleLetterTag, BTreeSet<String>>;

/// Single-letter tag error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SingleLetterTagError {
    /// Not a single ascii letter
    InvalidChar,
}

impl std::error::Error for SingleLetterTagError {}

impl fmt::Display for SingleLetterTagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidChar => write!(f, "expected a single ascii letter"),
        }
    }
}

/// Single-letter tag name (`a`-`z`, `A`-`Z`), the only tag names that can be
/// queried through filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SingleLetterTag(char);

impl SingleLetterTag {
    /// The `d` identifier tag
    pub const D: Self = Self('d');
    /// The `e` event-reference tag
    pub const E: Self = Self('e');
    /// The `p` pubkey-reference tag
    pub const P: Self = Self('p');
    /// The `a` address-reference tag
    pub const A: Self = Self('a');
    /// The `t` hashtag tag
    pub const T: Self = Self('t');

    /// Parse from [`char`]
    pub fn from_char(c: char) -> Result<Self, SingleLetterTagError> {
        if c.is_ascii_alphabetic() {
            Ok(Self(c))
        } else {
            Err(SingleLetterTagError::InvalidChar)
        }
    }

    /// Get as [`char`]
    #[inline]
    pub fn as_char(&self) -> char {
        self.0
    }
}

impl FromStr for SingleLetterTag {
    type Err = SingleLetterTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_char(c),
            _ => Err(SingleLetterTagError::InvalidChar),
        }
    }
}

impl fmt::Display for SingleLetterTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for SingleLetterTag {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_char(self.0)
    }
}

impl<'de> Deserialize<'de> for SingleLetterTag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let c: char = char::deserialize(deserializer)?;
        Self::from_char(c).map_err(serde::de::Error::custom)
    }
}

/// Subscription filter: a conjunction of optional constraints.
///
/// An event matches iff every present constraint matches. A request is a
/// disjunction of filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Event ids
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub ids: Option<BTreeSet<EventId>>,
    /// Authors
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub authors: Option<BTreeSet<PublicKey>>,
    /// Kinds
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub kinds: Option<BTreeSet<Kind>>,
    /// Full-text search query
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub search: Option<String>,
    /// Inclusive lower bound on `created_at`
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub since: Option<Timestamp>,
    /// Inclusive upper bound on `created_at`
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub until: Option<Timestamp>,
    /// Maximum number of events returned by the initial query
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub limit: Option<usize>,
    /// Generic `#x` tag queries
    #[serde(
        flatten,
        serialize_with = "serialize_generic_tags",
        deserialize_with = "deserialize_generic_tags"
    )]
    #[serde(default)]
    pub generic_tags: GenericTags,
}

impl Filter {
    /// Create a new empty [`Filter`]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event id
    #[inline]
    pub fn id(self, id: EventId) -> Self {
        self.ids([id])
    }

    /// Add event ids
    pub fn ids<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = EventId>,
    {
        self.ids = extend_or_collect(self.ids, ids);
        self
    }

    /// Add an author
    #[inline]
    pub fn author(self, author: PublicKey) -> Self {
        self.authors([author])
    }

    /// Add authors
    pub fn authors<I>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = PublicKey>,
    {
        self.authors = extend_or_collect(self.authors, authors);
        self
    }

    /// Add a kind
    #[inline]
    pub fn kind(self, kind: Kind) -> Self {
        self.kinds([kind])
    }

    /// Add kinds
    pub fn kinds<I>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = Kind>,
    {
        self.kinds = extend_or_collect(self.kinds, kinds);
        self
    }

    /// Add a `#e` reference
    #[inline]
    pub fn event(self, id: EventId) -> Self {
        self.custom_tag(SingleLetterTag::E, id.to_hex())
    }

    /// Add a `#p` reference
    #[inline]
    pub fn pubkey(self, public_key: PublicKey) -> Self {
        self.custom_tag(SingleLetterTag::P, public_key.to_hex())
    }

    /// Add a `#d` identifier
    #[inline]
    pub fn identifier<S>(self, identifier: S) -> Self
    where
        S: Into<String>,
    {
        self.custom_tag(SingleLetterTag::D, identifier)
    }

    /// Add a `#t` hashtag
    #[inline]
    pub fn hashtag<S>(self, hashtag: S) -> Self
    where
        S: Into<String>,
    {
        self.custom_tag(SingleLetterTag::T, hashtag)
    }

    /// Add a custom `#x` tag value
    pub fn custom_tag<S>(self, tag: SingleLetterTag, value: S) -> Self
    where
        S: Into<String>,
    {
        self.custom_tags(tag, [value])
    }

    /// Add custom `#x` tag values
    pub fn custom_tags<I, S>(mut self, tag: SingleLetterTag, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.generic_tags
            .entry(tag)
            .or_default()
            .extend(values.into_iter().map(|v| v.into()));
        self
    }

    /// Add a full-text search query
    pub fn search<S>(mut self, value: S) -> Self
    where
        S: Into<String>,
    {
        self.search = Some(value.into());
        self
    }

    /// Set the inclusive lower bound on `created_at`
    #[inline]
    pub fn since(mut self, since: Timestamp) -> Self {
        self.since = Some(since);
        self
    }

    /// Set the inclusive upper bound on `created_at`
    #[inline]
    pub fn until(mut self, until: Timestamp) -> Self {
        self.until = Some(until);
        self
    }

    /// Set the maximum number of results
    #[inline]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check if the filter is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self == &Filter::default()
    }

    /// Static bound on how many events can ever match this filter, if one
    /// exists.
    ///
    /// An `ids` filter can't match more events than it names: once that many
    /// are known locally there is nothing left to ask a relay for.
    pub fn result_cardinality(&self) -> Option<usize> {
        let ids = self.ids.as_ref()?;
        if ids.is_empty() {
            return None;
        }
        Some(ids.len())
    }

    #[inline]
    fn ids_match(&self, event: &Event) -> bool {
        self.ids
            .as_ref()
            .map_or(true, |ids| ids.is_empty() || ids.contains(&event.id))
    }

    #[inline]
    fn authors_match(&self, event: &Event) -> bool {
        self.authors.as_ref().map_or(true, |authors| {
            authors.is_empty() || authors.contains(&event.pubkey)
        })
    }

    #[inline]
    fn kind_match(&self, event: &Event) -> bool {
        self.kinds.as_ref().map_or(true, |kinds| {
            kinds.is_empty() || kinds.contains(&event.kind)
        })
    }

    fn tag_match(&self, event: &Event) -> bool {
        if self.generic_tags.is_empty() {
            return true;
        }

        if event.tags.is_empty() {
            return false;
        }

        let indexes = event.tags.indexes();

        self.generic_tags.iter().all(|(tag_name, set)| {
            if let Some(values) = indexes.get(tag_name) {
                set.iter().any(|t| values.contains(t))
            } else {
                false
            }
        })
    }

    #[inline]
    fn search_match(&self, event: &Event) -> bool {
        match &self.search {
            Some(query) => event
                .content
                .as_bytes()
                .windows(query.len())
                .any(|window| window.eq_ignore_ascii_case(query.as_bytes())),
            None => true,
        }
    }

    /// Determine if the filter matches the given [`Event`].
    pub fn match_event(&self, event: &Event) -> bool {
        self.ids_match(event)
            && self.authors_match(event)
            && self.kind_match(event)
            && self.since.map_or(true, |t| event.created_at >= t)
            && self.until.map_or(true, |t| event.created_at <= t)
            && self.tag_match(event)
            && self.search_match(event)
    }
}

impl JsonUtil for Filter {
    type Err = serde_json::Error;
}

fn serialize_generic_tags<S>(generic_tags: &GenericTags, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(generic_tags.len()))?;
    for (tag, values) in generic_tags.iter() {
        map.serialize_entry(&format!("#{tag}"), values)?;
    }
    map.end()
}

fn deserialize_generic_tags<'de, D>(deserializer: D) -> Result<GenericTags, D::Error>
where
    D: Deserializer<'de>,
{
    struct GenericTagsVisitor;

    impl<'de> Visitor<'de> for GenericTagsVisitor {
        type Value = GenericTags;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("map in which the keys are \"#X\" for some letter X")
        }

        fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
        where
            M: MapAccess<'de>,
        {
            let mut generic_tags = BTreeMap::new();
            while let Some(key) = map.next_key::<String>()? {
                let mut chars = key.chars();
                if let (Some('#'), Some(ch), None) = (chars.next(), chars.next(), chars.next()) {
                    let tag: SingleLetterTag =
                        SingleLetterTag::from_char(ch).map_err(serde::de::Error::custom)?;
                    let values: BTreeSet<String> = map.next_value()?;
                    generic_tags.insert(tag, values);
                } else {
                    map.next_value::<serde::de::IgnoredAny>()?;
                }
            }
            Ok(generic_tags)
        }
    }

    deserializer.deserialize_map(GenericTagsVisitor)
}

fn extend_or_collect<T, I>(mut set: Option<BTreeSet<T>>, iter: I) -> Option<BTreeSet<T>>
where
    I: IntoIterator<Item = T>,
    T: Eq + Ord + Hash,
{
    match set.as_mut() {
        Some(s) => {
            s.extend(iter);
        }
        None => set = Some(iter.into_iter().collect()),
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::tag::{Tag, Tags};

    const PK: &str = "379e863e8357163b5bce5d2688dc4f1dcc2d505222fb8d74db600f30535dfdfe";
    const ID: &str = "70b10f70c1318967eddf12527799411b1a9780ad9c43858f5e5fcd45486a13a5";

    fn dummy_event(kind: Kind, tags: Tags) -> Event {
        Event {
            id: EventId::from_hex(ID).unwrap(),
            pubkey: PublicKey::from_hex(PK).unwrap(),
            created_at: Timestamp::from(1_700_000_000),
            kind,
            tags,
            content: String::from("hello filter"),
            sig: String::from("00"),
        }
    }

    #[test]
    fn test_serialization() {
        let filter = Filter::new()
            .identifier("identifier")
            .search("test")
            .custom_tag(SingleLetterTag::from_char('j').unwrap(), "test1");
        let json = r##"{"search":"test","#d":["identifier"],"#j":["test1"]}"##;
        assert_eq!(filter.as_json(), json);
    }

    #[test]
    fn test_uppercase_tag_serialization() {
        let filter = Filter::new().custom_tag(SingleLetterTag::from_char('P').unwrap(), PK);
        assert_eq!(filter.as_json(), format!(r##"{{"#P":["{PK}"]}}"##));
    }

    #[test]
    fn test_deserialization() {
        let json = format!(
            r##"{{"ids":["{ID}"],"#p":["{PK}"],"search":"test","limit":10,"unknown":"ignored"}}"##
        );
        let filter = Filter::from_json(json).unwrap();
        assert!(filter.ids.unwrap().contains(&EventId::from_hex(ID).unwrap()));
        assert_eq!(filter.limit, Some(10));
        assert_eq!(filter.search.as_deref(), Some("test"));
        assert!(filter
            .generic_tags
            .get(&SingleLetterTag::P)
            .unwrap()
            .contains(PK));
    }

    #[test]
    fn test_match_event() {
        let event = dummy_event(Kind::TEXT_NOTE, Tags::new(vec![Tag::identifier("thing")]));

        assert!(Filter::new().match_event(&event));
        assert!(Filter::new().kind(Kind::TEXT_NOTE).match_event(&event));
        assert!(!Filter::new().kind(Kind::METADATA).match_event(&event));
        assert!(Filter::new()
            .author(PublicKey::from_hex(PK).unwrap())
            .identifier("thing")
            .match_event(&event));
        assert!(!Filter::new().identifier("other").match_event(&event));
        assert!(Filter::new()
            .since(Timestamp::from(1_700_000_000))
            .until(Timestamp::from(1_700_000_000))
            .match_event(&event));
        assert!(!Filter::new()
            .since(Timestamp::from(1_700_000_001))
            .match_event(&event));
        assert!(Filter::new().search("HELLO").match_event(&event));
        assert!(!Filter::new().search("absent").match_event(&event));
    }

    #[test]
    fn test_result_cardinality() {
        let filter = Filter::new().ids([EventId::all_zeros(), EventId::from_hex(ID).unwrap()]);
        assert_eq!(filter.result_cardinality(), Some(2));
        assert_eq!(Filter::new().kind(Kind::TEXT_NOTE).result_cardinality(), None);
    }
}
