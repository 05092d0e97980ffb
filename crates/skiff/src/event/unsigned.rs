// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Unsigned event

use serde::{Deserialize, Serialize};

use crate::event::kind::Kind;
use crate::event::tag::{Tag, Tags};
use crate::key::PublicKey;
use crate::types::time::Timestamp;
use crate::types::url::RelayUrl;

/// An event draft missing its `id` and `sig`.
///
/// A [`Signer`](crate::signer::Signer) computes the content hash and
/// signature, turning the draft into an [`Event`](crate::event::Event).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedEvent {
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
}

impl UnsignedEvent {
    /// Construct a draft with the current timestamp.
    pub fn new<S>(pubkey: PublicKey, kind: Kind, tags: Tags, content: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            pubkey,
            created_at: Timestamp::now(),
            kind,
            tags,
            content: content.into(),
        }
    }

    /// Construct the authentication event answering a relay challenge.
    pub fn client_auth<S>(pubkey: PublicKey, relay: &RelayUrl, challenge: S) -> Self
    where
        S: Into<String>,
    {
        let tags: Tags = Tags::new(vec![Tag::relay(relay), Tag::challenge(challenge)]);
        Self::new(pubkey, Kind::CLIENT_AUTH, tags, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PK: &str = "379e863e8357163b5bce5d2688dc4f1dcc2d505222fb8d74db600f30535dfdfe";

    #[test]
    fn test_client_auth() {
        let url = RelayUrl::parse("wss://relay.example.com").unwrap();
        let draft =
            UnsignedEvent::client_auth(PublicKey::from_hex(PK).unwrap(), &url, "challenge-123");

        assert_eq!(draft.kind, Kind::CLIENT_AUTH);
        assert!(draft.kind.is_ephemeral());
        assert_eq!(draft.tags.len(), 2);
        assert_eq!(draft.tags[0].name(), "relay");
        assert_eq!(draft.tags[1].content(), Some("challenge-123"));
    }
}
