// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Client messages

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

use super::{MessageError, SubscriptionId};
use crate::event::Event;
use crate::filter::Filter;

/// Messages sent by clients, received by relays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// `["EVENT", <event>]`
    Event(Box<Event>),
    /// `["REQ", <subscription_id>, <filter>, ...]`
    Req {
        /// Subscription id
        subscription_id: SubscriptionId,
        /// Filters
        filters: Vec<Filter>,
    },
    /// `["COUNT", <subscription_id>, <filter>, ...]`
    Count {
        /// Subscription id
        subscription_id: SubscriptionId,
        /// Filters
        filters: Vec<Filter>,
    },
    /// `["CLOSE", <subscription_id>]`
    Close(SubscriptionId),
    /// `["AUTH", <signed challenge event>]`
    Auth(Box<Event>),
}

impl ClientMessage {
    /// Create a new `EVENT` message
    #[inline]
    pub fn event(event: Event) -> Self {
        Self::Event(Box::new(event))
    }

    /// Create a new `REQ` message
    #[inline]
    pub fn req(subscription_id: SubscriptionId, filters: Vec<Filter>) -> Self {
        Self::Req {
            subscription_id,
            filters,
        }
    }

    /// Create a new `CLOSE` message
    #[inline]
    pub fn close(subscription_id: SubscriptionId) -> Self {
        Self::Close(subscription_id)
    }

    /// Create a new `AUTH` message
    #[inline]
    pub fn auth(event: Event) -> Self {
        Self::Auth(Box::new(event))
    }

    /// Check if this is an `EVENT` message
    #[inline]
    pub fn is_event(&self) -> bool {
        matches!(self, Self::Event(..))
    }

    /// Check if this is a `REQ` message
    #[inline]
    pub fn is_req(&self) -> bool {
        matches!(self, Self::Req { .. })
    }

    /// Serialize as a JSON array value
    pub fn as_value(&self) -> Value {
        match self {
            Self::Event(event) => json!(["EVENT", event]),
            Self::Req {
                subscription_id,
                filters,
            } => {
                let mut array = json!(["REQ", subscription_id]);
                let mut filters = json!(filters);
                if let (Some(array), Some(filters)) =
                    (array.as_array_mut(), filters.as_array_mut())
                {
                    array.append(filters);
                }
                array
            }
            Self::Count {
                subscription_id,
                filters,
            } => {
                let mut array = json!(["COUNT", subscription_id]);
                let mut filters = json!(filters);
                if let (Some(array), Some(filters)) =
                    (array.as_array_mut(), filters.as_array_mut())
                {
                    array.append(filters);
                }
                array
            }
            Self::Close(subscription_id) => json!(["CLOSE", subscription_id]),
            Self::Auth(event) => json!(["AUTH", event]),
        }
    }

    /// Serialize as a JSON string
    pub fn as_json(&self) -> String {
        self.as_value().to_string()
    }

    /// Deserialize from a JSON array value
    pub fn from_value(msg: Value) -> Result<Self, MessageError> {
        let v = msg.as_array().ok_or(MessageError::InvalidMessageFormat)?;

        match v.first().and_then(|v| v.as_str()) {
            // ["EVENT", <event>]
            Some("EVENT") if v.len() == 2 => {
                let event: Event = serde_json::from_value(v[1].clone())?;
                Ok(Self::event(event))
            }
            // ["REQ", <subscription_id>, <filter>, ...]
            Some("REQ") if v.len() >= 2 => {
                let subscription_id: SubscriptionId = serde_json::from_value(v[1].clone())?;
                let filters: Vec<Filter> = serde_json::from_value(Value::Array(v[2..].to_vec()))?;
                Ok(Self::req(subscription_id, filters))
            }
            // ["COUNT", <subscription_id>, <filter>, ...]
            Some("COUNT") if v.len() >= 2 => {
                let subscription_id: SubscriptionId = serde_json::from_value(v[1].clone())?;
                let filters: Vec<Filter> = serde_json::from_value(Value::Array(v[2..].to_vec()))?;
                Ok(Self::Count {
                    subscription_id,
                    filters,
                })
            }
            // ["CLOSE", <subscription_id>]
            Some("CLOSE") if v.len() == 2 => {
                let subscription_id: SubscriptionId = serde_json::from_value(v[1].clone())?;
                Ok(Self::close(subscription_id))
            }
            // ["AUTH", <event>]
            Some("AUTH") if v.len() == 2 => {
                let event: Event = serde_json::from_value(v[1].clone())?;
                Ok(Self::auth(event))
            }
            _ => Err(MessageError::InvalidMessageFormat),
        }
    }

    /// Deserialize from a JSON string
    pub fn from_json(msg: &str) -> Result<Self, MessageError> {
        if msg.is_empty() {
            return Err(MessageError::InvalidMessageFormat);
        }

        let value: Value = serde_json::from_str(msg)?;
        Self::from_value(value)
    }
}

impl Serialize for ClientMessage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.as_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ClientMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::kind::Kind;
    use crate::key::PublicKey;

    const PK: &str = "379e863e8357163b5bce5d2688dc4f1dcc2d505222fb8d74db600f30535dfdfe";

    #[test]
    fn test_req_serialization() {
        let filters = vec![
            Filter::new().kind(Kind::new(4)),
            Filter::new().pubkey(PublicKey::from_hex(PK).unwrap()),
        ];

        let msg = ClientMessage::req(SubscriptionId::new("test"), filters);
        assert_eq!(
            msg.as_json(),
            format!(r##"["REQ","test",{{"kinds":[4]}},{{"#p":["{PK}"]}}]"##)
        );
    }

    #[test]
    fn test_close_serialization() {
        let msg = ClientMessage::close(SubscriptionId::new("test"));
        assert_eq!(msg.as_json(), r#"["CLOSE","test"]"#);
    }

    #[test]
    fn test_req_roundtrip() {
        let json = format!(r##"["REQ","abc",{{"authors":["{PK}"],"limit":3}}]"##);
        let msg = ClientMessage::from_json(&json).unwrap();
        match &msg {
            ClientMessage::Req {
                subscription_id,
                filters,
            } => {
                assert_eq!(subscription_id.as_str(), "abc");
                assert_eq!(filters.len(), 1);
                assert_eq!(filters[0].limit, Some(3));
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert_eq!(msg.as_json(), json);
    }

    #[test]
    fn test_invalid() {
        assert!(ClientMessage::from_json("[]").is_err());
        assert!(ClientMessage::from_json(r#"["UNKNOWN"]"#).is_err());
        assert!(ClientMessage::from_json(r#"{"not":"an array"}"#).is_err());
    }
}
