// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Relay messages

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

use super::{MessageError, SubscriptionId};
use crate::event::id::EventId;
use crate::event::Event;

/// Messages sent by relays, received by clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// `["EVENT", <subscription_id>, <event>]`
    Event {
        /// Subscription id
        subscription_id: SubscriptionId,
        /// Event
        event: Box<Event>,
    },
    /// `["OK", <event_id>, <true|false>, <message>]`
    Ok {
        /// Event id
        event_id: EventId,
        /// Whether the event was accepted
        status: bool,
        /// Human-readable message, possibly machine-prefixed
        message: String,
    },
    /// `["EOSE", <subscription_id>]` — end of stored events
    Eose(SubscriptionId),
    /// `["CLOSED", <subscription_id>, <message>]`
    Closed {
        /// Subscription id
        subscription_id: SubscriptionId,
        /// Human-readable message, possibly machine-prefixed
        message: String,
    },
    /// `["NOTICE", <message>]`
    Notice(String),
    /// `["AUTH", <challenge>]`
    Auth {
        /// Challenge string
        challenge: String,
    },
    /// `["COUNT", <subscription_id>, {"count": <n>}]`
    Count {
        /// Subscription id
        subscription_id: SubscriptionId,
        /// Number of matching events
        count: usize,
    },
}

impl RelayMessage {
    /// Create a new `EVENT` message
    #[inline]
    pub fn event(subscription_id: SubscriptionId, event: Event) -> Self {
        Self::Event {
            subscription_id,
            event: Box::new(event),
        }
    }

    /// Create a new `OK` message
    pub fn ok<S>(event_id: EventId, status: bool, message: S) -> Self
    where
        S: Into<String>,
    {
        Self::Ok {
            event_id,
            status,
            message: message.into(),
        }
    }

    /// Create a new `CLOSED` message
    pub fn closed<S>(subscription_id: SubscriptionId, message: S) -> Self
    where
        S: Into<String>,
    {
        Self::Closed {
            subscription_id,
            message: message.into(),
        }
    }

    /// Serialize as a JSON array value
    pub fn as_value(&self) -> Value {
        match self {
            Self::Event {
                subscription_id,
                event,
            } => json!(["EVENT", subscription_id, event]),
            Self::Ok {
                event_id,
                status,
                message,
            } => json!(["OK", event_id, status, message]),
            Self::Eose(subscription_id) => json!(["EOSE", subscription_id]),
            Self::Closed {
                subscription_id,
                message,
            } => json!(["CLOSED", subscription_id, message]),
            Self::Notice(message) => json!(["NOTICE", message]),
            Self::Auth { challenge } => json!(["AUTH", challenge]),
            Self::Count {
                subscription_id,
                count,
            } => json!(["COUNT", subscription_id, { "count": count }]),
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
            // ["EVENT", <subscription_id>, <event>]
            Some("EVENT") if v.len() == 3 => {
                let subscription_id: SubscriptionId = serde_json::from_value(v[1].clone())?;
                let event: Event = serde_json::from_value(v[2].clone())?;
                Ok(Self::event(subscription_id, event))
            }
            // ["OK", <event_id>, <true|false>, <message>]
            Some("OK") if v.len() == 4 => {
                let event_id: EventId = serde_json::from_value(v[1].clone())?;
                let status: bool = v[2].as_bool().ok_or(MessageError::InvalidMessageFormat)?;
                let message: String = serde_json::from_value(v[3].clone())?;
                Ok(Self::ok(event_id, status, message))
            }
            // ["EOSE", <subscription_id>]
            Some("EOSE") if v.len() == 2 => {
                let subscription_id: SubscriptionId = serde_json::from_value(v[1].clone())?;
                Ok(Self::Eose(subscription_id))
            }
            // ["CLOSED", <subscription_id>, <message>]
            Some("CLOSED") if v.len() == 3 => {
                let subscription_id: SubscriptionId = serde_json::from_value(v[1].clone())?;
                let message: String = serde_json::from_value(v[2].clone())?;
                Ok(Self::closed(subscription_id, message))
            }
            // ["NOTICE", <message>]
            Some("NOTICE") if v.len() == 2 => {
                let message: String = serde_json::from_value(v[1].clone())?;
                Ok(Self::Notice(message))
            }
            // ["AUTH", <challenge>]
            Some("AUTH") if v.len() == 2 => {
                let challenge: String = serde_json::from_value(v[1].clone())?;
                Ok(Self::Auth { challenge })
            }
            // ["COUNT", <subscription_id>, {"count": <n>}]
            Some("COUNT") if v.len() == 3 => {
                let subscription_id: SubscriptionId = serde_json::from_value(v[1].clone())?;
                let count: usize = v[2]
                    .get("count")
                    .and_then(|c| c.as_u64())
                    .ok_or(MessageError::InvalidMessageFormat)? as usize;
                Ok(Self::Count {
                    subscription_id,
                    count,
                })
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

impl Serialize for RelayMessage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.as_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RelayMessage {
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

    const ID: &str = "70b10f70c1318967eddf12527799411b1a9780ad9c43858f5e5fcd45486a13a5";

    #[test]
    fn test_ok_roundtrip() {
        let json = format!(r#"["OK","{ID}",true,"pow: difficulty 25>=24"]"#);
        let msg = RelayMessage::from_json(&json).unwrap();
        assert_eq!(
            msg,
            RelayMessage::ok(
                EventId::from_hex(ID).unwrap(),
                true,
                "pow: difficulty 25>=24"
            )
        );
        assert_eq!(msg.as_json(), json);
    }

    #[test]
    fn test_eose() {
        let msg = RelayMessage::from_json(r#"["EOSE","sub1"]"#).unwrap();
        assert_eq!(msg, RelayMessage::Eose(SubscriptionId::new("sub1")));
    }

    #[test]
    fn test_closed_and_notice() {
        let msg = RelayMessage::from_json(r#"["CLOSED","sub1","auth-required: do auth"]"#).unwrap();
        assert_eq!(
            msg,
            RelayMessage::closed(SubscriptionId::new("sub1"), "auth-required: do auth")
        );

        let msg = RelayMessage::from_json(r#"["NOTICE","unexpected error"]"#).unwrap();
        assert_eq!(msg, RelayMessage::Notice(String::from("unexpected error")));
    }

    #[test]
    fn test_auth_and_count() {
        let msg = RelayMessage::from_json(r#"["AUTH","challenge-string"]"#).unwrap();
        assert_eq!(
            msg,
            RelayMessage::Auth {
                challenge: String::from("challenge-string")
            }
        );

        let msg = RelayMessage::from_json(r#"["COUNT","sub1",{"count":42}]"#).unwrap();
        assert_eq!(
            msg,
            RelayMessage::Count {
                subscription_id: SubscriptionId::new("sub1"),
                count: 42
            }
        );
        assert_eq!(msg.as_json(), r#"["COUNT","sub1",{"count":42}]"#);
    }

    #[test]
    fn test_malformed() {
        assert!(RelayMessage::from_json(r#"["EVENT","sub1"]"#).is_err());
        assert!(RelayMessage::from_json(r#"["OK","nothex",true,""]"#).is_err());
        assert!(RelayMessage::from_json("").is_err());
        assert!(RelayMessage::from_json("not json").is_err());
    }
}
