// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Protocol types and wire codecs for the skiff client engine.
//!
//! This crate defines the data model of the protocol (events, filters,
//! relay urls, client/relay messages) without performing any I/O or
//! cryptography. Signing and verification live behind the [`Signer`]
//! seam and are supplied by external collaborators.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod address;
pub mod event;
pub mod filter;
pub mod key;
pub mod message;
pub mod prelude;
pub mod signer;
pub mod types;
pub mod util;

pub use self::address::Address;
pub use self::event::id::EventId;
pub use self::event::kind::Kind;
pub use self::event::tag::{Tag, Tags};
pub use self::event::unsigned::UnsignedEvent;
pub use self::event::Event;
pub use self::filter::{Filter, SingleLetterTag};
pub use self::key::PublicKey;
pub use self::message::client::ClientMessage;
pub use self::message::relay::RelayMessage;
pub use self::message::{MachineReadablePrefix, MessageError, SubscriptionId};
pub use self::signer::{Signer, SignerError};
pub use self::types::time::Timestamp;
pub use self::types::url::RelayUrl;
pub use self::util::JsonUtil;
