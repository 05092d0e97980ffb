// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Networking core of the skiff client engine.
//!
//! Talks to any number of independent, mutually-untrusting relays over
//! persistent connections and reconciles the results into one logical
//! subscribe/publish/query surface: per-relay sockets with challenge
//! authentication, a bounded connection pool, a cross-relay deduplicating
//! subscription engine and a per-relay acknowledged publish engine, all fed
//! by the router and backed by the repository.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod auth;
pub mod connection;
mod constants;
pub mod engine;
pub mod error;
pub mod pool;
pub mod prelude;
pub mod publish;
pub mod socket;
pub mod stats;
pub mod subscription;
#[cfg(test)]
pub(crate) mod testing;
pub mod tracker;
pub mod transport;

pub use self::auth::AuthStatus;
pub use self::connection::{Connection, ConnectionEvent};
pub use self::engine::{Engine, EngineOptions};
pub use self::error::Error;
pub use self::pool::{Pool, PoolOptions};
pub use self::publish::{MergedThunk, PublishRequest, PublishStatus, Thunk};
pub use self::socket::{Socket, SocketEvent, SocketStatus};
pub use self::stats::ConnectionStats;
pub use self::subscription::{
    RelayDoneReason, SubscribeOptions, Subscription, SubscriptionCloser, SubscriptionUpdate,
};
pub use self::tracker::Tracker;
pub use self::transport::{Transport, TransportError, TransportMessage, WebSocketTransport};
