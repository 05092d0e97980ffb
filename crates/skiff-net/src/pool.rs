// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Connection pool
//!
//! Registry of relay url → [`Connection`]. Creation is lazy and does no
//! I/O; the transport is only dialed when a consumer opens the socket. The
//! pool enforces a ceiling on concurrently open connections by closing the
//! least-recently-used idle ones — never a connection with live
//! subscriptions or in-flight publishes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use skiff::{RelayUrl, Signer};
use tokio::sync::RwLock;

use crate::auth::ConnectionAuth;
use crate::connection::Connection;
use crate::constants::{
    DEFAULT_AUTH_TIMEOUT, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_MAX_CONNECTIONS,
    NOTIFICATION_CHANNEL_SIZE,
};
use crate::socket::Socket;
use crate::transport::{Transport, WebSocketTransport};

/// Pool options
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Ceiling on concurrently open connections
    pub max_connections: usize,
    /// Transport connect timeout
    pub connection_timeout: Duration,
    /// Authentication window
    pub auth_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
        }
    }
}

#[derive(Debug)]
struct InnerPool {
    connections: RwLock<HashMap<RelayUrl, Connection>>,
    transport: Arc<dyn Transport>,
    signer: Option<Arc<dyn Signer>>,
    options: PoolOptions,
}

/// Connection pool.
#[derive(Debug, Clone)]
pub struct Pool {
    inner: Arc<InnerPool>,
}

impl Default for Pool {
    fn default() -> Self {
        Self::new(
            PoolOptions::default(),
            Arc::new(WebSocketTransport),
            None,
        )
    }
}

impl Pool {
    /// Construct a pool.
    pub fn new(
        options: PoolOptions,
        transport: Arc<dyn Transport>,
        signer: Option<Arc<dyn Signer>>,
    ) -> Self {
        Self {
            inner: Arc::new(InnerPool {
                connections: RwLock::new(HashMap::new()),
                transport,
                signer,
                options,
            }),
        }
    }

    /// Get the connection for `url`, creating it if needed.
    ///
    /// Creation never blocks on I/O: the socket is dialed only when a
    /// consumer opens it.
    pub async fn connection(&self, url: &RelayUrl) -> Connection {
        {
            let connections = self.inner.connections.read().await;
            if let Some(connection) = connections.get(url) {
                connection.touch();
                return connection.clone();
            }
        }

        let mut connections = self.inner.connections.write().await;

        // Racing creators: the first writer wins
        if let Some(connection) = connections.get(url) {
            connection.touch();
            return connection.clone();
        }

        let socket: Socket = Socket::new(
            url.clone(),
            self.inner.transport.clone(),
            self.inner.options.connection_timeout,
            NOTIFICATION_CHANNEL_SIZE,
        );
        let connection: Connection = Connection::new(
            socket,
            self.inner.signer.clone(),
            ConnectionAuth::new(self.inner.options.auth_timeout),
            NOTIFICATION_CHANNEL_SIZE,
        );

        connections.insert(url.clone(), connection.clone());
        self.enforce_ceiling(&mut connections);

        connection
    }

    /// Get the connection for `url` if one exists.
    pub async fn get(&self, url: &RelayUrl) -> Option<Connection> {
        let connections = self.inner.connections.read().await;
        connections.get(url).cloned()
    }

    /// Close and discard the connection for `url`.
    pub async fn remove(&self, url: &RelayUrl) {
        let mut connections = self.inner.connections.write().await;
        if let Some(connection) = connections.remove(url) {
            connection.close();
        }
    }

    /// Urls of every pooled connection.
    pub async fn relays(&self) -> Vec<RelayUrl> {
        let connections = self.inner.connections.read().await;
        connections.keys().cloned().collect()
    }

    /// Close every connection and empty the pool.
    pub async fn shutdown(&self) {
        let mut connections = self.inner.connections.write().await;
        for (.., connection) in connections.drain() {
            connection.close();
        }
    }

    /// Evict least-recently-used idle connections while the number of
    /// non-disconnected connections exceeds the ceiling.
    fn enforce_ceiling(&self, connections: &mut HashMap<RelayUrl, Connection>) {
        let open: usize = connections
            .values()
            .filter(|connection| !connection.status().is_disconnected())
            .count();

        if open <= self.inner.options.max_connections {
            return;
        }

        let mut candidates: Vec<(RelayUrl, u64)> = connections
            .iter()
            .filter(|(.., connection)| {
                connection.is_idle() && !connection.status().is_disconnected()
            })
            .map(|(url, connection)| (url.clone(), connection.last_use()))
            .collect();

        candidates.sort_by_key(|(.., last_use)| *last_use);

        let excess: usize = open - self.inner.options.max_connections;
        for (url, ..) in candidates.into_iter().take(excess) {
            tracing::debug!(url = %url, "Evicting idle connection.");
            if let Some(connection) = connections.remove(&url) {
                connection.close();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use skiff::{Filter, SubscriptionId};

    use super::*;
    use crate::testing::MockTransport;

    fn url(s: &str) -> RelayUrl {
        RelayUrl::parse(s).unwrap()
    }

    fn pool_with(transport: Arc<MockTransport>, max_connections: usize) -> Pool {
        Pool::new(
            PoolOptions {
                max_connections,
                ..Default::default()
            },
            transport,
            None,
        )
    }

    #[tokio::test]
    async fn test_connection_is_reused_and_created_lazily() {
        let transport = MockTransport::new();
        let pool = pool_with(transport.clone(), 10);
        let relay = url("wss://a.example");

        let first = pool.connection(&relay).await;
        let second = pool.connection(&relay).await;
        assert_eq!(first.url(), second.url());
        assert_eq!(pool.relays().await.len(), 1);

        // Creation did no I/O
        assert!(transport.connects().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_closes_idle_never_busy() {
        let transport = MockTransport::new();
        for relay in ["wss://a.example", "wss://b.example", "wss://c.example"] {
            transport.behavior(&url(relay), |_, _| {});
        }

        let pool = pool_with(transport.clone(), 1);
        let a = url("wss://a.example");
        let b = url("wss://b.example");
        let c = url("wss://c.example");

        // `a` is open and busy (live subscription)
        let conn_a = pool.connection(&a).await;
        conn_a.subscribe(SubscriptionId::new("live"), vec![Filter::new()]);
        tokio::time::sleep(Duration::from_millis(10)).await;

        // `b` is open and idle
        let conn_b = pool.connection(&b).await;
        conn_b.ensure_open();
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Creating `c` exceeds the ceiling: the idle `b` goes, busy `a` stays
        let _conn_c = pool.connection(&c).await;

        assert!(pool.get(&b).await.is_none());
        assert!(pool.get(&a).await.is_some());
        assert!(pool.get(&c).await.is_some());
    }

    #[tokio::test]
    async fn test_remove_and_shutdown() {
        let transport = MockTransport::new();
        let pool = pool_with(transport, 10);
        let relay = url("wss://a.example");

        pool.connection(&relay).await;
        pool.remove(&relay).await;
        assert!(pool.get(&relay).await.is_none());

        pool.connection(&relay).await;
        pool.shutdown().await;
        assert!(pool.relays().await.is_empty());
    }
}
