// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Connection
//!
//! One relay: a [`Socket`], its authentication state, running stats and the
//! registry of live wire subscriptions. The connection re-broadcasts typed
//! notifications, answers AUTH challenges through the signer seam and
//! replays `auth-required:`-gated requests after authentication.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use skiff::{
    ClientMessage, Filter, MachineReadablePrefix, RelayMessage, RelayUrl, Signer, SubscriptionId,
    Timestamp, UnsignedEvent,
};
use tokio::sync::{broadcast, Notify};

use crate::auth::{AuthStatus, ConnectionAuth};
use crate::socket::{Socket, SocketEvent, SocketStatus};
use crate::stats::ConnectionStats;

/// Typed connection notification.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// The socket status changed
    Status(SocketStatus),
    /// A decoded inbound message
    Message(RelayMessage),
    /// The challenge round-trip succeeded
    Authenticated,
    /// The relay rejected the auth event, or no signer is configured
    AuthFailed,
}

#[derive(Debug)]
struct InnerConnection {
    url: RelayUrl,
    socket: Socket,
    auth: ConnectionAuth,
    stats: ConnectionStats,
    signer: Option<Arc<dyn Signer>>,
    subscriptions: Mutex<HashMap<SubscriptionId, Vec<Filter>>>,
    active_publishes: AtomicUsize,
    last_use: AtomicU64,
    terminate: Notify,
    events: broadcast::Sender<ConnectionEvent>,
}

/// One relay connection.
#[derive(Debug, Clone)]
pub struct Connection {
    inner: Arc<InnerConnection>,
}

impl Connection {
    pub(crate) fn new(
        socket: Socket,
        signer: Option<Arc<dyn Signer>>,
        auth: ConnectionAuth,
        channel_size: usize,
    ) -> Self {
        let (events, ..) = broadcast::channel(channel_size);

        let connection: Self = Self {
            inner: Arc::new(InnerConnection {
                url: socket.url().clone(),
                socket,
                auth,
                stats: ConnectionStats::default(),
                signer,
                subscriptions: Mutex::new(HashMap::new()),
                active_publishes: AtomicUsize::new(0),
                last_use: AtomicU64::new(Timestamp::now().as_u64()),
                terminate: Notify::new(),
                events,
            }),
        };

        let inner: Arc<InnerConnection> = connection.inner.clone();
        tokio::spawn(async move { inner.pump().await });

        connection
    }

    /// Relay url
    #[inline]
    pub fn url(&self) -> &RelayUrl {
        &self.inner.url
    }

    /// Socket status
    #[inline]
    pub fn status(&self) -> SocketStatus {
        self.inner.socket.status()
    }

    /// Authentication status
    #[inline]
    pub fn auth_status(&self) -> AuthStatus {
        self.inner.auth.status()
    }

    /// Connection stats
    #[inline]
    pub fn stats(&self) -> &ConnectionStats {
        &self.inner.stats
    }

    /// Subscribe to connection notifications
    #[inline]
    pub fn notifications(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// Open the socket if it isn't already open or connecting.
    pub fn ensure_open(&self) {
        self.touch();
        self.inner.socket.open();
    }

    /// Register a wire subscription and send its REQ.
    pub fn subscribe(&self, id: SubscriptionId, filters: Vec<Filter>) {
        {
            let mut subscriptions = self
                .inner
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            subscriptions.insert(id.clone(), filters.clone());
        }

        self.ensure_open();
        self.inner.socket.send(&ClientMessage::req(id, filters));
    }

    /// Unregister a wire subscription, sending CLOSE if the socket is still
    /// usable. Idempotent.
    pub fn unsubscribe(&self, id: &SubscriptionId) {
        let registered: bool = {
            let mut subscriptions = self
                .inner
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            subscriptions.remove(id).is_some()
        };

        if registered && !self.status().is_disconnected() {
            self.inner.socket.send(&ClientMessage::close(id.clone()));
        }
    }

    /// Queue a message on the socket.
    pub fn send(&self, message: &ClientMessage) {
        self.touch();
        self.inner.socket.send(message);
    }

    /// Queue a message the relay gated behind authentication; it is re-sent
    /// in arrival order once the challenge round-trip succeeds.
    pub fn send_gated(&self, message: ClientMessage) {
        self.inner.auth.push_pending(message);
    }

    pub(crate) fn begin_publish(&self) {
        self.touch();
        self.inner.active_publishes.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn end_publish(&self) {
        self.inner.active_publishes.fetch_sub(1, Ordering::SeqCst);
    }

    /// A connection is idle when it has no live subscriptions and no
    /// in-flight publishes. Only idle connections may be evicted.
    pub fn is_idle(&self) -> bool {
        let subscriptions = self
            .inner
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscriptions.is_empty() && self.inner.active_publishes.load(Ordering::SeqCst) == 0
    }

    pub(crate) fn touch(&self) {
        self.inner
            .last_use
            .store(Timestamp::now().as_u64(), Ordering::SeqCst);
    }

    pub(crate) fn last_use(&self) -> u64 {
        self.inner.last_use.load(Ordering::SeqCst)
    }

    /// Close the socket and stop the notification pump.
    pub fn close(&self) {
        self.inner.terminate.notify_one();
        self.inner.socket.close();
    }
}

impl InnerConnection {
    async fn pump(self: Arc<Self>) {
        let mut rx = self.socket.notifications();

        loop {
            tokio::select! {
                _ = self.terminate.notified() => break,
                event = rx.recv() => match event {
                    Ok(SocketEvent::Status(status)) => {
                        match status {
                            SocketStatus::Open => {
                                self.stats.new_open();
                                self.resubscribe();
                            }
                            SocketStatus::Closed => self.stats.new_close(),
                            SocketStatus::Error => self.stats.new_error(),
                            _ => {}
                        }
                        let _ = self.events.send(ConnectionEvent::Status(status));
                    }
                    Ok(SocketEvent::Message(message)) => {
                        self.stats.seen(&message);
                        self.handle_message(&message).await;
                        let _ = self.events.send(ConnectionEvent::Message(message));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(url = %self.url, skipped = %skipped, "Notification receiver lagged.");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    /// Re-issue the REQ of every registered subscription after a reconnect.
    ///
    /// The first open flushes the socket's own queue, which already carries
    /// the REQs; relays treat a repeated REQ with the same id as a harmless
    /// replacement.
    fn resubscribe(&self) {
        if self.stats.opened() <= 1 {
            return;
        }

        let subscriptions: Vec<(SubscriptionId, Vec<Filter>)> = {
            let subscriptions = self
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            subscriptions
                .iter()
                .map(|(id, filters)| (id.clone(), filters.clone()))
                .collect()
        };

        for (id, filters) in subscriptions {
            self.socket.send(&ClientMessage::req(id, filters));
        }
    }

    async fn handle_message(&self, message: &RelayMessage) {
        match message {
            RelayMessage::Auth { challenge } => self.handle_challenge(challenge).await,
            RelayMessage::Ok {
                event_id, status, ..
            } if self.auth.is_auth_event(event_id) => {
                if *status {
                    for gated in self.auth.authenticated() {
                        self.socket.send(&gated);
                    }
                    tracing::info!(url = %self.url, "Authenticated to relay.");
                    let _ = self.events.send(ConnectionEvent::Authenticated);
                } else {
                    self.auth.failed();
                    let _ = self.events.send(ConnectionEvent::AuthFailed);
                }
            }
            RelayMessage::Closed {
                subscription_id,
                message,
            } => {
                match MachineReadablePrefix::parse(message) {
                    // Gate the REQ for replay after authentication
                    Some(MachineReadablePrefix::AuthRequired) => {
                        let filters: Option<Vec<Filter>> = {
                            let subscriptions = self
                                .subscriptions
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner);
                            subscriptions.get(subscription_id).cloned()
                        };

                        if let Some(filters) = filters {
                            self.auth
                                .push_pending(ClientMessage::req(subscription_id.clone(), filters));
                        }
                    }
                    // The relay may accept a retry later; keep the registration
                    Some(MachineReadablePrefix::RateLimited) => {}
                    _ => {
                        let mut subscriptions = self
                            .subscriptions
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner);
                        subscriptions.remove(subscription_id);
                    }
                }
            }
            RelayMessage::Notice(notice) => {
                tracing::warn!(url = %self.url, msg = %notice, "Received NOTICE.");
            }
            _ => {}
        }
    }

    async fn handle_challenge(&self, challenge: &str) {
        self.auth.challenged(challenge);

        match &self.signer {
            Some(signer) => {
                let draft: UnsignedEvent =
                    UnsignedEvent::client_auth(signer.public_key(), &self.url, challenge);

                match signer.sign_event(draft).await {
                    Ok(event) => {
                        self.auth.authenticating(event.id);
                        self.socket.send(&ClientMessage::auth(event));
                    }
                    Err(e) => {
                        tracing::error!(url = %self.url, error = %e, "Can't sign auth event.");
                        self.auth.failed();
                        let _ = self.events.send(ConnectionEvent::AuthFailed);
                    }
                }
            }
            None => {
                tracing::debug!(url = %self.url, "Auth challenge received but no signer is configured.");
                self.auth.failed();
                let _ = self.events.send(ConnectionEvent::AuthFailed);
            }
        }
    }
}
