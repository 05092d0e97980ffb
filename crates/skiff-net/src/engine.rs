// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Engine
//!
//! The explicitly constructed context object: one [`Pool`], one
//! [`Repository`], one [`Tracker`] and one [`Router`], wired together behind
//! `subscribe`/`load`/`publish_thunk`. No process-wide state: everything
//! lives in the engine and dies with [`Engine::shutdown`].

use std::collections::{BTreeSet, HashSet};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use skiff::{
    ClientMessage, Event, EventId, Filter, MachineReadablePrefix, PublicKey, RelayMessage,
    RelayUrl, Signer, SubscriptionId,
};
use skiff_router::Router;
use skiff_store::{Repository, RepositoryOptions};
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::auth::AuthStatus;
use crate::connection::{Connection, ConnectionEvent};
use crate::constants::{
    DEFAULT_PUBLISH_TIMEOUT, DEFAULT_SUBSCRIBE_TIMEOUT, DEFAULT_TRACKER_CAPACITY,
};
use crate::error::Error;
use crate::pool::{Pool, PoolOptions};
use crate::publish::{MergedThunk, PublishRequest, PublishStatus, Thunk, ThunkState};
use crate::subscription::{
    relay_watcher, IntakeItem, SubscribeOptions, Subscription, SubscriptionCloser,
    SubscriptionUpdate,
};
use crate::tracker::Tracker;
use crate::transport::{Transport, WebSocketTransport};

const UPDATE_CHANNEL_SIZE: usize = 1_024;

/// Engine options.
pub struct EngineOptions {
    transport: Arc<dyn Transport>,
    signer: Option<Arc<dyn Signer>>,
    router: Router,
    pool: PoolOptions,
    subscribe_timeout: Duration,
    publish_timeout: Duration,
    tracker_capacity: NonZeroUsize,
    max_events: Option<NonZeroUsize>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            transport: Arc::new(WebSocketTransport),
            signer: None,
            router: Router::default(),
            pool: PoolOptions::default(),
            subscribe_timeout: DEFAULT_SUBSCRIBE_TIMEOUT,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
            tracker_capacity: DEFAULT_TRACKER_CAPACITY,
            max_events: None,
        }
    }
}

impl std::fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineOptions")
            .field("pool", &self.pool)
            .field("subscribe_timeout", &self.subscribe_timeout)
            .field("publish_timeout", &self.publish_timeout)
            .finish_non_exhaustive()
    }
}

impl EngineOptions {
    /// New defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the transport
    pub fn transport<T>(mut self, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        self.transport = Arc::new(transport);
        self
    }

    /// Set the transport from a shared handle
    pub fn transport_arc(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Set the signer used for auth challenges
    pub fn signer<S>(mut self, signer: S) -> Self
    where
        S: Signer + 'static,
    {
        self.signer = Some(Arc::new(signer));
        self
    }

    /// Set the router
    pub fn router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Set the ceiling on concurrently open connections
    pub fn max_connections(mut self, max_connections: usize) -> Self {
        self.pool.max_connections = max_connections;
        self
    }

    /// Set the default per-relay subscription timeout
    pub fn subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.subscribe_timeout = timeout;
        self
    }

    /// Set the default per-relay publish timeout
    pub fn publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Set the authentication window
    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.pool.auth_timeout = timeout;
        self
    }

    /// Set the tracker LRU bound
    pub fn tracker_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.tracker_capacity = capacity;
        self
    }

    /// Bound the repository to `max` stored events
    pub fn max_events(mut self, max: NonZeroUsize) -> Self {
        self.max_events = Some(max);
        self
    }
}

#[derive(Debug)]
pub(crate) struct InnerEngine {
    pool: Pool,
    repository: Arc<Repository>,
    tracker: Mutex<Tracker>,
    router: Router,
    subscribe_timeout: Duration,
    publish_timeout: Duration,
    auth_timeout: Duration,
}

/// The client engine.
#[derive(Debug, Clone)]
pub struct Engine {
    inner: Arc<InnerEngine>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}

impl Engine {
    /// Construct an engine.
    pub fn new(options: EngineOptions) -> Self {
        let auth_timeout: Duration = options.pool.auth_timeout;
        let pool: Pool = Pool::new(options.pool, options.transport, options.signer);
        let repository: Arc<Repository> = Arc::new(Repository::new(RepositoryOptions {
            max_events: options.max_events,
        }));

        Self {
            inner: Arc::new(InnerEngine {
                pool,
                repository,
                tracker: Mutex::new(Tracker::new(options.tracker_capacity)),
                router: options.router,
                subscribe_timeout: options.subscribe_timeout,
                publish_timeout: options.publish_timeout,
                auth_timeout,
            }),
        }
    }

    /// The repository backing this engine.
    #[inline]
    pub fn repository(&self) -> &Arc<Repository> {
        &self.inner.repository
    }

    /// The connection pool.
    #[inline]
    pub fn pool(&self) -> &Pool {
        &self.inner.pool
    }

    /// The relay router.
    #[inline]
    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    /// The relays known to have delivered an event.
    pub fn seen_by(&self, id: &EventId) -> Vec<RelayUrl> {
        let tracker = self
            .inner
            .tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tracker.seen_by(id)
    }

    /// Open a logical subscription.
    ///
    /// Filters whose static cardinality bound is already satisfied by the
    /// repository are served locally and removed from the network request;
    /// the rest fan out as one wire REQ per target relay. When `relays` is
    /// omitted the router fills it from the filters' authors.
    pub async fn subscribe(
        &self,
        filters: Vec<Filter>,
        options: SubscribeOptions,
    ) -> Result<Subscription, Error> {
        if filters.is_empty() {
            return Err(Error::EmptyFilters);
        }

        let id: SubscriptionId = SubscriptionId::generate();

        // Local shortcut
        let mut local_events: Vec<Event> = Vec::new();
        let mut remote_filters: Vec<Filter> = Vec::new();

        for filter in filters {
            if let Some(bound) = filter.result_cardinality() {
                let cached: Vec<Event> = self.inner.repository.query(vec![filter.clone()]).await;
                if cached.len() >= bound {
                    tracing::debug!(
                        id = %id,
                        "Filter cardinality bound satisfied locally, skipping wire request."
                    );
                    local_events.extend(cached);
                    continue;
                }
            }
            remote_filters.push(filter);
        }

        let relays: Vec<RelayUrl> = if remote_filters.is_empty() {
            Vec::new()
        } else {
            match &options.relays {
                Some(relays) if !relays.is_empty() => relays.clone(),
                _ => self.inner.relays_for_filters(&remote_filters),
            }
        };

        if !remote_filters.is_empty() && relays.is_empty() {
            return Err(Error::NoRelays);
        }

        let timeout: Duration = options.timeout.unwrap_or(self.inner.subscribe_timeout);
        let auth_timeout: Duration = options.auth_timeout.unwrap_or(self.inner.auth_timeout);
        // Open-ended subscriptions have no completion deadline
        let watcher_timeout: Option<Duration> = options.close_on_eose.then_some(timeout);

        let (out_tx, out_rx) = mpsc::channel(UPDATE_CHANNEL_SIZE);
        let (intake_tx, intake_rx) = mpsc::channel(UPDATE_CHANNEL_SIZE);
        let closer: SubscriptionCloser = SubscriptionCloser::new();

        for url in relays.iter() {
            let connection: Connection = self.inner.pool.connection(url).await;
            tokio::spawn(relay_watcher(
                connection,
                id.clone(),
                remote_filters.clone(),
                options.close_on_eose,
                watcher_timeout,
                auth_timeout,
                intake_tx.clone(),
            ));
        }
        drop(intake_tx);

        let inner: Arc<InnerEngine> = self.inner.clone();
        tokio::spawn(inner.intake_loop(
            id.clone(),
            relays,
            options.close_on_eose,
            local_events,
            intake_rx,
            out_tx,
            closer.clone(),
        ));

        Ok(Subscription {
            id,
            updates: out_rx,
            closer,
        })
    }

    /// Subscribe with `close_on_eose` and resolve with the accumulated
    /// events once every targeted relay is done.
    pub async fn load(
        &self,
        filters: Vec<Filter>,
        options: SubscribeOptions,
    ) -> Result<Vec<Event>, Error> {
        let options: SubscribeOptions = options.close_on_eose(true);
        let mut subscription: Subscription = self.subscribe(filters, options).await?;

        let mut events: Vec<Event> = Vec::new();
        while let Some(update) = subscription.recv().await {
            match update {
                SubscriptionUpdate::Event { event, .. } => events.push(event),
                SubscriptionUpdate::RelayDone { .. } => {}
                SubscriptionUpdate::Complete => break,
            }
        }

        Ok(events)
    }

    /// Publish an event.
    ///
    /// The event is committed to the repository immediately, so local
    /// readers see it before any relay acknowledges; relays are contacted
    /// after `delay` and resolve independently into the thunk's status map.
    pub async fn publish_thunk(&self, request: PublishRequest) -> Result<Thunk, Error> {
        let PublishRequest {
            event,
            relays,
            delay,
        } = request;

        // Optimistic local commit; structural errors fail fast, consistency
        // rejections don't stop the broadcast
        self.inner.repository.publish(&event).await?;

        let relays: Vec<RelayUrl> = match relays {
            Some(relays) if !relays.is_empty() => relays,
            _ => self.inner.router.publish(&event).urls(),
        };

        if relays.is_empty() {
            return Err(Error::NoRelays);
        }

        let state: Arc<ThunkState> = Arc::new(ThunkState::new(&relays));
        let thunk: Thunk = Thunk {
            event: event.clone(),
            state: state.clone(),
        };

        let inner: Arc<InnerEngine> = self.inner.clone();
        let delay: Duration = delay.unwrap_or(Duration::ZERO);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = state.abort_wait() => return,
                }
            }

            for url in relays {
                let connection: Connection = inner.pool.connection(&url).await;
                let state: Arc<ThunkState> = state.clone();
                let event: Event = event.clone();
                let timeout: Duration = inner.publish_timeout;

                tokio::spawn(async move {
                    connection.begin_publish();
                    let status: PublishStatus = tokio::select! {
                        _ = state.abort_wait() => PublishStatus::Aborted,
                        status = publish_to_relay(&connection, &event, timeout) => status,
                    };
                    connection.end_publish();
                    state.resolve(connection.url(), status);
                });
            }
        });

        Ok(thunk)
    }

    /// Publish several events as one aggregate that resolves when all of
    /// them resolved.
    pub async fn publish_thunks(
        &self,
        requests: Vec<PublishRequest>,
    ) -> Result<MergedThunk, Error> {
        let mut thunks: Vec<Thunk> = Vec::with_capacity(requests.len());
        for request in requests {
            thunks.push(self.publish_thunk(request).await?);
        }
        Ok(MergedThunk::new(thunks))
    }

    /// Close every connection.
    pub async fn shutdown(&self) {
        self.inner.pool.shutdown().await;
    }
}

impl InnerEngine {
    /// Target relays for a subscription without explicit relays: merge the
    /// read scenarios of every author named by the filters; the router's
    /// fallback policy fills the rest.
    fn relays_for_filters(&self, filters: &[Filter]) -> Vec<RelayUrl> {
        let authors: BTreeSet<PublicKey> = filters
            .iter()
            .filter_map(|filter| filter.authors.as_ref())
            .flatten()
            .copied()
            .collect();

        let mut scenario = self.router.scenario(Vec::new());
        for author in authors.iter() {
            scenario = scenario.merge(self.router.read_user(author));
        }
        scenario.urls()
    }

    #[allow(clippy::too_many_arguments)]
    async fn intake_loop(
        self: Arc<Self>,
        id: SubscriptionId,
        relays: Vec<RelayUrl>,
        close_on_eose: bool,
        local_events: Vec<Event>,
        mut intake_rx: Receiver<IntakeItem>,
        out_tx: Sender<SubscriptionUpdate>,
        closer: SubscriptionCloser,
    ) {
        // Ids already delivered on this subscription
        let mut delivered: HashSet<EventId> = HashSet::new();

        for event in local_events {
            delivered.insert(event.id);
            if out_tx
                .send(SubscriptionUpdate::Event { relay: None, event })
                .await
                .is_err()
            {
                return;
            }
        }

        let mut pending: HashSet<RelayUrl> = relays.iter().cloned().collect();

        if close_on_eose && pending.is_empty() {
            let _ = out_tx.send(SubscriptionUpdate::Complete).await;
            return;
        }

        loop {
            tokio::select! {
                _ = closer.wait() => break,
                item = intake_rx.recv() => match item {
                    Some(IntakeItem::Event(url, event)) => {
                        let first_sighting: bool = {
                            let mut tracker = self
                                .tracker
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner);
                            tracker.track(event.id, &url)
                        };

                        if first_sighting && delivered.insert(event.id) {
                            // Consistency rejections are expected; only
                            // structural garbage is worth a log line
                            if let Err(e) = self.repository.publish(&event).await {
                                tracing::warn!(id = %event.id, error = %e, "Dropping invalid event.");
                                continue;
                            }

                            if out_tx
                                .send(SubscriptionUpdate::Event {
                                    relay: Some(url),
                                    event,
                                })
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                    }
                    Some(IntakeItem::Done(url, reason)) => {
                        pending.remove(&url);

                        if out_tx
                            .send(SubscriptionUpdate::RelayDone {
                                relay: url,
                                reason,
                            })
                            .await
                            .is_err()
                        {
                            break;
                        }

                        if close_on_eose && pending.is_empty() {
                            let _ = out_tx.send(SubscriptionUpdate::Complete).await;
                            break;
                        }
                    }
                    None => break,
                }
            }
        }

        // Teardown: close every wire subscription still registered
        closer.close();
        for url in relays {
            if let Some(connection) = self.pool.get(&url).await {
                connection.unsubscribe(&id);
            }
        }
    }
}

/// Send one event to one relay and wait for its acknowledgement.
async fn publish_to_relay(
    connection: &Connection,
    event: &Event,
    timeout: Duration,
) -> PublishStatus {
    // Listen before sending so the OK can't be missed
    let mut notifications = connection.notifications();
    connection.ensure_open();
    connection.send(&ClientMessage::event(event.clone()));

    let mut auth_gated: bool = false;

    let wait = async {
        loop {
            match notifications.recv().await {
                Ok(ConnectionEvent::Message(RelayMessage::Ok {
                    event_id,
                    status,
                    message,
                })) if event_id == event.id => {
                    if status {
                        return PublishStatus::Success { message };
                    }

                    // The relay wants auth first: gate the event for replay
                    // and keep waiting for the post-auth OK
                    if MachineReadablePrefix::parse(&message)
                        == Some(MachineReadablePrefix::AuthRequired)
                        && connection.auth_status() != AuthStatus::Failed
                        && !auth_gated
                    {
                        auth_gated = true;
                        connection.send_gated(ClientMessage::event(event.clone()));
                        continue;
                    }

                    return PublishStatus::Failure { message };
                }
                Ok(ConnectionEvent::AuthFailed) if auth_gated => {
                    return PublishStatus::Failure {
                        message: String::from("auth-required: authentication failed"),
                    };
                }
                Ok(ConnectionEvent::Status(status)) if status.is_disconnected() => {
                    return PublishStatus::Failure {
                        message: String::from("relay disconnected"),
                    };
                }
                Ok(..) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(..)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    return PublishStatus::Failure {
                        message: String::from("connection dropped"),
                    };
                }
            }
        }
    };

    match tokio::time::timeout(timeout, wait).await {
        Ok(status) => status,
        Err(..) => PublishStatus::Timeout,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use skiff::Kind;

    use super::*;
    use crate::subscription::RelayDoneReason;
    use crate::testing::{reply, test_event, MockTransport, TestSigner};

    fn url(s: &str) -> RelayUrl {
        RelayUrl::parse(s).unwrap()
    }

    fn eose_on_req(message: ClientMessage, tx: crate::testing::RelayReply) {
        if let ClientMessage::Req {
            subscription_id, ..
        } = message
        {
            reply(&tx, RelayMessage::Eose(subscription_id));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_on_eose_completes_once_across_mixed_relays() {
        let transport = MockTransport::new();
        let a = url("wss://a.example"); // EOSE at t=10ms
        let b = url("wss://b.example"); // connection refused
        let c = url("wss://c.example"); // never answers

        transport.behavior(&a, |message, tx| {
            if let ClientMessage::Req {
                subscription_id, ..
            } = message
            {
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    reply(&tx, RelayMessage::Eose(subscription_id));
                });
            }
        });
        transport.refuse(&b);
        transport.behavior(&c, |_, _| {});

        let engine = Engine::new(EngineOptions::new().transport_arc(transport.clone()));

        let started = tokio::time::Instant::now();
        let mut subscription = engine
            .subscribe(
                vec![Filter::new().kind(Kind::TEXT_NOTE)],
                SubscribeOptions::new()
                    .relays([a.clone(), b.clone(), c.clone()])
                    .close_on_eose(true)
                    .timeout(Duration::from_millis(50)),
            )
            .await
            .unwrap();

        let mut completes: usize = 0;
        let mut done_reasons: Vec<(RelayUrl, RelayDoneReason)> = Vec::new();
        while let Some(update) = subscription.recv().await {
            match update {
                SubscriptionUpdate::Complete => completes += 1,
                SubscriptionUpdate::RelayDone { relay, reason } => {
                    done_reasons.push((relay, reason))
                }
                SubscriptionUpdate::Event { .. } => {}
            }
        }

        assert_eq!(completes, 1);
        // The straggler relay is what held completion back to the timeout
        assert_eq!(started.elapsed(), Duration::from_millis(50));

        assert!(done_reasons.contains(&(a, RelayDoneReason::Eose)));
        assert!(done_reasons.contains(&(b, RelayDoneReason::Error)));
        assert!(done_reasons.contains(&(c, RelayDoneReason::Timeout)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cross_relay_deduplication() {
        let transport = MockTransport::new();
        let a = url("wss://a.example");
        let b = url("wss://b.example");
        let event = test_event(7, 100);

        for relay in [&a, &b] {
            let event = event.clone();
            transport.behavior(relay, move |message, tx| {
                if let ClientMessage::Req {
                    subscription_id, ..
                } = message
                {
                    reply(
                        &tx,
                        RelayMessage::event(subscription_id.clone(), event.clone()),
                    );
                    reply(&tx, RelayMessage::Eose(subscription_id));
                }
            });
        }

        let engine = Engine::new(EngineOptions::new().transport_arc(transport.clone()));
        let events = engine
            .load(
                vec![Filter::new().kind(Kind::TEXT_NOTE)],
                SubscribeOptions::new()
                    .relays([a.clone(), b.clone()])
                    .timeout(Duration::from_secs(1)),
            )
            .await
            .unwrap();

        // Delivered once, tracked on both relays, cached in the repository
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, event.id);
        assert_eq!(engine.seen_by(&event.id).len(), 2);
        assert!(engine.repository().has_event(&event.id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fully_cached_ids_filter_sends_no_wire_request() {
        let transport = MockTransport::new();
        let a = url("wss://a.example");
        transport.behavior(&a, eose_on_req);

        let engine = Engine::new(EngineOptions::new().transport_arc(transport.clone()));

        let e1 = test_event(1, 100);
        let e2 = test_event(2, 200);
        engine.repository().publish(&e1).await.unwrap();
        engine.repository().publish(&e2).await.unwrap();

        let events = engine
            .load(
                vec![Filter::new().ids([e1.id, e2.id])],
                SubscribeOptions::new()
                    .relays([a])
                    .timeout(Duration::from_millis(100)),
            )
            .await
            .unwrap();

        assert_eq!(events.len(), 2);
        assert!(transport.connects().is_empty());
        assert!(transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_partially_cached_ids_filter_still_asks_the_network() {
        let transport = MockTransport::new();
        let a = url("wss://a.example");
        transport.behavior(&a, eose_on_req);

        let engine = Engine::new(EngineOptions::new().transport_arc(transport.clone()));

        let cached = test_event(1, 100);
        let missing = test_event(2, 200);
        engine.repository().publish(&cached).await.unwrap();

        let events = engine
            .load(
                vec![Filter::new().ids([cached.id, missing.id])],
                SubscribeOptions::new()
                    .relays([a.clone()])
                    .timeout(Duration::from_millis(100)),
            )
            .await
            .unwrap();

        // The relay had nothing, but it was asked
        assert_eq!(events.len(), 0);
        assert_eq!(transport.connects(), vec![a.clone()]);
        assert!(transport
            .sent_to(&a)
            .iter()
            .any(|message| message.is_req()));
    }

    #[tokio::test]
    async fn test_subscribe_without_filters_or_relays_fails_fast() {
        let transport = MockTransport::new();
        let engine = Engine::new(EngineOptions::new().transport_arc(transport.clone()));

        assert!(matches!(
            engine
                .subscribe(Vec::new(), SubscribeOptions::new())
                .await
                .unwrap_err(),
            Error::EmptyFilters
        ));

        // No explicit relays, no router hooks, no fallbacks
        assert!(matches!(
            engine
                .subscribe(
                    vec![Filter::new().kind(Kind::TEXT_NOTE)],
                    SubscribeOptions::new()
                )
                .await
                .unwrap_err(),
            Error::NoRelays
        ));
        assert!(transport.connects().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_thunk_aggregates_per_relay() {
        let transport = MockTransport::new();
        let a = url("wss://a.example"); // accepts
        let b = url("wss://b.example"); // refuses
        let c = url("wss://c.example"); // never answers

        transport.behavior(&a, |message, tx| {
            if let ClientMessage::Event(event) = message {
                reply(&tx, RelayMessage::ok(event.id, true, ""));
            }
        });
        transport.behavior(&b, |message, tx| {
            if let ClientMessage::Event(event) = message {
                reply(&tx, RelayMessage::ok(event.id, false, "blocked: not welcome"));
            }
        });
        transport.behavior(&c, |_, _| {});

        let engine = Engine::new(
            EngineOptions::new()
                .transport_arc(transport.clone())
                .publish_timeout(Duration::from_millis(50)),
        );

        let event = test_event(9, 100);
        let thunk = engine
            .publish_thunk(
                PublishRequest::new(event.clone()).relays([a.clone(), b.clone(), c.clone()]),
            )
            .await
            .unwrap();

        // Optimistic local commit: visible before any acknowledgement
        assert!(engine.repository().has_event(&event.id).await);

        let result = thunk.result().await;
        assert_eq!(
            result[&a],
            PublishStatus::Success {
                message: String::new()
            }
        );
        assert_eq!(
            result[&b],
            PublishStatus::Failure {
                message: String::from("blocked: not welcome")
            }
        );
        assert_eq!(result[&c], PublishStatus::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_thunks_resolves_only_after_every_constituent() {
        let transport = MockTransport::new();
        let a = url("wss://a.example"); // immediate OK
        let b = url("wss://b.example"); // OK after 20ms

        transport.behavior(&a, |message, tx| {
            if let ClientMessage::Event(event) = message {
                reply(&tx, RelayMessage::ok(event.id, true, ""));
            }
        });
        transport.behavior(&b, |message, tx| {
            if let ClientMessage::Event(event) = message {
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    reply(&tx, RelayMessage::ok(event.id, true, ""));
                });
            }
        });

        let engine = Engine::new(EngineOptions::new().transport_arc(transport.clone()));

        let merged = engine
            .publish_thunks(vec![
                PublishRequest::new(test_event(1, 100)).relays([a.clone()]),
                PublishRequest::new(test_event(2, 100)).relays([b.clone()]),
            ])
            .await
            .unwrap();

        let results = merged.result().await;
        assert_eq!(results.len(), 2);
        assert!(results[0][&a].is_success());
        assert!(results[1][&b].is_success());
        // Each constituent keeps its own per-relay map
        assert!(!results[0].contains_key(&b));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_marks_pending_relays_aborted() {
        let transport = MockTransport::new();
        let a = url("wss://a.example");
        transport.behavior(&a, |_, _| {});

        let engine = Engine::new(EngineOptions::new().transport_arc(transport.clone()));

        let event = test_event(3, 100);
        let thunk = engine
            .publish_thunk(PublishRequest::new(event.clone()).relays([a.clone()]))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        thunk.abort();

        let result = thunk.result().await;
        assert_eq!(result[&a], PublishStatus::Aborted);
        // The local commit stands
        assert!(engine.repository().has_event(&event.id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_challenge_roundtrip_replays_gated_request() {
        let transport = MockTransport::new();
        let a = url("wss://a.example");

        let authed = Arc::new(AtomicBool::new(false));
        {
            let authed = authed.clone();
            transport.behavior(&a, move |message, tx| match message {
                ClientMessage::Req {
                    subscription_id, ..
                } => {
                    if authed.load(Ordering::SeqCst) {
                        reply(&tx, RelayMessage::Eose(subscription_id));
                    } else {
                        reply(
                            &tx,
                            RelayMessage::Auth {
                                challenge: String::from("challenge-1"),
                            },
                        );
                        reply(
                            &tx,
                            RelayMessage::closed(subscription_id, "auth-required: subscribe"),
                        );
                    }
                }
                ClientMessage::Auth(event) => {
                    authed.store(true, Ordering::SeqCst);
                    reply(&tx, RelayMessage::ok(event.id, true, ""));
                }
                _ => {}
            });
        }

        let engine = Engine::new(
            EngineOptions::new()
                .transport_arc(transport.clone())
                .signer(TestSigner::new(9)),
        );

        let events = engine
            .load(
                vec![Filter::new().kind(Kind::TEXT_NOTE)],
                SubscribeOptions::new()
                    .relays([a.clone()])
                    .timeout(Duration::from_secs(1)),
            )
            .await
            .unwrap();

        assert!(events.is_empty());

        let connection = engine.pool().get(&a).await.unwrap();
        assert_eq!(connection.auth_status(), AuthStatus::Authenticated);

        // The REQ went out twice: once gated, once released after auth
        let reqs: usize = transport
            .sent_to(&a)
            .iter()
            .filter(|message| message.is_req())
            .count();
        assert_eq!(reqs, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_subscription_receives_live_events_until_closed() {
        let transport = MockTransport::new();
        let a = url("wss://a.example");
        let event = test_event(5, 100);

        {
            let event = event.clone();
            transport.behavior(&a, move |message, tx| {
                if let ClientMessage::Req {
                    subscription_id, ..
                } = message
                {
                    reply(&tx, RelayMessage::Eose(subscription_id.clone()));
                    // A live event well after EOSE
                    let event = event.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        reply(&tx, RelayMessage::event(subscription_id, event));
                    });
                }
            });
        }

        let engine = Engine::new(EngineOptions::new().transport_arc(transport.clone()));
        let mut subscription = engine
            .subscribe(
                vec![Filter::new().kind(Kind::TEXT_NOTE)],
                SubscribeOptions::new().relays([a.clone()]),
            )
            .await
            .unwrap();

        let mut live: Option<Event> = None;
        while let Some(update) = subscription.recv().await {
            match update {
                SubscriptionUpdate::Event { event, .. } => {
                    live = Some(event);
                    break;
                }
                SubscriptionUpdate::RelayDone { reason, .. } => {
                    assert_eq!(reason, RelayDoneReason::Eose);
                }
                SubscriptionUpdate::Complete => panic!("open subscription must not complete"),
            }
        }
        assert_eq!(live.unwrap().id, event.id);

        subscription.close();
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Cancellation sent CLOSE to the relay
        assert!(transport
            .sent_to(&a)
            .iter()
            .any(|message| matches!(message, ClientMessage::Close(..))));
    }
}
