// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! In-memory indexed event repository.
//!
//! Single source of truth for "do we already have this" and "does this
//! satisfy filter F". Enforces the protocol consistency rules: one event per
//! id, newest-wins replaceable/addressable supersession, and deletion
//! tombstones that keep the underlying record around.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use skiff::{Address, Event, EventId, Filter, Timestamp};
use tokio::sync::RwLock;

pub mod error;
mod store;
pub mod prelude;

pub use self::error::Error;
use self::store::EventStore;

/// Outcome of [`Repository::publish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    /// The event was accepted and indexed
    Saved,
    /// The event was rejected; expected protocol behavior, not a failure
    Rejected(RejectedReason),
}

impl SaveStatus {
    /// Check if the event was accepted
    #[inline]
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved)
    }
}

/// Why an event was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectedReason {
    /// Already stored
    Duplicate,
    /// The id or identity is tombstoned
    Deleted,
    /// A newer event for the same identity is already stored
    Replaced,
    /// Ephemeral kinds are never stored
    Ephemeral,
    /// The deletion targets events of another author
    InvalidDelete,
}

/// Query options
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    /// Include tombstoned events in the results
    pub include_deleted: bool,
}

/// Repository options
#[derive(Debug, Clone, Copy, Default)]
pub struct RepositoryOptions {
    /// Maximum number of stored records; unbounded if `None`.
    ///
    /// The oldest record is evicted on overflow.
    pub max_events: Option<NonZeroUsize>,
}

/// Handle returned by [`Repository::on_event`]; pass it back to
/// [`Repository::remove_observer`] to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverHandle(u64);

type EventObserver = Box<dyn Fn(&Event) + Send + Sync>;

/// In-memory indexed event repository.
#[derive(Default)]
pub struct Repository {
    store: RwLock<EventStore>,
    observers: Mutex<Vec<(u64, EventObserver)>>,
    next_observer_id: AtomicU64,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository").finish_non_exhaustive()
    }
}

impl Repository {
    /// Construct with options
    pub fn new(options: RepositoryOptions) -> Self {
        let store: EventStore = match options.max_events {
            Some(max) => EventStore::bounded(max),
            None => EventStore::unbounded(),
        };

        Self {
            store: RwLock::new(store),
            observers: Mutex::new(Vec::new()),
            next_observer_id: AtomicU64::new(0),
        }
    }

    /// Unbounded repository
    #[inline]
    pub fn unbounded() -> Self {
        Self::new(RepositoryOptions::default())
    }

    /// Repository bounded to `max` records
    #[inline]
    pub fn bounded(max: NonZeroUsize) -> Self {
        Self::new(RepositoryOptions {
            max_events: Some(max),
        })
    }

    /// Store an event.
    ///
    /// The event is trusted input: id and signature verification happen
    /// upstream. Consistency rejections (stale replaceable, tombstoned
    /// target, duplicate) are reported in the [`SaveStatus`], not as errors;
    /// only structurally invalid input errors. Observers fire only for
    /// accepted events, after the store lock is released.
    pub async fn publish(&self, event: &Event) -> Result<SaveStatus, Error> {
        let status: SaveStatus = {
            let mut store = self.store.write().await;
            store.index_event(event)?
        };

        if status.is_saved() {
            self.notify(event);
        }

        Ok(status)
    }

    /// Query with default options: non-tombstoned events matching any filter,
    /// newest first, each filter's `limit` honored independently before the
    /// merge, deduplicated by id.
    #[inline]
    pub async fn query(&self, filters: Vec<Filter>) -> Vec<Event> {
        self.query_with_options(filters, QueryOptions::default())
            .await
    }

    /// Query with explicit [`QueryOptions`].
    pub async fn query_with_options(
        &self,
        filters: Vec<Filter>,
        options: QueryOptions,
    ) -> Vec<Event> {
        let store = self.store.read().await;

        let mut seen: HashSet<EventId> = HashSet::new();
        let mut events: Vec<Event> = Vec::new();

        for filter in filters.iter() {
            for event in store.query(filter, options.include_deleted) {
                if seen.insert(event.id) {
                    events.push(event.clone());
                }
            }
        }

        events.sort();
        events
    }

    /// Count non-tombstoned events matching the filter.
    pub async fn count(&self, filter: &Filter) -> usize {
        let store = self.store.read().await;
        store.count(filter, false)
    }

    /// Get an event by id, tombstoned included.
    pub async fn event_by_id(&self, id: &EventId) -> Option<Event> {
        let store = self.store.read().await;
        store.event_by_id(id).cloned()
    }

    /// Check if an event is stored, tombstoned included.
    pub async fn has_event(&self, id: &EventId) -> bool {
        let store = self.store.read().await;
        store.has_event(id)
    }

    /// Check if an id is tombstoned.
    pub async fn is_deleted(&self, id: &EventId) -> bool {
        let store = self.store.read().await;
        store.is_deleted(id)
    }

    /// Check if an identity was tombstoned at or after `timestamp`.
    pub async fn is_deleted_by_address(&self, address: &Address, timestamp: &Timestamp) -> bool {
        let store = self.store.read().await;
        store.is_address_deleted(address, timestamp)
    }

    /// Number of stored records, tombstoned included.
    pub async fn len(&self) -> usize {
        let store = self.store.read().await;
        store.len()
    }

    /// Check if the repository is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Export every stored record, tombstoned included, newest first.
    pub async fn dump(&self) -> Vec<Event> {
        let store = self.store.read().await;
        store.iter().cloned().collect()
    }

    /// Import events, replaying each through the same acceptance path as
    /// [`Repository::publish`] — stale or duplicate entries in a dump are
    /// harmless. Returns the number of accepted events.
    pub async fn load<I>(&self, events: I) -> usize
    where
        I: IntoIterator<Item = Event>,
    {
        let mut accepted: usize = 0;
        for event in events.into_iter() {
            match self.publish(&event).await {
                Ok(status) if status.is_saved() => accepted += 1,
                Ok(..) => {}
                Err(e) => {
                    tracing::warn!(id = %event.id, error = %e, "Skipping invalid event in import.")
                }
            }
        }
        accepted
    }

    /// Remove every record and tombstone.
    pub async fn clear(&self) {
        let mut store = self.store.write().await;
        store.clear();
    }

    /// Register an update observer, fired once per accepted event in
    /// registration order. Returns the handle to unsubscribe with.
    pub fn on_event<F>(&self, observer: F) -> ObserverHandle
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id: u64 = self.next_observer_id.fetch_add(1, Ordering::SeqCst);
        let mut observers = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        observers.push((id, Box::new(observer)));
        ObserverHandle(id)
    }

    /// Unregister an observer. Unknown handles are ignored.
    pub fn remove_observer(&self, handle: ObserverHandle) {
        let mut observers = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        observers.retain(|(id, ..)| *id != handle.0);
    }

    fn notify(&self, event: &Event) {
        let observers = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for (.., observer) in observers.iter() {
            observer(event);
        }
    }
}
