// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Publish engine surface types.
//!
//! A [`Thunk`] is an in-flight publish: the event was already committed to
//! the repository (optimistic local write) and each target relay resolves
//! independently to an acknowledgement status.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use skiff::{Event, RelayUrl};
use tokio::sync::Notify;

/// Publish request.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    /// The signed event to publish
    pub event: Event,
    /// Target relays; filled by the router when omitted
    pub relays: Option<Vec<RelayUrl>>,
    /// Delay before anything is sent (the local commit is immediate)
    pub delay: Option<Duration>,
}

impl PublishRequest {
    /// Publish `event` to router-selected relays with no delay.
    pub fn new(event: Event) -> Self {
        Self {
            event,
            relays: None,
            delay: None,
        }
    }

    /// Set the target relays
    pub fn relays<I>(mut self, relays: I) -> Self
    where
        I: IntoIterator<Item = RelayUrl>,
    {
        self.relays = Some(relays.into_iter().collect());
        self
    }

    /// Set the send delay
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Per-relay acknowledgement status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishStatus {
    /// No answer yet
    Pending,
    /// The relay accepted the event
    Success {
        /// Optional human-readable message
        message: String,
    },
    /// The relay refused the event or the connection failed
    Failure {
        /// Failure message
        message: String,
    },
    /// No answer within the publish timeout
    Timeout,
    /// The caller aborted before the relay answered
    Aborted,
}

impl PublishStatus {
    /// Check if the relay accepted the event
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[derive(Debug)]
pub(crate) struct ThunkState {
    statuses: Mutex<HashMap<RelayUrl, PublishStatus>>,
    remaining: AtomicUsize,
    done: Notify,
    aborted: AtomicBool,
    abort: Notify,
}

impl ThunkState {
    pub(crate) fn new(relays: &[RelayUrl]) -> Self {
        let statuses: HashMap<RelayUrl, PublishStatus> = relays
            .iter()
            .map(|url| (url.clone(), PublishStatus::Pending))
            .collect();

        Self {
            remaining: AtomicUsize::new(statuses.len()),
            statuses: Mutex::new(statuses),
            done: Notify::new(),
            aborted: AtomicBool::new(false),
            abort: Notify::new(),
        }
    }

    /// Resolve one relay. Entries that already resolved (including by abort)
    /// are untouched.
    pub(crate) fn resolve(&self, url: &RelayUrl, status: PublishStatus) {
        let mut statuses = self
            .statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match statuses.get_mut(url) {
            Some(entry) if *entry == PublishStatus::Pending => {
                *entry = status;
                if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                    self.done.notify_waiters();
                }
            }
            _ => {}
        }
    }

    pub(crate) fn is_resolved(&self) -> bool {
        self.remaining.load(Ordering::SeqCst) == 0
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub(crate) fn snapshot(&self) -> HashMap<RelayUrl, PublishStatus> {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Mark every still-pending relay `Aborted`.
    pub(crate) fn abort(&self) {
        if self.aborted.swap(true, Ordering::SeqCst) {
            return;
        }

        {
            let mut statuses = self
                .statuses
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for status in statuses.values_mut() {
                if *status == PublishStatus::Pending {
                    *status = PublishStatus::Aborted;
                    self.remaining.fetch_sub(1, Ordering::SeqCst);
                }
            }
        }

        self.abort.notify_waiters();
        self.done.notify_waiters();
    }

    /// Wait for an abort request.
    pub(crate) async fn abort_wait(&self) {
        loop {
            let notified = self.abort.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }

    async fn wait_resolved(&self) {
        loop {
            let notified = self.done.notified();
            if self.is_resolved() {
                return;
            }
            notified.await;
        }
    }
}

/// An in-flight publish with per-relay acknowledgement tracking.
#[derive(Debug, Clone)]
pub struct Thunk {
    pub(crate) event: Event,
    pub(crate) state: Arc<ThunkState>,
}

impl Thunk {
    /// The published event
    #[inline]
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Snapshot of the per-relay status map
    pub fn status(&self) -> HashMap<RelayUrl, PublishStatus> {
        self.state.snapshot()
    }

    /// Check if every relay resolved
    pub fn is_resolved(&self) -> bool {
        self.state.is_resolved()
    }

    /// Wait until every relay resolved (success, failure, timeout or abort)
    /// and return the final status map.
    pub async fn result(&self) -> HashMap<RelayUrl, PublishStatus> {
        self.state.wait_resolved().await;
        self.state.snapshot()
    }

    /// Stop waiting for further acknowledgements: still-pending relays are
    /// marked `Aborted`, resolved entries are untouched. The local
    /// repository commit stands.
    pub fn abort(&self) {
        self.state.abort();
    }
}

/// Several thunks merged into one aggregate.
///
/// The combined result resolves only when every constituent resolved, and
/// each constituent keeps its own per-relay map.
#[derive(Debug, Clone)]
pub struct MergedThunk {
    thunks: Vec<Thunk>,
}

impl MergedThunk {
    pub(crate) fn new(thunks: Vec<Thunk>) -> Self {
        Self { thunks }
    }

    /// The constituent thunks
    #[inline]
    pub fn thunks(&self) -> &[Thunk] {
        &self.thunks
    }

    /// Wait for every constituent and return their per-relay maps, in
    /// request order.
    pub async fn result(&self) -> Vec<HashMap<RelayUrl, PublishStatus>> {
        let mut results: Vec<HashMap<RelayUrl, PublishStatus>> =
            Vec::with_capacity(self.thunks.len());
        for thunk in self.thunks.iter() {
            results.push(thunk.result().await);
        }
        results
    }

    /// Abort every constituent.
    pub fn abort(&self) {
        for thunk in self.thunks.iter() {
            thunk.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> RelayUrl {
        RelayUrl::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_resolves_when_every_relay_answers() {
        let relays = [url("wss://a.example"), url("wss://b.example")];
        let state = ThunkState::new(&relays);

        assert!(!state.is_resolved());
        state.resolve(
            &relays[0],
            PublishStatus::Success {
                message: String::new(),
            },
        );
        assert!(!state.is_resolved());
        state.resolve(&relays[1], PublishStatus::Timeout);
        assert!(state.is_resolved());
    }

    #[tokio::test]
    async fn test_abort_marks_only_pending() {
        let relays = [url("wss://a.example"), url("wss://b.example")];
        let state = ThunkState::new(&relays);

        state.resolve(
            &relays[0],
            PublishStatus::Success {
                message: String::from("ok"),
            },
        );
        state.abort();

        let snapshot = state.snapshot();
        assert_eq!(
            snapshot[&relays[0]],
            PublishStatus::Success {
                message: String::from("ok")
            }
        );
        assert_eq!(snapshot[&relays[1]], PublishStatus::Aborted);
        assert!(state.is_resolved());

        // Late answers don't overwrite the abort
        state.resolve(
            &relays[1],
            PublishStatus::Success {
                message: String::new(),
            },
        );
        assert_eq!(state.snapshot()[&relays[1]], PublishStatus::Aborted);
    }
}
