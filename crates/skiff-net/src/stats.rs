// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Connection stats

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use skiff::{RelayMessage, Timestamp};

#[derive(Debug, Default)]
struct InnerConnectionStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
    last_error_at: AtomicU64,
    last_event_at: AtomicU64,
    last_eose_at: AtomicU64,
    last_ok_at: AtomicU64,
    last_closed_msg_at: AtomicU64,
    last_notice_at: AtomicU64,
    last_auth_at: AtomicU64,
    last_count_at: AtomicU64,
}

/// Running statistics of one connection: open/close counts, error
/// timestamps and the last-seen timestamp per inbound message type.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    inner: Arc<InnerConnectionStats>,
}

impl ConnectionStats {
    /// How many times the socket reached `Open`
    #[inline]
    pub fn opened(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }

    /// How many times the socket closed
    #[inline]
    pub fn closed(&self) -> usize {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// When the last transport error happened
    #[inline]
    pub fn last_error_at(&self) -> Timestamp {
        Timestamp::from(self.inner.last_error_at.load(Ordering::SeqCst))
    }

    /// When the last `EVENT` was seen
    #[inline]
    pub fn last_event_at(&self) -> Timestamp {
        Timestamp::from(self.inner.last_event_at.load(Ordering::SeqCst))
    }

    /// When the last `EOSE` was seen
    #[inline]
    pub fn last_eose_at(&self) -> Timestamp {
        Timestamp::from(self.inner.last_eose_at.load(Ordering::SeqCst))
    }

    /// When the last `OK` was seen
    #[inline]
    pub fn last_ok_at(&self) -> Timestamp {
        Timestamp::from(self.inner.last_ok_at.load(Ordering::SeqCst))
    }

    /// When the last `AUTH` challenge was seen
    #[inline]
    pub fn last_auth_at(&self) -> Timestamp {
        Timestamp::from(self.inner.last_auth_at.load(Ordering::SeqCst))
    }

    pub(crate) fn new_open(&self) {
        self.inner.opened.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn new_close(&self) {
        self.inner.closed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn new_error(&self) {
        self.inner
            .last_error_at
            .store(Timestamp::now().as_u64(), Ordering::SeqCst);
    }

    pub(crate) fn seen(&self, message: &RelayMessage) {
        let now: u64 = Timestamp::now().as_u64();
        let slot: &AtomicU64 = match message {
            RelayMessage::Event { .. } => &self.inner.last_event_at,
            RelayMessage::Eose(..) => &self.inner.last_eose_at,
            RelayMessage::Ok { .. } => &self.inner.last_ok_at,
            RelayMessage::Closed { .. } => &self.inner.last_closed_msg_at,
            RelayMessage::Notice(..) => &self.inner.last_notice_at,
            RelayMessage::Auth { .. } => &self.inner.last_auth_at,
            RelayMessage::Count { .. } => &self.inner.last_count_at,
        };
        slot.store(now, Ordering::SeqCst);
    }
}
