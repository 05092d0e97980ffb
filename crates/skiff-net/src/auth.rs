// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Per-connection challenge/response authentication state.
//!
//! Messages a relay refuses with `auth-required:` wait in a FIFO queue and
//! are released once the challenge round-trip succeeds, or dropped when the
//! authentication window elapses or the relay rejects the auth event.

use core::fmt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use skiff::{ClientMessage, EventId};
use tokio::time::Instant;

/// Authentication status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    /// No challenge received
    Unauthenticated = 0,
    /// The relay sent a challenge
    Challenged = 1,
    /// The signed auth event is in flight
    Authenticating = 2,
    /// The relay accepted the auth event
    Authenticated = 3,
    /// The relay rejected the auth event, or no signer is available
    Failed = 4,
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "Unauthenticated"),
            Self::Challenged => write!(f, "Challenged"),
            Self::Authenticating => write!(f, "Authenticating"),
            Self::Authenticated => write!(f, "Authenticated"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct ConnectionAuth {
    status: AtomicU8,
    challenge: Mutex<Option<String>>,
    auth_event_id: Mutex<Option<EventId>>,
    pending: Mutex<VecDeque<(ClientMessage, Instant)>>,
    timeout: Duration,
}

impl ConnectionAuth {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            status: AtomicU8::new(AuthStatus::Unauthenticated as u8),
            challenge: Mutex::new(None),
            auth_event_id: Mutex::new(None),
            pending: Mutex::new(VecDeque::new()),
            timeout,
        }
    }

    pub(crate) fn status(&self) -> AuthStatus {
        match self.status.load(Ordering::SeqCst) {
            0 => AuthStatus::Unauthenticated,
            1 => AuthStatus::Challenged,
            2 => AuthStatus::Authenticating,
            3 => AuthStatus::Authenticated,
            4 => AuthStatus::Failed,
            _ => unreachable!(),
        }
    }

    fn set_status(&self, status: AuthStatus) {
        self.status.store(status as u8, Ordering::SeqCst);
    }

    /// The relay sent (a new) challenge. Re-authentication is allowed from
    /// any state.
    pub(crate) fn challenged(&self, challenge: &str) {
        let mut slot = self
            .challenge
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(challenge.to_string());
        self.set_status(AuthStatus::Challenged);
    }

    /// The signed auth event went out.
    pub(crate) fn authenticating(&self, auth_event_id: EventId) {
        let mut slot = self
            .auth_event_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(auth_event_id);
        self.set_status(AuthStatus::Authenticating);
    }

    /// Check if an `OK` refers to the in-flight auth event.
    pub(crate) fn is_auth_event(&self, event_id: &EventId) -> bool {
        let slot = self
            .auth_event_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        slot.as_ref() == Some(event_id)
    }

    /// The relay accepted the auth event. Returns the gated messages to
    /// release, in arrival order, minus any that waited past the timeout.
    pub(crate) fn authenticated(&self) -> Vec<ClientMessage> {
        self.set_status(AuthStatus::Authenticated);

        let now: Instant = Instant::now();
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending
            .drain(..)
            .filter(|(.., queued_at)| now.duration_since(*queued_at) < self.timeout)
            .map(|(message, ..)| message)
            .collect()
    }

    /// The relay rejected the auth event, or no signer exists. Gated
    /// messages are dropped; their operations fail through their own
    /// timeouts/status.
    pub(crate) fn failed(&self) {
        self.set_status(AuthStatus::Failed);
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.clear();
    }

    /// Queue a message the relay gated behind authentication.
    pub(crate) fn push_pending(&self, message: ClientMessage) {
        let now: Instant = Instant::now();
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        // Drop entries that outlived the authentication window
        pending.retain(|(.., queued_at)| now.duration_since(*queued_at) < self.timeout);
        pending.push_back((message, now));
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use skiff::SubscriptionId;

    use super::*;

    #[test]
    fn test_state_machine_and_fifo_release() {
        let auth = ConnectionAuth::new(Duration::from_secs(30));
        assert_eq!(auth.status(), AuthStatus::Unauthenticated);

        auth.challenged("abc");
        assert_eq!(auth.status(), AuthStatus::Challenged);

        auth.push_pending(ClientMessage::close(SubscriptionId::new("first")));
        auth.push_pending(ClientMessage::close(SubscriptionId::new("second")));

        auth.authenticating(EventId::all_zeros());
        assert!(auth.is_auth_event(&EventId::all_zeros()));
        assert_eq!(auth.status(), AuthStatus::Authenticating);

        let released = auth.authenticated();
        assert_eq!(auth.status(), AuthStatus::Authenticated);
        assert_eq!(released.len(), 2);
        match &released[0] {
            ClientMessage::Close(id) => assert_eq!(id.as_str(), "first"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_failure_drops_pending() {
        let auth = ConnectionAuth::new(Duration::from_secs(30));
        auth.challenged("abc");
        auth.push_pending(ClientMessage::close(SubscriptionId::new("gated")));
        auth.failed();
        assert_eq!(auth.status(), AuthStatus::Failed);
        assert_eq!(auth.pending_len(), 0);
        assert_eq!(auth.authenticated().len(), 0);
    }
}
