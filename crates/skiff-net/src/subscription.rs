// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Subscription engine surface types and the per-relay watcher.
//!
//! A logical subscription fans out one wire REQ per target relay under a
//! single locally generated id. Updates arrive on an ordered channel; relay
//! failures are reported there too, they never abort the subscription as a
//! whole.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use skiff::{
    Event, Filter, MachineReadablePrefix, RelayMessage, RelayUrl, SubscriptionId,
};
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::connection::{Connection, ConnectionEvent};

/// Subscription options.
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    /// Target relays; filled by the router when omitted
    pub relays: Option<Vec<RelayUrl>>,
    /// Complete once every targeted relay reached EOSE, errored or timed out
    pub close_on_eose: bool,
    /// Per-relay completion timeout (engine default when `None`)
    pub timeout: Option<Duration>,
    /// Window granted to a relay demanding authentication (engine default
    /// when `None`)
    pub auth_timeout: Option<Duration>,
}

impl SubscribeOptions {
    /// New defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target relays
    pub fn relays<I>(mut self, relays: I) -> Self
    where
        I: IntoIterator<Item = RelayUrl>,
    {
        self.relays = Some(relays.into_iter().collect());
        self
    }

    /// Set close-on-EOSE completion
    pub fn close_on_eose(mut self, close_on_eose: bool) -> Self {
        self.close_on_eose = close_on_eose;
        self
    }

    /// Set the per-relay timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the authentication window
    pub fn auth_timeout(mut self, auth_timeout: Duration) -> Self {
        self.auth_timeout = Some(auth_timeout);
        self
    }
}

/// Why a relay stopped contributing to a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayDoneReason {
    /// The relay sent all stored events; live events may still follow
    Eose,
    /// The relay closed the subscription
    Closed(String),
    /// The connection failed
    Error,
    /// The per-relay timeout elapsed
    Timeout,
}

/// One update on a subscription's channel.
#[derive(Debug, Clone)]
pub enum SubscriptionUpdate {
    /// A matching event; `relay` is `None` for repository-served events
    Event {
        /// Delivering relay
        relay: Option<RelayUrl>,
        /// The event
        event: Event,
    },
    /// A relay finished or failed; never fatal to the subscription
    RelayDone {
        /// The relay
        relay: RelayUrl,
        /// Why it is done
        reason: RelayDoneReason,
    },
    /// Fired exactly once when every targeted relay is done
    /// (`close_on_eose` only)
    Complete,
}

/// Idempotent cancellation handle shared by a subscription's tasks.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionCloser {
    closed: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl SubscriptionCloser {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// Check if cancellation was requested.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait for cancellation.
    pub(crate) async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }
}

/// A live logical subscription.
#[derive(Debug)]
pub struct Subscription {
    pub(crate) id: SubscriptionId,
    pub(crate) updates: Receiver<SubscriptionUpdate>,
    pub(crate) closer: SubscriptionCloser,
}

impl Subscription {
    /// The wire subscription id shared by every targeted relay.
    #[inline]
    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    /// Receive the next update. `None` after the subscription ended.
    pub async fn recv(&mut self) -> Option<SubscriptionUpdate> {
        self.updates.recv().await
    }

    /// A cloneable handle to cancel this subscription from elsewhere.
    pub fn closer(&self) -> SubscriptionCloser {
        self.closer.clone()
    }

    /// Cancel: sends CLOSE to every relay still open for this subscription
    /// and unregisters the handlers. Idempotent.
    pub fn close(&self) {
        self.closer.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.closer.close();
    }
}

pub(crate) enum IntakeItem {
    Event(RelayUrl, Event),
    Done(RelayUrl, RelayDoneReason),
}

/// Watch one relay for one subscription: forward its matching events and
/// report exactly one terminal [`IntakeItem::Done`] unless the intake closes
/// first.
pub(crate) async fn relay_watcher(
    connection: Connection,
    id: SubscriptionId,
    filters: Vec<Filter>,
    close_on_eose: bool,
    timeout: Option<Duration>,
    auth_timeout: Duration,
    intake: Sender<IntakeItem>,
) {
    let url: RelayUrl = connection.url().clone();

    // Listen before sending the REQ so no reply can be missed
    let mut notifications = connection.notifications();
    connection.subscribe(id.clone(), filters);

    let mut deadline: Option<Instant> = timeout.map(|timeout| Instant::now() + timeout);
    let mut auth_gated: bool = false;

    loop {
        let event = tokio::select! {
            // The intake loop went away; nothing left to report to
            _ = intake.closed() => return,
            _ = sleep_until_opt(deadline) => {
                let _ = intake.send(IntakeItem::Done(url, RelayDoneReason::Timeout)).await;
                return;
            }
            event = notifications.recv() => event,
        };

        match event {
            Ok(ConnectionEvent::Message(message)) => match message {
                RelayMessage::Event {
                    subscription_id,
                    event,
                } if subscription_id == id => {
                    let _ = intake.send(IntakeItem::Event(url.clone(), *event)).await;
                }
                RelayMessage::Eose(subscription_id) if subscription_id == id => {
                    let _ = intake
                        .send(IntakeItem::Done(url.clone(), RelayDoneReason::Eose))
                        .await;
                    if close_on_eose {
                        return;
                    }
                }
                RelayMessage::Closed {
                    subscription_id,
                    message,
                } if subscription_id == id => {
                    if MachineReadablePrefix::parse(&message)
                        == Some(MachineReadablePrefix::AuthRequired)
                    {
                        // The connection replays the REQ after the challenge
                        // round-trip; grant it the authentication window
                        auth_gated = true;
                        if let Some(deadline) = deadline.as_mut() {
                            *deadline = (*deadline).max(Instant::now() + auth_timeout);
                        }
                    } else {
                        let _ = intake
                            .send(IntakeItem::Done(url, RelayDoneReason::Closed(message)))
                            .await;
                        return;
                    }
                }
                _ => {}
            },
            Ok(ConnectionEvent::AuthFailed) if auth_gated => {
                let _ = intake.send(IntakeItem::Done(url, RelayDoneReason::Error)).await;
                return;
            }
            Ok(ConnectionEvent::Status(status)) if status.is_disconnected() => {
                let _ = intake.send(IntakeItem::Done(url, RelayDoneReason::Error)).await;
                return;
            }
            Ok(..) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(url = %url, skipped = %skipped, "Subscription watcher lagged.");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                let _ = intake.send(IntakeItem::Done(url, RelayDoneReason::Error)).await;
                return;
            }
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
