// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Default values

use std::num::NonZeroUsize;
use std::time::Duration;

/// Timeout for establishing a transport connection
pub(crate) const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(20);

/// Per-relay completion timeout for `close_on_eose` subscriptions
pub(crate) const DEFAULT_SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-relay timeout waiting for an `OK` after sending an event
pub(crate) const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Window for completing a challenge/response authentication
pub(crate) const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(30);

/// Ceiling on concurrently open connections
pub(crate) const DEFAULT_MAX_CONNECTIONS: usize = 50;

/// Tracker LRU bound
pub(crate) const DEFAULT_TRACKER_CAPACITY: NonZeroUsize = match NonZeroUsize::new(8_192) {
    Some(capacity) => capacity,
    None => unreachable!(),
};

/// Connection notification channel size
pub(crate) const NOTIFICATION_CHANNEL_SIZE: usize = 4_096;
