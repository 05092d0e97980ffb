// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Tracker
//!
//! Maps event id → the relays that delivered it. Used to deduplicate events
//! arriving from several relays and to answer "who has seen this event".
//! Grows monotonically, bounded by an LRU cap.

use std::collections::HashSet;
use std::num::NonZeroUsize;

use lru::LruCache;
use skiff::{EventId, RelayUrl};

/// Event-id → relay-set tracker.
#[derive(Debug)]
pub struct Tracker {
    seen: LruCache<EventId, HashSet<RelayUrl>>,
}

impl Tracker {
    /// Construct with an LRU bound.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            seen: LruCache::new(capacity),
        }
    }

    /// Record that `relay` delivered `id`.
    ///
    /// Returns `true` the first time the id is seen from any relay: the
    /// caller should deliver the event exactly then.
    pub fn track(&mut self, id: EventId, relay: &RelayUrl) -> bool {
        match self.seen.get_mut(&id) {
            Some(relays) => {
                relays.insert(relay.clone());
                false
            }
            None => {
                let mut relays: HashSet<RelayUrl> = HashSet::new();
                relays.insert(relay.clone());
                self.seen.put(id, relays);
                true
            }
        }
    }

    /// Check if the id was seen from any relay.
    #[inline]
    pub fn has_seen(&self, id: &EventId) -> bool {
        self.seen.contains(id)
    }

    /// The relays known to have the event.
    pub fn seen_by(&self, id: &EventId) -> Vec<RelayUrl> {
        match self.seen.peek(id) {
            Some(relays) => relays.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Number of tracked ids.
    #[inline]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Check if nothing is tracked.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> RelayUrl {
        RelayUrl::parse(s).unwrap()
    }

    #[test]
    fn test_first_sighting_only() {
        let mut tracker = Tracker::new(NonZeroUsize::new(16).unwrap());
        let id = EventId::all_zeros();

        assert!(tracker.track(id, &url("wss://a.example")));
        assert!(!tracker.track(id, &url("wss://b.example")));
        assert!(!tracker.track(id, &url("wss://a.example")));

        let mut seen_by = tracker.seen_by(&id);
        seen_by.sort();
        assert_eq!(seen_by, vec![url("wss://a.example"), url("wss://b.example")]);
    }

    #[test]
    fn test_lru_bound() {
        let mut tracker = Tracker::new(NonZeroUsize::new(2).unwrap());
        let relay = url("wss://a.example");

        for byte in 0..3u8 {
            tracker.track(EventId::from_bytes([byte; 32]), &relay);
        }

        assert_eq!(tracker.len(), 2);
        // The oldest entry was pruned: its event would be delivered again
        assert!(!tracker.has_seen(&EventId::from_bytes([0; 32])));
        assert!(tracker.has_seen(&EventId::from_bytes([2; 32])));
    }
}
