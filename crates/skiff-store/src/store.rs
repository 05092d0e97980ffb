// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;

use btreecap::{BTreeCapSet, Capacity, Insert, OverCapacityPolicy};
use skiff::{Address, Event, EventId, Filter, Kind, PublicKey, SingleLetterTag, Timestamp};

use crate::error::Error;
use crate::{RejectedReason, SaveStatus};

type StoredEvent = Arc<Event>;

/// Synchronous indexed store. [`Repository`](crate::Repository) wraps it in a
/// lock and adds the observer machinery.
#[derive(Debug, Default)]
pub(crate) struct EventStore {
    /// Every stored record, newest first, tombstoned included
    events: BTreeCapSet<StoredEvent>,
    /// Records by id, tombstoned included
    ids: HashMap<EventId, StoredEvent>,
    /// Non-tombstoned records by author
    author_index: HashMap<PublicKey, BTreeSet<StoredEvent>>,
    /// Non-tombstoned records by kind
    kind_index: HashMap<Kind, BTreeSet<StoredEvent>>,
    /// Non-tombstoned records by single-letter tag value
    tag_index: HashMap<(SingleLetterTag, String), BTreeSet<StoredEvent>>,
    /// Current record per replaceable/addressable identity
    address_index: HashMap<Address, StoredEvent>,
    /// Tombstoned ids, including ids never seen
    deleted_ids: HashSet<EventId>,
    /// Tombstoned identities with the deletion timestamp
    deleted_addresses: HashMap<Address, Timestamp>,
}

impl EventStore {
    pub(crate) fn unbounded() -> Self {
        Self::default()
    }

    pub(crate) fn bounded(max: NonZeroUsize) -> Self {
        let mut store: Self = Self::default();
        store.events.change_capacity(Capacity::Bounded {
            max,
            policy: OverCapacityPolicy::Last,
        });
        store
    }

    /// Index an event.
    ///
    /// Consistency rejections come back as [`SaveStatus::Rejected`]; only
    /// structurally invalid input is an error, and it is checked before any
    /// index is touched.
    pub(crate) fn index_event(&mut self, event: &Event) -> Result<SaveStatus, Error> {
        if event.kind.is_ephemeral() {
            return Ok(SaveStatus::Rejected(RejectedReason::Ephemeral));
        }

        if event.kind.is_addressable() && event.identifier().is_none() {
            return Err(Error::MissingIdentifier);
        }

        if self.ids.contains_key(&event.id) {
            return Ok(SaveStatus::Rejected(RejectedReason::Duplicate));
        }

        if self.deleted_ids.contains(&event.id) {
            return Ok(SaveStatus::Rejected(RejectedReason::Deleted));
        }

        if let Some(address) = event.address() {
            if self.is_address_deleted(&address, &event.created_at) {
                return Ok(SaveStatus::Rejected(RejectedReason::Deleted));
            }

            if let Some(current) = self.address_index.get(&address) {
                if supersedes(current, event) {
                    return Ok(SaveStatus::Rejected(RejectedReason::Replaced));
                }

                // The incoming event wins: the superseded record is dropped
                // entirely, the supersession rule itself rejects late re-adds.
                let current: StoredEvent = current.clone();
                self.remove_record(&current);
            }
        }

        if event.kind == Kind::DELETION {
            if let Some(rejection) = self.process_deletion(event) {
                return Ok(rejection);
            }
        }

        let record: StoredEvent = Arc::new(event.clone());
        let Insert { inserted, pop } = self.events.insert(record.clone());

        if inserted {
            self.ids.insert(record.id, record.clone());
            self.index_record(&record);
        }

        // Capacity overflow evicts the oldest record
        if let Some(evicted) = pop {
            self.ids.remove(&evicted.id);
            self.deindex_record(&evicted);
        }

        Ok(SaveStatus::Saved)
    }

    /// Apply a deletion event's `e` and `a` targets.
    ///
    /// Validation runs before any mutation so a rejected deletion is never
    /// partially applied.
    fn process_deletion(&mut self, event: &Event) -> Option<SaveStatus> {
        let target_ids: Vec<EventId> = event.tags.event_ids().collect();
        let target_addresses: Vec<Address> = event.tags.addresses().collect();

        for id in target_ids.iter() {
            if let Some(target) = self.ids.get(id) {
                if target.pubkey != event.pubkey {
                    return Some(SaveStatus::Rejected(RejectedReason::InvalidDelete));
                }
            }
        }

        for address in target_addresses.iter() {
            if address.public_key != event.pubkey {
                return Some(SaveStatus::Rejected(RejectedReason::InvalidDelete));
            }
        }

        for id in target_ids {
            // A target newer than the deletion survives it
            let applies: bool = self
                .ids
                .get(&id)
                .map_or(true, |target| target.created_at <= event.created_at);
            if applies {
                self.tombstone(id);
            }
        }

        for address in target_addresses {
            self.deleted_addresses
                .entry(address.clone())
                .and_modify(|t| {
                    if event.created_at > *t {
                        *t = event.created_at;
                    }
                })
                .or_insert(event.created_at);

            if let Some(current) = self.address_index.get(&address) {
                if current.created_at <= event.created_at {
                    let id: EventId = current.id;
                    self.tombstone(id);
                }
            }
        }

        None
    }

    /// Mark an id tombstoned. The record, if present, leaves every index but
    /// stays stored, so `dump` keeps it and late re-adds stay rejected.
    fn tombstone(&mut self, id: EventId) {
        self.deleted_ids.insert(id);
        if let Some(record) = self.ids.get(&id).cloned() {
            self.deindex_record(&record);
        }
    }

    /// Drop a record entirely (superseded replaceable/addressable events).
    fn remove_record(&mut self, record: &StoredEvent) {
        self.events.remove(record);
        self.ids.remove(&record.id);
        self.deindex_record(record);
    }

    fn index_record(&mut self, record: &StoredEvent) {
        self.author_index
            .entry(record.pubkey)
            .or_default()
            .insert(record.clone());
        self.kind_index
            .entry(record.kind)
            .or_default()
            .insert(record.clone());

        for (letter, values) in record.tags.indexes() {
            for value in values {
                self.tag_index
                    .entry((letter, value))
                    .or_default()
                    .insert(record.clone());
            }
        }

        if let Some(address) = record.address() {
            self.address_index.insert(address, record.clone());
        }
    }

    fn deindex_record(&mut self, record: &StoredEvent) {
        if let Some(set) = self.author_index.get_mut(&record.pubkey) {
            set.remove(record);
        }

        if let Some(set) = self.kind_index.get_mut(&record.kind) {
            set.remove(record);
        }

        for (letter, values) in record.tags.indexes() {
            for value in values {
                if let Some(set) = self.tag_index.get_mut(&(letter, value)) {
                    set.remove(record);
                }
            }
        }

        if let Some(address) = record.address() {
            let is_current: bool = self
                .address_index
                .get(&address)
                .map_or(false, |current| current.id == record.id);
            if is_current {
                self.address_index.remove(&address);
            }
        }
    }

    /// Query one filter: non-tombstoned matches (unless `include_deleted`),
    /// newest first, truncated to the filter's own limit.
    pub(crate) fn query<'a>(&'a self, filter: &Filter, include_deleted: bool) -> Vec<&'a Event> {
        if let (Some(since), Some(until)) = (filter.since, filter.until) {
            if since > until {
                return Vec::new();
            }
        }

        let candidates: Option<BTreeSet<&StoredEvent>> =
            self.select_candidates(filter, include_deleted);

        let matches = |record: &&StoredEvent| -> bool {
            (include_deleted || !self.deleted_ids.contains(&record.id))
                && filter.match_event(record)
        };

        let limit: usize = filter.limit.unwrap_or(usize::MAX);

        match candidates {
            Some(set) => set
                .into_iter()
                .filter(matches)
                .take(limit)
                .map(|record| record.as_ref())
                .collect(),
            None => self
                .events
                .iter()
                .filter(matches)
                .take(limit)
                .map(|record| record.as_ref())
                .collect(),
        }
    }

    /// Pick the narrowest index that can serve the filter; `None` means a
    /// full scan.
    ///
    /// Tombstoned records live only in the full set, so `include_deleted`
    /// queries always scan.
    fn select_candidates<'a>(
        &'a self,
        filter: &Filter,
        include_deleted: bool,
    ) -> Option<BTreeSet<&'a StoredEvent>> {
        if include_deleted {
            return None;
        }

        if let Some(ids) = &filter.ids {
            if !ids.is_empty() {
                return Some(ids.iter().filter_map(|id| self.ids.get(id)).collect());
            }
        }

        if let Some(authors) = &filter.authors {
            if !authors.is_empty() {
                let mut set: BTreeSet<&StoredEvent> = BTreeSet::new();
                for author in authors.iter() {
                    if let Some(index) = self.author_index.get(author) {
                        set.extend(index.iter());
                    }
                }
                return Some(set);
            }
        }

        if let Some((letter, values)) = filter.generic_tags.iter().next() {
            if !values.is_empty() {
                let mut set: BTreeSet<&StoredEvent> = BTreeSet::new();
                for value in values.iter() {
                    if let Some(index) = self.tag_index.get(&(*letter, value.clone())) {
                        set.extend(index.iter());
                    }
                }
                return Some(set);
            }
        }

        if let Some(kinds) = &filter.kinds {
            if !kinds.is_empty() {
                let mut set: BTreeSet<&StoredEvent> = BTreeSet::new();
                for kind in kinds.iter() {
                    if let Some(index) = self.kind_index.get(kind) {
                        set.extend(index.iter());
                    }
                }
                return Some(set);
            }
        }

        None
    }

    pub(crate) fn count(&self, filter: &Filter, include_deleted: bool) -> usize {
        self.query(filter, include_deleted).len()
    }

    #[inline]
    pub(crate) fn event_by_id(&self, id: &EventId) -> Option<&Event> {
        self.ids.get(id).map(|record| record.as_ref())
    }

    #[inline]
    pub(crate) fn has_event(&self, id: &EventId) -> bool {
        self.ids.contains_key(id)
    }

    #[inline]
    pub(crate) fn is_deleted(&self, id: &EventId) -> bool {
        self.deleted_ids.contains(id)
    }

    /// Check whether an identity was tombstoned at or after `timestamp`.
    pub(crate) fn is_address_deleted(&self, address: &Address, timestamp: &Timestamp) -> bool {
        match self.deleted_addresses.get(address) {
            Some(deleted_at) => deleted_at >= timestamp,
            None => false,
        }
    }

    /// Every stored record, tombstoned included, newest first.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|record| record.as_ref())
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    pub(crate) fn clear(&mut self) {
        let capacity: Capacity = self.events.capacity();
        *self = Self::default();
        self.events.change_capacity(capacity);
    }
}

/// Check if the stored event takes precedence over the incoming one for the
/// same identity: greater `created_at` wins, ties break to the greater id.
#[inline]
fn supersedes(stored: &Event, incoming: &Event) -> bool {
    match stored.created_at.cmp(&incoming.created_at) {
        Ordering::Greater => true,
        Ordering::Equal => stored.id > incoming.id,
        Ordering::Less => false,
    }
}
