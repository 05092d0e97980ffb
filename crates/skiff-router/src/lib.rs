// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Relay selection.
//!
//! The router is pure selection logic: given an operation and a set of
//! pluggable hooks (who knows a pubkey's relays, what the fallbacks are, how
//! good a relay is) it computes a weighted, bounded list of candidate relay
//! urls. It performs no I/O.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use std::cmp::Ordering;
use std::collections::HashMap;

use skiff::{Event, PublicKey, RelayUrl};

/// Default number of relays a scenario resolves to.
pub const DEFAULT_RELAY_LIMIT: usize = 5;

const PUBKEY_RELAY_WEIGHT: f64 = 1.0;
const MENTION_RELAY_WEIGHT: f64 = 0.5;
const HINT_RELAY_WEIGHT: f64 = 1.0;
const CONTEXT_AUTHOR_WEIGHT: f64 = 0.8;

/// Which relay list of a pubkey an operation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayMode {
    /// Relays the pubkey reads from (where to deliver to them)
    Read,
    /// Relays the pubkey writes to (where to find their content)
    Write,
}

/// Hook returning the known relays of a pubkey for the given mode.
pub type PubkeyRelaysHook = Box<dyn Fn(&PublicKey, RelayMode) -> Vec<RelayUrl> + Send + Sync>;

/// Hook returning the relays of last resort.
pub type FallbackRelaysHook = Box<dyn Fn() -> Vec<RelayUrl> + Send + Sync>;

/// Hook scoring a relay in `[0, 1]`. Relays scored `0` are dropped.
pub type RelayQualityHook = Box<dyn Fn(&RelayUrl) -> f64 + Send + Sync>;

/// Policy deciding how many fallback relays to append, given the current
/// result size and the limit.
pub type FallbackPolicy = Box<dyn Fn(usize, usize) -> usize + Send + Sync>;

/// Fill with fallbacks up to the limit.
pub fn fill_to_limit(count: usize, limit: usize) -> usize {
    limit.saturating_sub(count)
}

/// Append a single fallback only when nothing else matched.
pub fn minimal_fallbacks(count: usize, _limit: usize) -> usize {
    if count == 0 {
        1
    } else {
        0
    }
}

/// Router configuration.
pub struct RouterOptions {
    pubkey_relays: Option<PubkeyRelaysHook>,
    fallback_relays: Option<FallbackRelaysHook>,
    relay_quality: Option<RelayQualityHook>,
    fallback_policy: FallbackPolicy,
    limit: usize,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            pubkey_relays: None,
            fallback_relays: None,
            relay_quality: None,
            fallback_policy: Box::new(fill_to_limit),
            limit: DEFAULT_RELAY_LIMIT,
        }
    }
}

impl std::fmt::Debug for RouterOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterOptions")
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

impl RouterOptions {
    /// New defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pubkey relays hook
    pub fn pubkey_relays<F>(mut self, hook: F) -> Self
    where
        F: Fn(&PublicKey, RelayMode) -> Vec<RelayUrl> + Send + Sync + 'static,
    {
        self.pubkey_relays = Some(Box::new(hook));
        self
    }

    /// Set the fallback relays hook
    pub fn fallback_relays<F>(mut self, hook: F) -> Self
    where
        F: Fn() -> Vec<RelayUrl> + Send + Sync + 'static,
    {
        self.fallback_relays = Some(Box::new(hook));
        self
    }

    /// Set the relay quality hook
    pub fn relay_quality<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RelayUrl) -> f64 + Send + Sync + 'static,
    {
        self.relay_quality = Some(Box::new(hook));
        self
    }

    /// Set the fallback policy
    pub fn fallback_policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(usize, usize) -> usize + Send + Sync + 'static,
    {
        self.fallback_policy = Box::new(policy);
        self
    }

    /// Set the default relay limit
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// One weighted relay contribution inside a scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct RelaySelection {
    /// Relay url
    pub url: RelayUrl,
    /// Contribution weight
    pub weight: f64,
}

/// Relay selection router.
#[derive(Debug)]
pub struct Router {
    options: RouterOptions,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(RouterOptions::default())
    }
}

impl Router {
    /// Construct with options
    pub fn new(options: RouterOptions) -> Self {
        Self { options }
    }

    fn pubkey_relays(&self, pubkey: &PublicKey, mode: RelayMode) -> Vec<RelayUrl> {
        match &self.options.pubkey_relays {
            Some(hook) => hook(pubkey, mode),
            None => Vec::new(),
        }
    }

    fn weighted(
        &self,
        urls: Vec<RelayUrl>,
        weight: f64,
    ) -> impl Iterator<Item = RelaySelection> + '_ {
        urls.into_iter().map(move |url| RelaySelection { url, weight })
    }

    /// Build a scenario from explicit selections.
    pub fn scenario(&self, selections: Vec<RelaySelection>) -> Scenario<'_> {
        Scenario {
            router: self,
            selections,
            limit: None,
        }
    }

    /// Relays to read a user's own content from: where they write.
    pub fn read_user(&self, pubkey: &PublicKey) -> Scenario<'_> {
        let selections: Vec<RelaySelection> = self
            .weighted(
                self.pubkey_relays(pubkey, RelayMode::Write),
                PUBKEY_RELAY_WEIGHT,
            )
            .collect();
        self.scenario(selections)
    }

    /// Relays to publish an event to: the author's write relays plus, at a
    /// lower weight, the read relays of every mentioned pubkey.
    pub fn publish(&self, event: &Event) -> Scenario<'_> {
        let mut selections: Vec<RelaySelection> = self
            .weighted(
                self.pubkey_relays(&event.pubkey, RelayMode::Write),
                PUBKEY_RELAY_WEIGHT,
            )
            .collect();

        for mentioned in event.tags.public_keys() {
            selections.extend(self.weighted(
                self.pubkey_relays(&mentioned, RelayMode::Read),
                MENTION_RELAY_WEIGHT,
            ));
        }

        self.scenario(selections)
    }

    /// Relays delivering mention/inbox traffic for a pubkey: where they read.
    pub fn inbox(&self, pubkey: &PublicKey) -> Scenario<'_> {
        let selections: Vec<RelaySelection> = self
            .weighted(
                self.pubkey_relays(pubkey, RelayMode::Read),
                PUBKEY_RELAY_WEIGHT,
            )
            .collect();
        self.scenario(selections)
    }

    /// Relays for an event's ancestor/thread context: the event's own relay
    /// hints plus the author's write relays.
    pub fn context(&self, event: &Event) -> Scenario<'_> {
        let mut selections: Vec<RelaySelection> = self
            .weighted(event.tags.relay_hints().collect(), HINT_RELAY_WEIGHT)
            .collect();

        selections.extend(self.weighted(
            self.pubkey_relays(&event.pubkey, RelayMode::Write),
            CONTEXT_AUTHOR_WEIGHT,
        ));

        self.scenario(selections)
    }
}

/// A weighted relay selection for one operation.
///
/// Reduced to urls by merging duplicate urls (summing weights), sorting by
/// combined weight then quality, truncating to the limit and applying the
/// fallback policy.
#[derive(Debug)]
pub struct Scenario<'a> {
    router: &'a Router,
    selections: Vec<RelaySelection>,
    limit: Option<usize>,
}

impl<'a> Scenario<'a> {
    /// Override the router's relay limit for this scenario.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Merge another scenario's contributions into this one.
    ///
    /// This is the relay-set primitive; interpretation of empty results is
    /// the caller's policy.
    pub fn merge(mut self, other: Scenario<'_>) -> Self {
        self.selections.extend(other.selections);
        self
    }

    /// Raw weighted selections.
    pub fn selections(&self) -> &[RelaySelection] {
        &self.selections
    }

    /// Reduce to the final ordered relay list.
    pub fn urls(&self) -> Vec<RelayUrl> {
        let options: &RouterOptions = &self.router.options;
        let limit: usize = self.limit.unwrap_or(options.limit);

        // Merge duplicates, summing weights
        let mut weights: HashMap<&RelayUrl, f64> = HashMap::new();
        for selection in self.selections.iter() {
            *weights.entry(&selection.url).or_insert(0.0) += selection.weight;
        }

        let quality = |url: &RelayUrl| -> f64 {
            match &options.relay_quality {
                Some(hook) => hook(url).clamp(0.0, 1.0),
                None => 1.0,
            }
        };

        let mut scored: Vec<(&RelayUrl, f64, f64)> = weights
            .into_iter()
            .map(|(url, weight)| (url, weight, quality(url)))
            .filter(|(.., quality)| *quality > 0.0)
            .collect();

        scored.sort_by(|(a_url, a_weight, a_quality), (b_url, b_weight, b_quality)| {
            b_weight
                .partial_cmp(a_weight)
                .unwrap_or(Ordering::Equal)
                .then(b_quality.partial_cmp(a_quality).unwrap_or(Ordering::Equal))
                .then(a_url.cmp(b_url))
        });

        let mut urls: Vec<RelayUrl> = scored
            .into_iter()
            .take(limit)
            .map(|(url, ..)| url.clone())
            .collect();

        // Below the limit: let the fallback policy fill the gap
        let extra: usize = (options.fallback_policy)(urls.len(), limit);
        if extra > 0 {
            if let Some(hook) = &options.fallback_relays {
                let before: usize = urls.len();
                for url in hook() {
                    if urls.len() >= before + extra || urls.len() >= limit {
                        break;
                    }
                    if !urls.contains(&url) {
                        urls.push(url);
                    }
                }

                if urls.len() > before {
                    tracing::debug!(
                        added = urls.len() - before,
                        "Filled relay selection with fallbacks."
                    );
                }
            }
        }

        urls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> RelayUrl {
        RelayUrl::parse(s).unwrap()
    }

    fn pk(byte: u8) -> PublicKey {
        PublicKey::from_bytes([byte; 32])
    }

    fn selection(s: &str, weight: f64) -> RelaySelection {
        RelaySelection {
            url: url(s),
            weight,
        }
    }

    #[test]
    fn test_merges_duplicates_and_sorts_by_weight() {
        let router = Router::default();
        let scenario = router.scenario(vec![
            selection("wss://a.example", 0.5),
            selection("wss://b.example", 0.8),
            selection("wss://a.example", 0.5),
        ]);

        // a sums to 1.0 and outranks b
        assert_eq!(
            scenario.urls(),
            vec![url("wss://a.example"), url("wss://b.example")]
        );
    }

    #[test]
    fn test_quality_breaks_ties_and_drops_zero() {
        let router = Router::new(RouterOptions::new().relay_quality(|url| {
            match url.as_str() {
                "wss://good.example" => 0.9,
                "wss://bad.example" => 0.2,
                _ => 0.0,
            }
        }));

        let scenario = router.scenario(vec![
            selection("wss://bad.example", 1.0),
            selection("wss://good.example", 1.0),
            selection("wss://dead.example", 1.0),
        ]);

        assert_eq!(
            scenario.urls(),
            vec![url("wss://good.example"), url("wss://bad.example")]
        );
    }

    #[test]
    fn test_truncates_to_limit() {
        let router = Router::default();
        let scenario = router
            .scenario(vec![
                selection("wss://a.example", 3.0),
                selection("wss://b.example", 2.0),
                selection("wss://c.example", 1.0),
            ])
            .limit(2);

        assert_eq!(
            scenario.urls(),
            vec![url("wss://a.example"), url("wss://b.example")]
        );
    }

    #[test]
    fn test_fallback_fills_to_limit() {
        // Two low-quality primaries, limit 3, one fallback available:
        // exactly 3 urls, including the fallback.
        let router = Router::new(
            RouterOptions::new()
                .limit(3)
                .relay_quality(|_| 0.1)
                .fallback_relays(|| vec![RelayUrl::parse("wss://fallback.example").unwrap()]),
        );

        let scenario = router.scenario(vec![
            selection("wss://a.example", 1.0),
            selection("wss://b.example", 1.0),
        ]);

        let urls = scenario.urls();
        assert_eq!(urls.len(), 3);
        assert!(urls.contains(&url("wss://fallback.example")));
    }

    #[test]
    fn test_fallback_skips_duplicates_and_respects_policy() {
        let router = Router::new(
            RouterOptions::new()
                .limit(3)
                .fallback_policy(minimal_fallbacks)
                .fallback_relays(|| vec![RelayUrl::parse("wss://fallback.example").unwrap()]),
        );

        // Non-empty result: minimal policy adds nothing
        let scenario = router.scenario(vec![selection("wss://a.example", 1.0)]);
        assert_eq!(scenario.urls(), vec![url("wss://a.example")]);

        // Empty result: one fallback
        let scenario = router.scenario(vec![]);
        assert_eq!(scenario.urls(), vec![url("wss://fallback.example")]);
    }

    #[test]
    fn test_read_user_uses_write_relays() {
        let alice = pk(1);
        let router = Router::new(RouterOptions::new().pubkey_relays(move |_, mode| match mode {
            RelayMode::Write => vec![RelayUrl::parse("wss://write.example").unwrap()],
            RelayMode::Read => vec![RelayUrl::parse("wss://read.example").unwrap()],
        }));

        assert_eq!(router.read_user(&alice).urls(), vec![url("wss://write.example")]);
        assert_eq!(router.inbox(&alice).urls(), vec![url("wss://read.example")]);
    }

    #[test]
    fn test_merge_is_a_set_primitive() {
        let router = Router::default();
        let merged = router
            .scenario(vec![selection("wss://a.example", 0.4)])
            .merge(router.scenario(vec![selection("wss://a.example", 0.4)]));

        assert_eq!(merged.selections().len(), 2);
        assert_eq!(merged.urls(), vec![url("wss://a.example")]);
    }
}
