use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default validity window of a cached price.
pub const DEFAULT_CACHE_TTL_SECS: i64 = 5 * 60;

/// A USD price and its signed 24h change percentage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price: f64,
    pub change_24h: Option<f64>,
}

impl PriceQuote {
    pub fn new(price: f64, change_24h: Option<f64>) -> Self {
        Self { price, change_24h }
    }
}

/// A memoized quote and the moment it was fetched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheEntry {
    pub quote: PriceQuote,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    /// An entry is valid while `now - fetched_at < ttl`.
    pub fn is_valid_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.signed_duration_since(self.fetched_at) < ttl
    }

    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.fetched_at)
    }
}

/// Session-scoped price memoization keyed by provider token id.
///
/// Never persisted. `get` returns entries of any age so callers can fall back
/// to stale data when the provider throttles; `get_valid` only returns entries
/// still inside the validity window.
#[derive(Debug, Clone)]
pub struct PriceCache {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
}

impl Default for PriceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceCache {
    pub fn new() -> Self {
        Self::with_ttl(Duration::seconds(DEFAULT_CACHE_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Any cached entry for `token_id`, regardless of age.
    pub fn get(&self, token_id: &str) -> Option<&CacheEntry> {
        self.entries.get(token_id)
    }

    /// The cached entry for `token_id` only if it is still valid at `now`.
    pub fn get_valid(&self, token_id: &str, now: DateTime<Utc>) -> Option<&CacheEntry> {
        self.entries
            .get(token_id)
            .filter(|e| e.is_valid_at(now, self.ttl))
    }

    /// Store a quote stamped with the current time.
    pub fn put(&mut self, token_id: &str, quote: PriceQuote) {
        self.put_at(token_id, quote, Utc::now());
    }

    /// Store a quote with an explicit fetch time (used for imports and tests).
    pub fn put_at(&mut self, token_id: &str, quote: PriceQuote, fetched_at: DateTime<Utc>) {
        self.entries
            .insert(token_id.to_string(), CacheEntry { quote, fetched_at });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
