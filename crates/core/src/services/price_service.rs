use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::errors::CoreError;
use crate::models::price::{CacheEntry, PriceCache, PriceQuote};
use crate::models::settings::Settings;
use crate::models::token::TokenSearchResult;
use crate::providers::traits::PriceProvider;

/// Token search and price lookup with session caching.
///
/// Cache strategy:
/// - A cached quote younger than the TTL is served without a network call,
///   except through `refresh_prices`, which always asks the provider.
/// - Everything else is fetched in one batched provider request and cached.
/// - When the provider rate-limits, stale cached quotes are served instead of
///   failing, as long as every requested id has one.
///
/// The cache lock is never held across an `.await`.
pub struct PriceService {
    provider: Arc<dyn PriceProvider>,
    cache: Mutex<PriceCache>,
    min_query_len: usize,
}

impl PriceService {
    pub fn new(provider: Arc<dyn PriceProvider>, settings: &Settings) -> Self {
        Self {
            provider,
            cache: Mutex::new(PriceCache::with_ttl(settings.cache_ttl())),
            min_query_len: settings.min_query_len,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Search tokens by free text. Queries shorter than the minimum length are
    /// rejected before reaching the provider.
    pub async fn search_tokens(&self, query: &str) -> Result<Vec<TokenSearchResult>, CoreError> {
        let actual = query.chars().count();
        if actual < self.min_query_len {
            return Err(CoreError::QueryTooShort {
                min: self.min_query_len,
                actual,
            });
        }

        self.provider.search(query).await.map_err(|e| match e {
            CoreError::RateLimited { .. } | CoreError::SearchFailed(_) => e,
            other => CoreError::SearchFailed(other.to_string()),
        })
    }

    /// Quote for a single token id.
    pub async fn get_price(&self, token_id: &str) -> Result<PriceQuote, CoreError> {
        let quotes = self.get_prices(&[token_id.to_string()]).await?;
        quotes
            .get(token_id)
            .copied()
            .ok_or_else(|| CoreError::PriceUnavailable(token_id.to_string()))
    }

    /// Quotes for a set of token ids. Ids the provider has no price for are
    /// absent from the result; that is not an error.
    pub async fn get_prices(
        &self,
        token_ids: &[String],
    ) -> Result<HashMap<String, PriceQuote>, CoreError> {
        self.resolve(token_ids, true).await
    }

    /// Like `get_prices` but fetches every id, valid cache entries included.
    /// Stale entries still stand in when the provider rate-limits.
    pub async fn refresh_prices(
        &self,
        token_ids: &[String],
    ) -> Result<HashMap<String, PriceQuote>, CoreError> {
        self.resolve(token_ids, false).await
    }

    async fn resolve(
        &self,
        token_ids: &[String],
        use_cache: bool,
    ) -> Result<HashMap<String, PriceQuote>, CoreError> {
        let mut quotes = HashMap::new();
        let mut missing: Vec<String> = Vec::new();

        {
            let now = Utc::now();
            let cache = self.lock_cache();
            for id in token_ids {
                if quotes.contains_key(id) || missing.contains(id) {
                    continue;
                }
                match cache.get_valid(id, now).filter(|_| use_cache) {
                    Some(entry) => {
                        quotes.insert(id.clone(), entry.quote);
                    }
                    None => missing.push(id.clone()),
                }
            }
        }

        if missing.is_empty() {
            debug!(count = quotes.len(), "all prices served from cache");
            return Ok(quotes);
        }

        match self.provider.get_prices(&missing).await {
            Ok(fetched) => {
                let mut cache = self.lock_cache();
                for id in &missing {
                    match fetched.get(id) {
                        Some(quote) => {
                            cache.put(id, *quote);
                            quotes.insert(id.clone(), *quote);
                        }
                        None => debug!(id = %id, "no price data in provider response"),
                    }
                }
                Ok(quotes)
            }
            Err(e) if e.is_rate_limited() => {
                let cache = self.lock_cache();
                let stale: Option<Vec<(String, PriceQuote)>> = missing
                    .iter()
                    .map(|id| cache.get(id).map(|entry| (id.clone(), entry.quote)))
                    .collect();
                match stale {
                    Some(stale) => {
                        warn!(
                            provider = self.provider.name(),
                            count = stale.len(),
                            "rate limited, serving stale cached prices"
                        );
                        quotes.extend(stale);
                        Ok(quotes)
                    }
                    None => Err(e),
                }
            }
            Err(CoreError::PriceFetchFailed(msg)) => Err(CoreError::PriceFetchFailed(msg)),
            Err(other) => Err(CoreError::PriceFetchFailed(other.to_string())),
        }
    }

    /// Cached entry of any age for `token_id`.
    pub fn cached(&self, token_id: &str) -> Option<CacheEntry> {
        self.lock_cache().get(token_id).copied()
    }

    /// Seed or overwrite a cache entry (imports, tests).
    pub fn cache_quote_at(
        &self,
        token_id: &str,
        quote: PriceQuote,
        fetched_at: chrono::DateTime<Utc>,
    ) {
        self.lock_cache().put_at(token_id, quote, fetched_at);
    }

    pub fn cache_len(&self) -> usize {
        self.lock_cache().len()
    }

    pub fn clear_cache(&self) {
        self.lock_cache().clear();
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, PriceCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}
