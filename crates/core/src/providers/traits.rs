use async_trait::async_trait;
use std::collections::HashMap;

use crate::errors::CoreError;
use crate::models::price::PriceQuote;
use crate::models::token::TokenSearchResult;

/// Raw access to a price data provider.
///
/// Implementations only speak the wire protocol: they map HTTP 429 to
/// `CoreError::RateLimited` and leave caching, stale fallback and
/// query validation to `PriceService`.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait PriceProvider: Send + Sync {
    /// Human-readable name of this provider (for logs/errors).
    fn name(&self) -> &str;

    /// Free-text token search. Results keep the provider's ranking.
    async fn search(&self, query: &str) -> Result<Vec<TokenSearchResult>, CoreError>;

    /// USD quotes for a set of token ids in a single request.
    /// Ids the provider does not know are simply absent from the map.
    async fn get_prices(&self, ids: &[String]) -> Result<HashMap<String, PriceQuote>, CoreError>;
}
