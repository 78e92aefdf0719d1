use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::CoreError;
use crate::models::settings::Settings;
use crate::models::token::TokenSearchResult;
use crate::services::price_service::PriceService;

pub const SEARCH_RATE_LIMITED_MESSAGE: &str =
    "Rate limit reached. Please wait a minute before searching again.";
pub const SEARCH_FAILED_MESSAGE: &str = "Failed to search tokens. Please try again.";

/// What a keystroke-driven search produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// Query too short: results should be cleared, nothing was sent.
    Cleared,
    /// A newer query arrived before this one completed.
    Superseded,
    Results(Vec<TokenSearchResult>),
    /// Provider throttled the search; results should be cleared.
    RateLimited(String),
    /// Any other failure; results should be cleared.
    Failed(String),
}

/// Debounced token search for the add flow.
///
/// Each call takes a new generation number. After the quiet period only the
/// newest generation reaches the provider; older pending calls resolve to
/// `Superseded` without a request.
pub struct TokenSearch {
    prices: Arc<PriceService>,
    generation: AtomicU64,
    quiet_period: Duration,
    min_query_len: usize,
}

impl TokenSearch {
    pub fn new(prices: Arc<PriceService>, settings: &Settings) -> Self {
        Self {
            prices,
            generation: AtomicU64::new(0),
            quiet_period: settings.search_debounce(),
            min_query_len: settings.min_query_len,
        }
    }

    /// Handle the current contents of the search box.
    pub async fn search(&self, query: &str) -> SearchOutcome {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if query.chars().count() < self.min_query_len {
            return SearchOutcome::Cleared;
        }

        tokio::time::sleep(self.quiet_period).await;
        if !self.is_current(ticket) {
            debug!(query, "search superseded during quiet period");
            return SearchOutcome::Superseded;
        }

        let result = self.prices.search_tokens(query).await;
        if !self.is_current(ticket) {
            return SearchOutcome::Superseded;
        }

        match result {
            Ok(results) => SearchOutcome::Results(results),
            Err(CoreError::RateLimited { .. }) => {
                warn!("token search rate limited");
                SearchOutcome::RateLimited(SEARCH_RATE_LIMITED_MESSAGE.to_string())
            }
            Err(CoreError::QueryTooShort { .. }) => SearchOutcome::Cleared,
            Err(e) => {
                warn!(error = %e, "token search failed");
                SearchOutcome::Failed(SEARCH_FAILED_MESSAGE.to_string())
            }
        }
    }

    /// Invalidate any pending search (e.g. the add dialog was closed).
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket
    }
}
