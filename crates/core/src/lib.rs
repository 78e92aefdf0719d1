pub mod errors;
pub mod models;
pub mod providers;
pub mod services;
pub mod storage;

use chrono::Utc;
use std::sync::{Arc, Mutex};

use errors::CoreError;
use models::{
    analytics::PortfolioSummary,
    holding::Holding,
    portfolio::PortfolioExport,
    settings::Settings,
    sync::{SyncOutcome, SyncStatus},
    token::TokenSearchResult,
};
use providers::coingecko::CoinGeckoProvider;
use providers::traits::PriceProvider;
use services::{
    analytics_service::AnalyticsService,
    holdings_store::{AddOutcome, HoldingsStore},
    price_service::PriceService,
    sync_controller::{SharedStore, SyncController, SyncHandle},
    token_search::{SearchOutcome, TokenSearch},
};
use storage::local::{LocalStorage, MemoryStorage};

/// Main entry point for the Crypto Bagz core library.
///
/// Owns the holdings store and the price service and shares them with the
/// background sync loop. All methods take `&self`; the shared state is
/// guarded by locks that are never held across an `.await`.
#[must_use]
pub struct PortfolioTracker {
    store: SharedStore,
    prices: Arc<PriceService>,
    search: TokenSearch,
    sync: SyncController,
    analytics: AnalyticsService,
    settings: Settings,
}

impl std::fmt::Debug for PortfolioTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortfolioTracker")
            .field("holdings", &self.lock_store().len())
            .field("cached_prices", &self.prices.cache_len())
            .field("provider", &self.prices.provider_name())
            .finish()
    }
}

impl PortfolioTracker {
    /// Load the portfolio from `storage` and wire it to `provider`.
    ///
    /// Never fails on bad stored data; check `load_error()` afterwards.
    pub fn open(
        storage: Box<dyn LocalStorage>,
        provider: Arc<dyn PriceProvider>,
        settings: Settings,
    ) -> Self {
        let store = HoldingsStore::load(storage, settings.storage_key.clone());
        let store: SharedStore = Arc::new(Mutex::new(store));
        let prices = Arc::new(PriceService::new(provider, &settings));
        let search = TokenSearch::new(prices.clone(), &settings);
        let sync = SyncController::new(store.clone(), prices.clone(), &settings);

        Self {
            store,
            prices,
            search,
            sync,
            analytics: AnalyticsService::new(),
            settings,
        }
    }

    /// `open` with the CoinGecko provider configured from `settings`.
    pub fn open_with_coingecko(storage: Box<dyn LocalStorage>, settings: Settings) -> Self {
        let provider = Arc::new(CoinGeckoProvider::with_settings(&settings));
        Self::open(storage, provider, settings)
    }

    /// A fresh, empty portfolio held only in memory.
    pub fn in_memory(provider: Arc<dyn PriceProvider>, settings: Settings) -> Self {
        Self::open(Box::new(MemoryStorage::new()), provider, settings)
    }

    /// Message describing why the saved portfolio could not be loaded, if so.
    #[must_use]
    pub fn load_error(&self) -> Option<String> {
        self.lock_store().load_error().map(str::to_string)
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn price_service(&self) -> &Arc<PriceService> {
        &self.prices
    }

    // ── Holdings ────────────────────────────────────────────────────

    /// Snapshot of the current holdings list.
    #[must_use]
    pub fn holdings(&self) -> Vec<Holding> {
        self.lock_store().holdings().to_vec()
    }

    #[must_use]
    pub fn get_holding(&self, id: &str) -> Option<Holding> {
        self.lock_store().get(id).cloned()
    }

    /// Add a token picked from search results.
    ///
    /// The amount is validated first, then the price is looked up (cache first,
    /// stale cache if the provider throttles) so the new row is valued right
    /// away. Existing ids are merged by amount.
    pub async fn add_token(
        &self,
        result: &TokenSearchResult,
        amount: f64,
    ) -> Result<AddOutcome, CoreError> {
        if !(amount.is_finite() && amount > 0.0) {
            return Err(CoreError::InvalidAmount(amount));
        }
        let quote = self.prices.get_price(&result.id).await?;
        let holding = Holding::from_search_result(result, amount).with_quote(quote);
        self.lock_store().add(holding)
    }

    /// Add (or merge) a holding as given, without any price lookup.
    pub fn add_holding(&self, holding: Holding) -> Result<AddOutcome, CoreError> {
        self.lock_store().add(holding)
    }

    /// Change the amount of an existing holding. Amount must be > 0.
    pub fn edit_amount(&self, id: &str, new_amount: f64) -> Result<(), CoreError> {
        self.lock_store().edit(id, new_amount)
    }

    /// Remove a holding. Returns `false` if no holding had that id.
    pub fn remove(&self, id: &str) -> Result<bool, CoreError> {
        self.lock_store().remove(id)
    }

    // ── Search ──────────────────────────────────────────────────────

    /// Debounced search for the add dialog; see `TokenSearch`.
    pub async fn search(&self, query: &str) -> SearchOutcome {
        self.search.search(query).await
    }

    pub fn cancel_search(&self) {
        self.search.cancel();
    }

    // ── Price sync ──────────────────────────────────────────────────

    /// Refresh prices now and wait for the outcome.
    ///
    /// Goes through the sync state machine: `Skipped` while a cycle is running
    /// or a retry is pending, and a failure schedules the single retry.
    pub async fn refresh(&self) -> SyncOutcome {
        self.sync.refresh().await
    }

    /// Start the periodic sync loop with backoff. Requires a tokio runtime.
    pub fn start_sync(&self) -> SyncHandle {
        self.sync.clone().spawn()
    }

    #[must_use]
    pub fn sync_status(&self) -> SyncStatus {
        self.sync.current_status()
    }

    // ── Summary & Export ────────────────────────────────────────────

    #[must_use]
    pub fn summary(&self) -> PortfolioSummary {
        self.analytics.summarize(self.lock_store().holdings())
    }

    /// Export the holdings as the pretty-printed JSON download artifact.
    pub fn export_json(&self) -> Result<String, CoreError> {
        let export = PortfolioExport::new(self.holdings(), Utc::now());
        serde_json::to_string_pretty(&export)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize export: {e}")))
    }

    // ── Internal ────────────────────────────────────────────────────

    fn lock_store(&self) -> std::sync::MutexGuard<'_, HoldingsStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for PortfolioTracker {
    fn drop(&mut self) {
        self.sync.cancel_retry();
    }
}
