use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::errors::CoreError;
use crate::models::holding::Holding;
use crate::models::price::PriceQuote;
use crate::models::settings::DEFAULT_STORAGE_KEY;
use crate::models::sync::SyncReport;
use crate::storage::local::{LocalStorage, MemoryStorage};
use crate::storage::manager::StorageManager;

/// Result of `HoldingsStore::add`.
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    /// A new row was appended.
    Inserted,
    /// The id already existed; its amount is now `new_amount`.
    Merged { new_amount: f64 },
}

/// The canonical holdings list and its mutation rules.
///
/// Every mutation writes the full list back to local storage before
/// returning. If that write fails the list is restored and the error returned,
/// so memory never runs ahead of what is stored.
pub struct HoldingsStore {
    holdings: Vec<Holding>,
    storage: Box<dyn LocalStorage>,
    key: String,
    load_error: Option<String>,
}

impl std::fmt::Debug for HoldingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HoldingsStore")
            .field("holdings", &self.holdings.len())
            .field("key", &self.key)
            .field("load_error", &self.load_error)
            .finish()
    }
}

impl HoldingsStore {
    /// Load the list stored under `key`.
    ///
    /// Never fails: a missing document gives an empty list, and a malformed or
    /// unreadable one gives an empty list with `load_error()` set.
    pub fn load(storage: Box<dyn LocalStorage>, key: impl Into<String>) -> Self {
        let key = key.into();
        let (holdings, load_error) = match StorageManager::load(storage.as_ref(), &key) {
            Ok(holdings) => (StorageManager::dedupe(holdings), None),
            Err(e) => {
                warn!(error = %e, "could not load saved portfolio, starting empty");
                (Vec::new(), Some(format!("Error loading saved portfolio: {e}")))
            }
        };
        info!(count = holdings.len(), "holdings loaded");

        Self {
            holdings,
            storage,
            key,
            load_error,
        }
    }

    /// An empty store backed by process memory.
    pub fn in_memory() -> Self {
        Self::load(Box::new(MemoryStorage::new()), DEFAULT_STORAGE_KEY)
    }

    /// Error surfaced while loading, if the stored document was unusable.
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// Acknowledge the load error so it is shown only once.
    pub fn take_load_error(&mut self) -> Option<String> {
        self.load_error.take()
    }

    /// Write the full list to local storage.
    pub fn save(&self) -> Result<(), CoreError> {
        StorageManager::save(self.storage.as_ref(), &self.key, &self.holdings)
    }

    // ── Mutations ───────────────────────────────────────────────────

    /// Add a holding, or merge it into the existing row with the same id.
    ///
    /// On merge only `amount` changes; price and value are refreshed by the
    /// next sync, not recomputed here.
    pub fn add(&mut self, holding: Holding) -> Result<AddOutcome, CoreError> {
        validate_amount(holding.amount)?;
        let previous = self.holdings.clone();

        let outcome = match self.holdings.iter_mut().find(|h| h.id == holding.id) {
            Some(existing) => {
                existing.amount += holding.amount;
                debug!(id = %existing.id, amount = existing.amount, "merged holding");
                AddOutcome::Merged {
                    new_amount: existing.amount,
                }
            }
            None => {
                debug!(id = %holding.id, "inserted holding");
                self.holdings.push(holding);
                AddOutcome::Inserted
            }
        };

        self.commit(previous)?;
        Ok(outcome)
    }

    /// Set a new amount and recompute value from the holding's current price
    /// (0 when it has none).
    pub fn edit(&mut self, id: &str, new_amount: f64) -> Result<(), CoreError> {
        validate_amount(new_amount)?;

        let index = self
            .holdings
            .iter()
            .position(|h| h.id == id)
            .ok_or_else(|| CoreError::HoldingNotFound(id.to_string()))?;
        let previous = self.holdings.clone();
        let holding = &mut self.holdings[index];
        holding.amount = new_amount;
        holding.value = Some(holding.current_price.unwrap_or(0.0) * new_amount);

        self.commit(previous)
    }

    /// Delete the holding with `id`. Returns `false` (and writes nothing) if absent.
    pub fn remove(&mut self, id: &str) -> Result<bool, CoreError> {
        if self.get(id).is_none() {
            return Ok(false);
        }
        let previous = self.holdings.clone();
        self.holdings.retain(|h| h.id != id);
        self.commit(previous)?;
        Ok(true)
    }

    /// Apply one sync cycle's quotes to the list as it is now.
    ///
    /// Holdings with a quote get price, change and value refreshed and their
    /// error cleared; holdings without one are flagged and keep their numbers.
    /// Rows added after the fetch started are flagged too and picked up by the
    /// next cycle.
    pub fn apply_quotes(
        &mut self,
        quotes: &HashMap<String, PriceQuote>,
    ) -> Result<SyncReport, CoreError> {
        let previous = self.holdings.clone();
        let mut report = SyncReport::default();
        for holding in &mut self.holdings {
            match quotes.get(&holding.id) {
                Some(quote) => {
                    holding.apply_quote(*quote);
                    report.updated.push(holding.id.clone());
                }
                None => {
                    warn!(id = %holding.id, "no price data found");
                    holding.mark_price_unavailable();
                    report.unavailable.push(holding.id.clone());
                }
            }
        }
        self.commit(previous)?;
        Ok(report)
    }

    /// Save, or put `previous` back if the write fails.
    fn commit(&mut self, previous: Vec<Holding>) -> Result<(), CoreError> {
        if let Err(e) = self.save() {
            warn!(error = %e, "saving holdings failed, change rolled back");
            self.holdings = previous;
            return Err(e);
        }
        Ok(())
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn holdings(&self) -> &[Holding] {
        &self.holdings
    }

    pub fn get(&self, id: &str) -> Option<&Holding> {
        self.holdings.iter().find(|h| h.id == id)
    }

    /// Distinct token ids in list order.
    pub fn token_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::with_capacity(self.holdings.len());
        for h in &self.holdings {
            if !ids.contains(&h.id) {
                ids.push(h.id.clone());
            }
        }
        ids
    }

    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }
}

fn validate_amount(amount: f64) -> Result<(), CoreError> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(CoreError::InvalidAmount(amount))
    }
}
