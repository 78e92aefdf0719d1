use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::CoreError;

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";
pub const DEFAULT_USER_AGENT: &str = "CryptoBagz Portfolio Tracker";
pub const DEFAULT_STORAGE_KEY: &str = "portfolio";

/// Largest cache TTL `chrono::Duration` can hold (it counts milliseconds in an `i64`).
pub const MAX_CACHE_TTL_SECS: u64 = (i64::MAX / 1000) as u64;

/// Runtime configuration for the provider, cache and sync loop.
///
/// Every field has a default matching the provider's free tier, so a partial
/// JSON document (or `{}`) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Price provider API root, without a trailing slash.
    pub base_url: String,

    /// Sent as `User-Agent` on every provider request.
    pub user_agent: String,

    /// Fixed delay before each provider call (milliseconds).
    pub request_delay_ms: u64,

    /// Per-request network timeout (seconds).
    pub request_timeout_secs: u64,

    /// Period of the background price refresh (seconds).
    pub refresh_interval_secs: u64,

    /// Retry delay after the provider rate-limits a sync (seconds).
    pub rate_limit_retry_secs: u64,

    /// Retry delay after any other sync failure (seconds).
    pub failure_retry_secs: u64,

    /// Validity window of cached prices (seconds).
    pub cache_ttl_secs: u64,

    /// Maximum number of search results kept.
    pub search_result_limit: usize,

    /// Shortest query (in characters) that reaches the provider.
    pub min_query_len: usize,

    /// Quiet period before a typed search is issued (milliseconds).
    pub search_debounce_ms: u64,

    /// Key of the holdings document in local storage.
    pub storage_key: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_delay_ms: 1_000,
            request_timeout_secs: 10,
            refresh_interval_secs: 300,
            rate_limit_retry_secs: 60,
            failure_retry_secs: 30,
            cache_ttl_secs: 300,
            search_result_limit: 10,
            min_query_len: 2,
            search_debounce_ms: 500,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

impl Settings {
    /// Parse settings from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.base_url.trim().is_empty() {
            return Err(CoreError::InvalidSettings("base_url must not be empty".into()));
        }
        if self.refresh_interval_secs == 0 {
            return Err(CoreError::InvalidSettings(
                "refresh_interval_secs must be greater than zero".into(),
            ));
        }
        if self.rate_limit_retry_secs == 0 || self.failure_retry_secs == 0 {
            return Err(CoreError::InvalidSettings(
                "retry delays must be greater than zero".into(),
            ));
        }
        if self.cache_ttl_secs > MAX_CACHE_TTL_SECS {
            return Err(CoreError::InvalidSettings(format!(
                "cache_ttl_secs must not exceed {MAX_CACHE_TTL_SECS}"
            )));
        }
        if self.search_result_limit == 0 {
            return Err(CoreError::InvalidSettings(
                "search_result_limit must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn rate_limit_retry(&self) -> Duration {
        Duration::from_secs(self.rate_limit_retry_secs)
    }

    pub fn failure_retry(&self) -> Duration {
        Duration::from_secs(self.failure_retry_secs)
    }

    /// Cache TTL, saturated at `chrono::Duration::MAX` for unvalidated values.
    pub fn cache_ttl(&self) -> chrono::Duration {
        i64::try_from(self.cache_ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}
