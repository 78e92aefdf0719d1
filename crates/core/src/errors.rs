use thiserror::Error;

/// Unified error type for the whole crypto-bagz-core library.
/// Every public fallible function returns `Result<T, CoreError>`.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Provider / Network ──────────────────────────────────────────
    #[error("Rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("Token search failed: {0}")]
    SearchFailed(String),

    #[error("Price fetch failed: {0}")]
    PriceFetchFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Price data unavailable for {0}")]
    PriceUnavailable(String),

    // ── Input validation ────────────────────────────────────────────
    #[error("Invalid amount {0}: must be a finite number greater than zero")]
    InvalidAmount(f64),

    #[error("Search query too short: {actual} characters (minimum {min})")]
    QueryTooShort { min: usize, actual: usize },

    #[error("Holding not found: {0}")]
    HoldingNotFound(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    // ── Storage ─────────────────────────────────────────────────────
    #[error("Stored portfolio is malformed: {0}")]
    MalformedStoredData(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CoreError {
    /// `true` when the provider answered HTTP 429.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, CoreError::RateLimited { .. })
    }

    /// Errors that a later retry may resolve on its own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::RateLimited { .. }
                | CoreError::SearchFailed(_)
                | CoreError::PriceFetchFailed(_)
                | CoreError::Network(_)
        )
    }
}

// ── Conversion helpers (From impls) ─────────────────────────────────

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        // reqwest errors carry the full URL; drop the query so search text
        // and id lists stay out of logs.
        let msg = e.to_string();
        let sanitized = if let Some(idx) = msg.find('?') {
            format!("{}?<query redacted>", &msg[..idx])
        } else {
            msg
        };
        CoreError::Network(sanitized)
    }
}
