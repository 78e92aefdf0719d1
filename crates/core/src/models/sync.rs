use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shown while waiting out a generic sync failure.
pub const SYNC_FAILED_MESSAGE: &str = "Failed to update prices. Will retry soon.";

/// Shown while waiting out a provider rate limit.
pub fn rate_limited_message(retry_secs: u64) -> String {
    format!("Rate limit reached. Prices will update in {retry_secs} seconds.")
}

/// Logical state of the price sync loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    Idle,
    Syncing,
    /// A single retry is scheduled; other triggers are ignored until it fires.
    Backoff,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Idle => write!(f, "Idle"),
            SyncState::Syncing => write!(f, "Syncing"),
            SyncState::Backoff => write!(f, "Backoff"),
        }
    }
}

/// What a completed sync cycle did to the holdings list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Ids whose price, change and value were refreshed
    pub updated: Vec<String>,

    /// Ids the provider had no price for (flagged on the holding)
    pub unavailable: Vec<String>,
}

/// Result of one sync cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Holdings list was empty; nothing was fetched.
    Skipped,
    Completed(SyncReport),
    RateLimited,
    Failed(String),
}

impl SyncOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, SyncOutcome::RateLimited | SyncOutcome::Failed(_))
    }
}

/// Observable state of the sync loop, published on a watch channel.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatus {
    pub state: SyncState,

    /// Transient user-visible message; cleared when the retry fires.
    pub message: Option<String>,

    pub last_synced: Option<DateTime<Utc>>,

    pub last_report: Option<SyncReport>,

    /// When the pending retry is due, while in `Backoff`.
    pub next_retry: Option<DateTime<Utc>>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            state: SyncState::Idle,
            message: None,
            last_synced: None,
            last_report: None,
            next_retry: None,
        }
    }
}
