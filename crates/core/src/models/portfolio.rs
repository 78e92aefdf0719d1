use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::holding::Holding;

/// Snapshot written when the user exports the portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioExport {
    pub tokens: Vec<Holding>,

    /// RFC 3339 timestamp with millisecond precision
    pub export_date: String,

    pub total_value: f64,
}

impl PortfolioExport {
    pub fn new(tokens: Vec<Holding>, at: DateTime<Utc>) -> Self {
        let total_value = tokens.iter().map(Holding::value_or_zero).sum();
        Self {
            tokens,
            export_date: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            total_value,
        }
    }

    /// Suggested download name, e.g. `crypto-bagz-portfolio-2025-01-15.json`.
    pub fn file_name(at: DateTime<Utc>) -> String {
        format!("crypto-bagz-portfolio-{}.json", at.format("%Y-%m-%d"))
    }
}
