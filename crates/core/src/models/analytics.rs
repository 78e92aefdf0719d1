use serde::{Deserialize, Serialize};

/// Aggregate valuation of the holdings list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    /// Number of holdings in the list
    pub holding_count: usize,

    /// Number of holdings that carry a price
    pub priced_count: usize,

    /// Sum of every holding's value (unpriced holdings count as 0), in USD
    pub total_value: f64,

    /// Estimated USD change over the last 24h: sum of `value * change% / 100`
    pub change_24h_value: f64,

    /// `change_24h_value` relative to the value 24h ago, in percent.
    /// 0 when the value 24h ago is 0.
    pub change_24h_percent: f64,
}
