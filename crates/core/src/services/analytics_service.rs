use crate::models::analytics::PortfolioSummary;
use crate::models::holding::Holding;

/// Aggregates holdings into totals and a 24h change estimate.
///
/// Pure computation over the stored values; no price lookups.
pub struct AnalyticsService;

impl AnalyticsService {
    pub fn new() -> Self {
        Self
    }

    pub fn summarize(&self, holdings: &[Holding]) -> PortfolioSummary {
        let total_value: f64 = holdings.iter().map(Holding::value_or_zero).sum();
        let change_24h_value: f64 = holdings
            .iter()
            .map(|h| h.value_or_zero() * h.price_change_percentage_24h.unwrap_or(0.0) / 100.0)
            .sum();

        // Value 24h ago, approximated from today's value minus the change.
        let previous_value = total_value - change_24h_value;
        let change_24h_percent = if previous_value.abs() > f64::EPSILON {
            change_24h_value / previous_value * 100.0
        } else {
            0.0
        };

        PortfolioSummary {
            holding_count: holdings.len(),
            priced_count: holdings.iter().filter(|h| h.current_price.is_some()).count(),
            total_value,
            change_24h_value,
            change_24h_percent,
        }
    }
}

impl Default for AnalyticsService {
    fn default() -> Self {
        Self::new()
    }
}
