use serde::{Deserialize, Serialize};

use super::price::PriceQuote;
use super::token::TokenSearchResult;

/// Per-holding error text set when a sync finds no price for the id.
pub const PRICE_UNAVAILABLE: &str = "Price data unavailable";

/// One row of the portfolio: a token position the user owns.
///
/// Field names follow the persisted JSON document (`currentPrice`,
/// `priceChangePercentage24h`, ...) so previously saved portfolios keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    /// Provider token id (e.g. "bitcoin"). Unique within the holdings list.
    pub id: String,

    /// Ticker symbol, uppercased for display (e.g. "BTC")
    pub symbol: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Quantity owned. Create/edit operations only accept values > 0.
    pub amount: f64,

    /// Last known unit price in USD; absent until the first successful sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,

    #[serde(
        default,
        rename = "priceChangePercentage24h",
        skip_serializing_if = "Option::is_none"
    )]
    pub price_change_percentage_24h: Option<f64>,

    /// `current_price * amount` when the price is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Sync error flag, cleared by the next successful sync for this id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Holding {
    /// A holding without any price data yet.
    pub fn new(id: impl Into<String>, symbol: impl Into<String>, amount: f64) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into().to_uppercase(),
            name: None,
            amount,
            current_price: None,
            price_change_percentage_24h: None,
            value: None,
            image: None,
            error: None,
        }
    }

    /// Build a holding from a search hit. Prefers the large icon over the thumbnail.
    pub fn from_search_result(result: &TokenSearchResult, amount: f64) -> Self {
        Self {
            name: Some(result.name.clone()),
            image: result.icon().map(str::to_string),
            ..Self::new(result.id.clone(), result.symbol.clone(), amount)
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Attach a quote as if it came from a sync.
    pub fn with_quote(mut self, quote: PriceQuote) -> Self {
        self.apply_quote(quote);
        self
    }

    /// Record a fresh quote: price, 24h change, recomputed value, error cleared.
    pub fn apply_quote(&mut self, quote: PriceQuote) {
        self.current_price = Some(quote.price);
        self.price_change_percentage_24h = quote.change_24h;
        self.value = Some(quote.price * self.amount);
        self.error = None;
    }

    /// Flag the holding as unpriced. Numeric fields keep their previous values.
    pub fn mark_price_unavailable(&mut self) {
        self.error = Some(PRICE_UNAVAILABLE.to_string());
    }

    /// Value used for totals: the stored value, or 0 when unknown.
    pub fn value_or_zero(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }

    /// Name if present, otherwise the symbol.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.symbol)
    }
}
