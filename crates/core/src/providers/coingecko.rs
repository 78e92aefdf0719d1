use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::errors::CoreError;
use crate::models::price::PriceQuote;
use crate::models::settings::Settings;
use crate::models::token::TokenSearchResult;
use super::throttle::RequestThrottle;
use super::traits::PriceProvider;

const PROVIDER_NAME: &str = "CoinGecko";

/// CoinGecko public API provider.
///
/// - **Free**: no API key, but the free tier throttles aggressively (HTTP 429).
/// - **Endpoints**: `/search?query=`, `/simple/price?ids=&vs_currencies=usd&include_24hr_change=true`
/// - Every request waits the configured fixed delay first (see `RequestThrottle`).
pub struct CoinGeckoProvider {
    client: Client,
    base_url: String,
    throttle: RequestThrottle,
    search_limit: usize,
}

impl CoinGeckoProvider {
    pub fn new() -> Self {
        Self::with_settings(&Settings::default())
    }

    pub fn with_settings(settings: &Settings) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let builder = Client::builder()
            .default_headers(headers)
            .user_agent(settings.user_agent.clone());
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(settings.request_timeout());

        Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            throttle: RequestThrottle::new(settings.request_delay()),
            search_limit: settings.search_result_limit,
        }
    }

    pub fn throttle(&self) -> &RequestThrottle {
        &self.throttle
    }

    /// `GET {base}/search?query=<text>`
    pub fn search_url(&self, query: &str) -> Result<Url, CoreError> {
        let mut url = self.endpoint("search")?;
        url.query_pairs_mut().append_pair("query", query);
        Ok(url)
    }

    /// `GET {base}/simple/price?ids=<a,b>&vs_currencies=usd&include_24hr_change=true`
    pub fn price_url(&self, ids: &[String]) -> Result<Url, CoreError> {
        let mut url = self.endpoint("simple/price")?;
        url.query_pairs_mut()
            .append_pair("ids", &ids.join(","))
            .append_pair("vs_currencies", "usd")
            .append_pair("include_24hr_change", "true");
        Ok(url)
    }

    fn endpoint(&self, path: &str) -> Result<Url, CoreError> {
        Url::parse(&format!("{}/{path}", self.base_url))
            .map_err(|e| CoreError::InvalidSettings(format!("Invalid provider URL: {e}")))
    }

    /// Throttled GET returning the body text. 429 becomes `RateLimited`;
    /// any other failure is wrapped with `fail`.
    async fn fetch(&self, url: Url, fail: fn(String) -> CoreError) -> Result<String, CoreError> {
        self.throttle.acquire().await;
        debug!(path = url.path(), "provider request");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fail(CoreError::from(e).to_string()))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(provider = PROVIDER_NAME, "rate limited");
            return Err(CoreError::RateLimited {
                provider: PROVIDER_NAME.into(),
            });
        }
        if !status.is_success() {
            return Err(fail(format!("{PROVIDER_NAME} returned HTTP {status}")));
        }

        resp.text()
            .await
            .map_err(|e| fail(CoreError::from(e).to_string()))
    }
}

impl Default for CoinGeckoProvider {
    fn default() -> Self {
        Self::new()
    }
}

// ── CoinGecko API response types ────────────────────────────────────

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    coins: Vec<TokenSearchResult>,
}

#[derive(Deserialize)]
struct SimplePrice {
    usd: Option<f64>,
    usd_24h_change: Option<f64>,
}

/// Parse a `/search` body, keeping at most `limit` coins in provider order.
pub fn parse_search_response(body: &str, limit: usize) -> Result<Vec<TokenSearchResult>, CoreError> {
    let resp: SearchResponse = serde_json::from_str(body)
        .map_err(|e| CoreError::SearchFailed(format!("Failed to parse search response: {e}")))?;
    Ok(resp.coins.into_iter().take(limit).collect())
}

/// Parse a `/simple/price` body. Entries without a USD price are dropped so
/// they surface as unavailable rather than as a zero price.
pub fn parse_price_response(body: &str) -> Result<HashMap<String, PriceQuote>, CoreError> {
    let resp: HashMap<String, SimplePrice> = serde_json::from_str(body)
        .map_err(|e| CoreError::PriceFetchFailed(format!("Failed to parse price response: {e}")))?;
    Ok(resp
        .into_iter()
        .filter_map(|(id, p)| {
            let price = p.usd.filter(|v| v.is_finite())?;
            Some((id, PriceQuote::new(price, p.usd_24h_change)))
        })
        .collect())
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl PriceProvider for CoinGeckoProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn search(&self, query: &str) -> Result<Vec<TokenSearchResult>, CoreError> {
        let url = self.search_url(query)?;
        let body = self.fetch(url, CoreError::SearchFailed).await?;
        parse_search_response(&body, self.search_limit)
    }

    async fn get_prices(&self, ids: &[String]) -> Result<HashMap<String, PriceQuote>, CoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let url = self.price_url(ids)?;
        let body = self.fetch(url, CoreError::PriceFetchFailed).await?;
        parse_price_response(&body)
    }
}
