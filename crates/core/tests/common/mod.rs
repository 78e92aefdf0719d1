// Shared fixtures for the service and sync tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

use crypto_bagz_core::errors::CoreError;
use crypto_bagz_core::models::price::PriceQuote;
use crypto_bagz_core::models::token::TokenSearchResult;
use crypto_bagz_core::providers::traits::PriceProvider;

/// How the mock answers its next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Ok,
    RateLimited,
    Fail,
}

/// In-memory provider that records every call.
///
/// Each call consumes one entry of the script; once the script is empty the
/// default mode applies.
pub struct MockProvider {
    prices: Mutex<HashMap<String, PriceQuote>>,
    coins: Vec<TokenSearchResult>,
    mode: Mutex<Mode>,
    script: Mutex<VecDeque<Mode>>,
    price_calls: Mutex<Vec<(Instant, Vec<String>)>>,
    search_calls: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new() -> Arc<Self> {
        let mut prices = HashMap::new();
        prices.insert("bitcoin".to_string(), PriceQuote::new(50_000.0, Some(2.0)));
        prices.insert("ethereum".to_string(), PriceQuote::new(3_000.0, Some(-1.0)));

        Arc::new(Self {
            prices: Mutex::new(prices),
            coins: vec![coin("bitcoin", "btc", "Bitcoin"), coin("ethereum", "eth", "Ethereum")],
            mode: Mutex::new(Mode::Ok),
            script: Mutex::new(VecDeque::new()),
            price_calls: Mutex::new(Vec::new()),
            search_calls: Mutex::new(Vec::new()),
        })
    }

    pub fn set_price(&self, id: &str, price: f64, change: Option<f64>) {
        self.prices
            .lock()
            .unwrap()
            .insert(id.to_string(), PriceQuote::new(price, change));
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }

    /// Answer the next calls with `modes`, in order.
    pub fn script(&self, modes: &[Mode]) {
        self.script.lock().unwrap().extend(modes.iter().copied());
    }

    pub fn price_calls(&self) -> Vec<Vec<String>> {
        self.price_calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, ids)| ids.clone())
            .collect()
    }

    /// Whole seconds between `start` and each price call.
    pub fn price_call_offsets(&self, start: Instant) -> Vec<u64> {
        self.price_calls
            .lock()
            .unwrap()
            .iter()
            .map(|(at, _)| at.duration_since(start).as_secs())
            .collect()
    }

    pub fn search_calls(&self) -> Vec<String> {
        self.search_calls.lock().unwrap().clone()
    }

    fn next_mode(&self) -> Mode {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(*self.mode.lock().unwrap())
    }
}

#[async_trait]
impl PriceProvider for MockProvider {
    fn name(&self) -> &str {
        "Mock"
    }

    async fn search(&self, query: &str) -> Result<Vec<TokenSearchResult>, CoreError> {
        self.search_calls.lock().unwrap().push(query.to_string());
        match self.next_mode() {
            Mode::Ok => {
                let q = query.to_lowercase();
                Ok(self
                    .coins
                    .iter()
                    .filter(|c| c.id.contains(&q) || c.symbol.contains(&q))
                    .cloned()
                    .collect())
            }
            Mode::RateLimited => Err(CoreError::RateLimited {
                provider: "Mock".into(),
            }),
            Mode::Fail => Err(CoreError::Network("connection reset".into())),
        }
    }

    async fn get_prices(&self, ids: &[String]) -> Result<HashMap<String, PriceQuote>, CoreError> {
        self.price_calls
            .lock()
            .unwrap()
            .push((Instant::now(), ids.to_vec()));
        match self.next_mode() {
            Mode::Ok => {
                let prices = self.prices.lock().unwrap();
                Ok(ids
                    .iter()
                    .filter_map(|id| prices.get(id).map(|q| (id.clone(), *q)))
                    .collect())
            }
            Mode::RateLimited => Err(CoreError::RateLimited {
                provider: "Mock".into(),
            }),
            Mode::Fail => Err(CoreError::Network("connection reset".into())),
        }
    }
}

pub fn coin(id: &str, symbol: &str, name: &str) -> TokenSearchResult {
    TokenSearchResult {
        id: id.into(),
        symbol: symbol.into(),
        name: name.into(),
        thumb: format!("https://img/thumb/{id}.png"),
        large: Some(format!("https://img/large/{id}.png")),
    }
}

pub fn as_provider(mock: &Arc<MockProvider>) -> Arc<dyn PriceProvider> {
    mock.clone()
}
