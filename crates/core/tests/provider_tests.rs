// ═══════════════════════════════════════════════════════════════════
// Provider Tests — CoinGecko URLs and parsing, request throttle,
// HTTP status handling against a local server
// ═══════════════════════════════════════════════════════════════════

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crypto_bagz_core::errors::CoreError;
use crypto_bagz_core::models::settings::{Settings, DEFAULT_USER_AGENT};
use crypto_bagz_core::providers::coingecko::{
    parse_price_response, parse_search_response, CoinGeckoProvider,
};
use crypto_bagz_core::providers::throttle::RequestThrottle;
use crypto_bagz_core::providers::traits::PriceProvider;

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Accept a single connection, answer it with `status` and `body`, and
/// resolve to the raw request head.
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&chunk[..n]);
            if request.windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
        String::from_utf8_lossy(&request).into_owned()
    });
    (format!("http://{addr}"), task)
}

fn local_provider(base_url: String) -> CoinGeckoProvider {
    CoinGeckoProvider::with_settings(&Settings {
        base_url,
        request_delay_ms: 0,
        ..Settings::default()
    })
}

// ═══════════════════════════════════════════════════════════════════
// Request building
// ═══════════════════════════════════════════════════════════════════

mod urls {
    use super::*;

    #[test]
    fn name() {
        assert_eq!(CoinGeckoProvider::new().name(), "CoinGecko");
    }

    #[test]
    fn search_url_encodes_query() {
        let url = CoinGeckoProvider::new().search_url("shiba inu").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.coingecko.com/api/v3/search?query=shiba+inu"
        );
    }

    #[test]
    fn price_url_batches_ids() {
        let url = CoinGeckoProvider::new()
            .price_url(&ids(&["bitcoin", "ethereum"]))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin%2Cethereum&vs_currencies=usd&include_24hr_change=true"
        );
    }

    #[test]
    fn trailing_slash_in_base_url_is_ignored() {
        let provider = CoinGeckoProvider::with_settings(&Settings {
            base_url: "https://example.test/api/".into(),
            ..Settings::default()
        });
        let url = provider.search_url("eth").unwrap();
        assert_eq!(url.as_str(), "https://example.test/api/search?query=eth");
    }

    #[test]
    fn invalid_base_url_is_a_settings_error() {
        let provider = CoinGeckoProvider::with_settings(&Settings {
            base_url: "not a url".into(),
            ..Settings::default()
        });
        assert!(matches!(
            provider.search_url("eth"),
            Err(CoreError::InvalidSettings(_))
        ));
    }

    #[test]
    fn throttle_uses_configured_delay() {
        assert_eq!(
            CoinGeckoProvider::new().throttle().delay(),
            Duration::from_secs(1)
        );
    }
}

// ═══════════════════════════════════════════════════════════════════
// Response parsing
// ═══════════════════════════════════════════════════════════════════

mod parsing {
    use super::*;

    const SEARCH_BODY: &str = r#"{
        "coins": [
            {"id":"bitcoin","name":"Bitcoin","symbol":"BTC","market_cap_rank":1,
             "thumb":"https://img/thumb/btc.png","large":"https://img/large/btc.png"},
            {"id":"wrapped-bitcoin","name":"Wrapped Bitcoin","symbol":"WBTC",
             "thumb":"https://img/thumb/wbtc.png"},
            {"id":"bitcoin-cash","name":"Bitcoin Cash","symbol":"BCH","thumb":""}
        ],
        "exchanges": [],
        "categories": []
    }"#;

    #[test]
    fn search_keeps_provider_order() {
        let results = parse_search_response(SEARCH_BODY, 10).unwrap();
        let got: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(got, vec!["bitcoin", "wrapped-bitcoin", "bitcoin-cash"]);
        assert_eq!(results[0].icon(), Some("https://img/large/btc.png"));
        assert_eq!(results[1].icon(), Some("https://img/thumb/wbtc.png"));
        assert_eq!(results[2].icon(), None);
    }

    #[test]
    fn search_truncates_to_limit() {
        assert_eq!(parse_search_response(SEARCH_BODY, 2).unwrap().len(), 2);
    }

    #[test]
    fn search_without_coins_is_empty() {
        assert!(parse_search_response("{}", 10).unwrap().is_empty());
    }

    #[test]
    fn search_garbage_is_search_failed() {
        assert!(matches!(
            parse_search_response("<html>", 10),
            Err(CoreError::SearchFailed(_))
        ));
    }

    #[test]
    fn price_reads_usd_and_change() {
        let body = r#"{
            "bitcoin": {"usd": 67187.34, "usd_24h_change": 3.6378},
            "ethereum": {"usd": 3500, "usd_24h_change": null}
        }"#;
        let quotes = parse_price_response(body).unwrap();
        assert_eq!(quotes["bitcoin"].price, 67187.34);
        assert_eq!(quotes["bitcoin"].change_24h, Some(3.6378));
        assert_eq!(quotes["ethereum"].price, 3500.0);
        assert_eq!(quotes["ethereum"].change_24h, None);
    }

    #[test]
    fn price_entry_without_usd_is_dropped() {
        let quotes = parse_price_response(r#"{"bitcoin": {"eur": 1.0}, "ethereum": {}}"#).unwrap();
        assert!(quotes.is_empty());
    }

    #[test]
    fn unknown_ids_are_simply_absent() {
        assert!(parse_price_response("{}").unwrap().is_empty());
    }

    #[test]
    fn price_garbage_is_price_fetch_failed() {
        assert!(matches!(
            parse_price_response("[1,2"),
            Err(CoreError::PriceFetchFailed(_))
        ));
    }
}

// ═══════════════════════════════════════════════════════════════════
// RequestThrottle
// ═══════════════════════════════════════════════════════════════════

mod throttle {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_request_waits_the_delay() {
        let throttle = RequestThrottle::new(Duration::from_secs(1));
        let start = Instant::now();
        let at = throttle.acquire().await;
        assert_eq!(at - start, Duration::from_secs(1));
        assert_eq!(throttle.last_request().await, Some(at));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_requests_are_serialized() {
        let throttle = RequestThrottle::new(Duration::from_secs(1));
        let (a, b) = tokio::join!(throttle.acquire(), throttle.acquire());
        let gap = if a > b { a - b } else { b - a };
        assert!(gap >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_passes_straight_through() {
        let throttle = RequestThrottle::new(Duration::ZERO);
        let start = Instant::now();
        throttle.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}

// ═══════════════════════════════════════════════════════════════════
// HTTP status handling
// ═══════════════════════════════════════════════════════════════════

mod http {
    use super::*;

    #[tokio::test]
    async fn price_request_shape_and_headers() {
        let (base, server) = serve_once("200 OK", r#"{"bitcoin":{"usd":100.5,"usd_24h_change":-2.0}}"#).await;
        let provider = local_provider(base);

        let quotes = provider.get_prices(&ids(&["bitcoin", "ethereum"])).await.unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes["bitcoin"].price, 100.5);

        let request = server.await.unwrap().to_lowercase();
        assert!(request.starts_with(
            "get /simple/price?ids=bitcoin%2cethereum&vs_currencies=usd&include_24hr_change=true "
        ));
        assert!(request.contains("accept: application/json"));
        assert!(request.contains(&format!("user-agent: {}", DEFAULT_USER_AGENT.to_lowercase())));
    }

    #[tokio::test]
    async fn search_request_shape() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"coins":[{"id":"dogecoin","name":"Dogecoin","symbol":"DOGE","thumb":"t"}]}"#,
        )
        .await;
        let provider = local_provider(base);

        let results = provider.search("doge").await.unwrap();
        assert_eq!(results[0].id, "dogecoin");

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /search?query=doge "));
    }

    #[tokio::test]
    async fn too_many_requests_is_rate_limited() {
        let (base, _server) = serve_once("429 Too Many Requests", "").await;
        let err = local_provider(base)
            .get_prices(&ids(&["bitcoin"]))
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn search_rate_limit_is_distinguishable() {
        let (base, _server) = serve_once("429 Too Many Requests", "").await;
        let err = local_provider(base).search("btc").await.unwrap_err();
        assert!(matches!(err, CoreError::RateLimited { ref provider } if provider == "CoinGecko"));
    }

    #[tokio::test]
    async fn server_error_is_price_fetch_failed() {
        let (base, _server) = serve_once("500 Internal Server Error", "oops").await;
        let err = local_provider(base)
            .get_prices(&ids(&["bitcoin"]))
            .await
            .unwrap_err();
        match err {
            CoreError::PriceFetchFailed(msg) => assert!(msg.contains("500")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unreachable_host_is_search_failed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = local_provider(format!("http://{addr}"))
            .search("btc")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::SearchFailed(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn empty_id_list_makes_no_request() {
        let provider = local_provider("http://127.0.0.1:9".into());
        assert!(provider.get_prices(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn every_request_waits_the_fixed_delay() {
        let (base, _server) = serve_once("200 OK", r#"{"coins":[]}"#).await;
        let provider = CoinGeckoProvider::with_settings(&Settings {
            base_url: base,
            ..Settings::default()
        });

        let start = std::time::Instant::now();
        provider.search("do").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
    }
}

// ═══════════════════════════════════════════════════════════════════
// Trait compliance
// ═══════════════════════════════════════════════════════════════════

mod trait_compliance {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn provider_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CoinGeckoProvider>();
    }

    #[test]
    fn provider_as_trait_object() {
        let provider: Arc<dyn PriceProvider> = Arc::new(CoinGeckoProvider::default());
        assert_eq!(provider.name(), "CoinGecko");
    }
}
