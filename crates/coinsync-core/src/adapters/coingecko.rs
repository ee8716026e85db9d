use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::data_source::{FetchError, FetchFuture, MarketDataSource};
use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::schema;
use crate::MarketRecord;

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Largest page the markets endpoint serves.
pub const MAX_PER_PAGE: usize = 250;

/// CoinGecko `/coins/markets` adapter.
#[derive(Clone)]
pub struct CoinGeckoAdapter {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    api_key: String,
    timeout_ms: u64,
}

impl CoinGeckoAdapter {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::new()), api_key)
    }

    pub fn with_http_client(http_client: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: String::from(DEFAULT_BASE_URL),
            api_key: api_key.into(),
            timeout_ms: 10_000,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn markets_url(&self, n: usize) -> String {
        format!(
            "{}/coins/markets?vs_currency=usd&order=market_cap_desc&per_page={}&page=1&sparkline=false&x_cg_demo_api_key={}",
            self.base_url,
            n,
            urlencoding::encode(&self.api_key)
        )
    }

    async fn fetch_markets(&self, n: usize) -> Result<Vec<MarketRecord>, FetchError> {
        if n == 0 {
            return Err(FetchError::invalid_request(
                "snapshot size must be greater than zero",
            ));
        }
        let per_page = n.min(MAX_PER_PAGE);

        let request = HttpRequest::get(self.markets_url(per_page))
            .with_header("accept", "application/json")
            .with_timeout_ms(self.timeout_ms);

        let response = self.http_client.execute(request).await.map_err(|e| {
            FetchError::network(format!("coingecko transport error: {}", e.message()))
        })?;

        if !response.is_success() {
            let message = format!("coingecko returned status {}", response.status);
            return Err(match response.status {
                429 | 500..=599 => FetchError::network(message),
                _ => FetchError::non_retryable_network(message),
            });
        }

        let body: Value = serde_json::from_str(&response.body).map_err(|e| {
            FetchError::malformed_body(format!("coingecko body is not JSON: {e}"))
        })?;
        let Value::Array(items) = body else {
            return Err(FetchError::malformed_body(
                "coingecko body is not an array of market items",
            ));
        };

        let records = items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                schema::validate(item).map_err(|error| FetchError::invalid_item(index, error))
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(requested = per_page, received = records.len(), "coingecko snapshot parsed");
        Ok(records)
    }
}

impl MarketDataSource for CoinGeckoAdapter {
    fn name(&self) -> &'static str {
        "coingecko"
    }

    fn fetch_top_n(&self, n: usize) -> FetchFuture<'_> {
        Box::pin(self.fetch_markets(n))
    }
}
