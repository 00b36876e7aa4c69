use async_trait::async_trait;
use market_data_core::candle::Resolution;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::error::ProviderError;
use crate::provider::{CandleProvider, RawKline};

pub const BINANCE_BASE_URL: &str = "https://api.binance.com";

/// Binance caps a single klines request at this many records.
const MAX_LIMIT: usize = 1000;

/// Internal symbol to Binance spot pair.
const SYMBOL_MAP: &[(&str, &str)] = &[
    ("BTC-USD", "BTCUSDT"),
    ("ETH-USD", "ETHUSDT"),
    ("SOL-USD", "SOLUSDT"),
    ("ADA-USD", "ADAUSDT"),
    ("XRP-USD", "XRPUSDT"),
];

/// Binance spot klines provider.
/// Public endpoint, no authentication required.
pub struct BinanceProvider {
    client: Client,
    base_url: String,
}

impl BinanceProvider {
    pub fn new() -> Self {
        Self::with_base_url(BINANCE_BASE_URL.to_string())
    }

    /// Create with a custom base URL (for testing or a regional mirror).
    pub fn with_base_url(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Default for BinanceProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Binance pair for an internal symbol, if the pair is listed.
pub fn binance_symbol(symbol: &str) -> Option<&'static str> {
    SYMBOL_MAP
        .iter()
        .find(|(internal, _)| *internal == symbol)
        .map(|(_, pair)| *pair)
}

/// Binance interval token for a resolution. Every resolution has one.
pub fn binance_interval(resolution: Resolution) -> &'static str {
    match resolution {
        Resolution::M1 => "1m",
        Resolution::M5 => "5m",
        Resolution::M15 => "15m",
        Resolution::M30 => "30m",
        Resolution::H1 => "1h",
        Resolution::H4 => "4h",
        Resolution::D1 => "1d",
        Resolution::W1 => "1w",
    }
}

#[async_trait]
impl CandleProvider for BinanceProvider {
    fn name(&self) -> &str {
        "binance"
    }

    #[instrument(skip(self), name = "binance::fetch_history")]
    async fn fetch_history(
        &self,
        symbol: &str,
        resolution: Resolution,
        limit: usize,
    ) -> Result<Vec<RawKline>, ProviderError> {
        let Some(pair) = binance_symbol(symbol) else {
            debug!("no Binance pair for symbol, returning empty history");
            return Ok(Vec::new());
        };
        let interval = binance_interval(resolution);
        let limit = limit.clamp(1, MAX_LIMIT).to_string();

        let response = self
            .client
            .get(format!("{}/api/v3/klines", self.base_url))
            .query(&[
                ("symbol", pair),
                ("interval", interval),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(ProviderError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status,
                message: body,
            });
        }

        let klines: Vec<RawKline> = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("failed to parse klines response: {e}")))?;

        debug!(pair, interval, count = klines.len(), "klines fetched");
        Ok(klines)
    }
}
