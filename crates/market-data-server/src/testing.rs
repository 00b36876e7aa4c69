//! In-process fakes shared by the repository and HTTP tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use market_data_core::candle::{Candle, MarketSummary, Resolution};
use market_data_core::error::MarketDataError;
use market_data_core::store::CandleStore;
use market_data_providers::error::ProviderError;
use market_data_providers::provider::{CandleProvider, RawKline};
use serde_json::json;

pub const HOUR_MS: i64 = 3_600_000;
pub const BASE_MS: i64 = 1_736_942_400_000;

/// Symbol the fake provider treats as untranslatable.
pub const UNSUPPORTED_SYMBOL: &str = "DOGE-USD";

enum Behaviour {
    Klines(Vec<RawKline>),
    Fail,
}

/// Scripted provider that counts calls.
pub struct FakeProvider {
    behaviour: Behaviour,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeProvider {
    pub fn with_klines(klines: Vec<RawKline>) -> Arc<Self> {
        Self::slow(klines, Duration::ZERO)
    }

    pub fn slow(klines: Vec<RawKline>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            behaviour: Behaviour::Klines(klines),
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            behaviour: Behaviour::Fail,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandleProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn fetch_history(
        &self,
        symbol: &str,
        _resolution: Resolution,
        limit: usize,
    ) -> Result<Vec<RawKline>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.behaviour {
            Behaviour::Fail => Err(ProviderError::Api {
                status: 503,
                message: "upstream down".into(),
            }),
            Behaviour::Klines(_) if symbol == UNSUPPORTED_SYMBOL => Ok(Vec::new()),
            Behaviour::Klines(klines) => Ok(klines.iter().take(limit).cloned().collect()),
        }
    }
}

/// Store whose every operation fails.
pub struct BrokenStore;

#[async_trait]
impl CandleStore for BrokenStore {
    async fn query(
        &self,
        _symbol: &str,
        _resolution: Resolution,
        _limit: usize,
    ) -> Result<Vec<Candle>, MarketDataError> {
        Err(MarketDataError::InvalidData("disk on fire".into()))
    }

    async fn upsert(&self, _candles: &[Candle]) -> Result<(), MarketDataError> {
        Err(MarketDataError::InvalidData("disk on fire".into()))
    }

    async fn summarize(&self) -> Result<MarketSummary, MarketDataError> {
        Err(MarketDataError::InvalidData("disk on fire".into()))
    }
}

/// `n` hourly klines in upstream order (oldest first), starting at `BASE_MS`.
pub fn klines(n: i64) -> Vec<RawKline> {
    (0..n)
        .map(|i| {
            let price = 100.0 + i as f64;
            RawKline(
                json!([
                    BASE_MS + i * HOUR_MS,
                    price.to_string(),
                    (price + 2.0).to_string(),
                    (price - 1.0).to_string(),
                    (price + 1.0).to_string(),
                    "12.5"
                ])
                .as_array()
                .cloned()
                .unwrap_or_default(),
            )
        })
        .collect()
}
