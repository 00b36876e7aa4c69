use std::sync::Arc;

use market_data_core::candle::{Candle, MarketSummary, Resolution};
use market_data_core::error::MarketDataError;
use market_data_core::store::CandleStore;
use market_data_providers::error::ProviderError;
use market_data_providers::normalize::normalize_batch;
use market_data_providers::provider::CandleProvider;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::single_flight::SingleFlight;

/// Failures a caller of the repository can observe. Both wrap an `Arc` so a
/// single failed fetch can be handed to every coalesced waiter.
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    #[error("market data provider unavailable: {0}")]
    ProviderUnavailable(Arc<ProviderError>),

    #[error("candle store unavailable: {0}")]
    StoreUnavailable(Arc<MarketDataError>),
}

impl From<ProviderError> for RepositoryError {
    fn from(e: ProviderError) -> Self {
        Self::ProviderUnavailable(Arc::new(e))
    }
}

impl From<MarketDataError> for RepositoryError {
    fn from(e: MarketDataError) -> Self {
        Self::StoreUnavailable(Arc::new(e))
    }
}

type MissKey = (String, Resolution, usize);
type MissResult = Result<Vec<Candle>, RepositoryError>;

/// Read-through cache over a candle store, backed by an upstream provider.
///
/// A series found in the store is served from it as-is, even when it holds
/// fewer than `limit` candles. Only an empty store result falls through to the
/// provider, whose normalized candles are written back before being returned.
/// Concurrent misses for the same series and limit share one provider fetch.
pub struct MarketDataRepository {
    store: Arc<dyn CandleStore>,
    provider: Arc<dyn CandleProvider>,
    misses: SingleFlight<MissKey, MissResult>,
}

impl MarketDataRepository {
    pub fn new(store: Arc<dyn CandleStore>, provider: Arc<dyn CandleProvider>) -> Self {
        Self {
            store,
            provider,
            misses: SingleFlight::new(),
        }
    }

    /// Up to `limit` candles for the series, oldest first.
    #[instrument(skip(self), name = "repository::get_history")]
    pub async fn get_history(
        &self,
        symbol: &str,
        resolution: Resolution,
        limit: usize,
    ) -> Result<Vec<Candle>, RepositoryError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut candles = self.store.query(symbol, resolution, limit).await?;

        if candles.is_empty() {
            debug!("cache miss");
            let key = (symbol.to_string(), resolution, limit);
            candles = self
                .misses
                .run(key, || self.fetch_and_populate(symbol, resolution, limit))
                .await?;
        } else {
            debug!(count = candles.len(), "cache hit");
        }

        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }

    async fn fetch_and_populate(
        &self,
        symbol: &str,
        resolution: Resolution,
        limit: usize,
    ) -> MissResult {
        let raw = self
            .provider
            .fetch_history(symbol, resolution, limit)
            .await?;
        let candles = normalize_batch(&raw, symbol, resolution);

        info!(
            provider = self.provider.name(),
            symbol,
            %resolution,
            fetched = raw.len(),
            normalized = candles.len(),
            "populating store from provider"
        );

        if !candles.is_empty() {
            self.store.upsert(&candles).await?;
        }
        Ok(candles)
    }

    /// Market summary, always computed fresh from the store.
    pub async fn get_summary(&self) -> Result<MarketSummary, RepositoryError> {
        Ok(self.store.summarize().await?)
    }
}
