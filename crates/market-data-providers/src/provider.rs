use async_trait::async_trait;
use market_data_core::candle::Resolution;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ProviderError;

/// One history record exactly as the upstream sent it: a positional array of
/// open time (epoch ms) followed by OHLCV, numbers or numeric strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct RawKline(pub Vec<Value>);

/// Trait for fetching candle history from an external source.
#[async_trait]
pub trait CandleProvider: Send + Sync {
    /// Provider name (for logging/display).
    fn name(&self) -> &str;

    /// Fetch up to `limit` of the most recent raw records for a series.
    ///
    /// Translating `symbol` and `resolution` into provider tokens is the
    /// provider's job. A pair it cannot translate, or one without upstream
    /// data, yields an empty vec rather than an error.
    async fn fetch_history(
        &self,
        symbol: &str,
        resolution: Resolution,
        limit: usize,
    ) -> Result<Vec<RawKline>, ProviderError>;
}
