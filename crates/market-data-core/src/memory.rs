use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::candle::{Candle, MarketSummary, Resolution, is_valid_symbol};
use crate::error::MarketDataError;
use crate::store::CandleStore;
use crate::summary;

type SeriesKey = (String, Resolution);

/// In-process candle store with the same upsert semantics as the Parquet store.
/// Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryCandleStore {
    series: RwLock<BTreeMap<SeriesKey, BTreeMap<DateTime<Utc>, Candle>>>,
}

impl MemoryCandleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored candles across all series.
    pub async fn len(&self) -> usize {
        self.series.read().await.values().map(BTreeMap::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CandleStore for MemoryCandleStore {
    async fn query(
        &self,
        symbol: &str,
        resolution: Resolution,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketDataError> {
        if !is_valid_symbol(symbol) {
            return Ok(Vec::new());
        }
        let series = self.series.read().await;
        Ok(series
            .get(&(symbol.to_string(), resolution))
            .map(|candles| candles.values().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn upsert(&self, candles: &[Candle]) -> Result<(), MarketDataError> {
        if let Some(bad) = candles.iter().find(|c| !is_valid_symbol(&c.symbol)) {
            return Err(MarketDataError::InvalidData(format!(
                "invalid symbol: {:?}",
                bad.symbol
            )));
        }
        let mut series = self.series.write().await;
        for candle in candles {
            series
                .entry((candle.symbol.clone(), candle.resolution))
                .or_default()
                .insert(candle.timestamp, candle.clone());
        }
        Ok(())
    }

    async fn summarize(&self) -> Result<MarketSummary, MarketDataError> {
        let series = self.series.read().await;
        let latest = series
            .iter()
            .filter(|((_, resolution), _)| *resolution == summary::SUMMARY_RESOLUTION)
            .filter_map(|(_, candles)| candles.values().next_back().cloned())
            .collect();
        Ok(summary::rank(latest))
    }
}
