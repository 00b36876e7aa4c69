use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::candle::{Candle, MarketSummary, Resolution, is_valid_symbol};
use crate::error::MarketDataError;
use crate::schema;
use crate::summary;

/// Persistent candle storage keyed by (symbol, resolution, timestamp).
#[async_trait]
pub trait CandleStore: Send + Sync {
    /// Up to `limit` candles for the series, most recent first.
    /// An unknown series yields an empty vec, not an error.
    async fn query(
        &self,
        symbol: &str,
        resolution: Resolution,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketDataError>;

    /// Insert or replace each candle by its identity. Safe to repeat.
    async fn upsert(&self, candles: &[Candle]) -> Result<(), MarketDataError>;

    /// Best-effort top movers; empty lists when there is no daily data.
    async fn summarize(&self) -> Result<MarketSummary, MarketDataError>;
}

/// Filesystem-backed candle store in Parquet format.
///
/// Directory layout: `{root}/{database}/{SYMBOL}/{resolution}.parquet`, one
/// file per series. Writers are serialized and replace files by rename, so
/// readers always see a complete file.
#[derive(Clone)]
pub struct ParquetCandleStore {
    data_dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl ParquetCandleStore {
    /// Create a store rooted at `root`, using the `database` subdirectory.
    pub fn new(root: impl AsRef<Path>, database: &str) -> Self {
        Self::from_data_dir(root.as_ref().join(database))
    }

    /// Create a store pointing directly at the data directory.
    pub fn from_data_dir(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path to the Parquet file for a series.
    pub fn file_path(&self, symbol: &str, resolution: Resolution) -> PathBuf {
        self.data_dir
            .join(symbol)
            .join(format!("{}.parquet", resolution.as_str()))
    }

    pub fn has_data(&self, symbol: &str, resolution: Resolution) -> bool {
        is_valid_symbol(symbol) && self.file_path(symbol, resolution).exists()
    }

    /// Read a whole series, sorted ascending by timestamp.
    pub fn read_series(
        &self,
        symbol: &str,
        resolution: Resolution,
    ) -> Result<Vec<Candle>, MarketDataError> {
        let mut candles = self.read_series_raw(symbol, resolution)?;
        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }

    /// Read a whole series in file order, as written.
    pub fn read_series_raw(
        &self,
        symbol: &str,
        resolution: Resolution,
    ) -> Result<Vec<Candle>, MarketDataError> {
        if !self.has_data(symbol, resolution) {
            return Err(MarketDataError::NoData {
                symbol: symbol.to_string(),
                resolution,
            });
        }
        schema::read_parquet(&self.file_path(symbol, resolution))
    }

    fn read_series_or_empty(
        &self,
        symbol: &str,
        resolution: Resolution,
    ) -> Result<Vec<Candle>, MarketDataError> {
        match self.read_series(symbol, resolution) {
            Ok(candles) => Ok(candles),
            Err(MarketDataError::NoData { .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Replace a series file with `candles`. Creates parent directories as needed.
    fn write_series(
        &self,
        symbol: &str,
        resolution: Resolution,
        candles: &[Candle],
    ) -> Result<(), MarketDataError> {
        let path = self.file_path(symbol, resolution);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);
        let tmp = path.with_extension(format!(
            "parquet.{}-{}.tmp",
            std::process::id(),
            WRITE_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        if let Err(e) = schema::write_parquet(&tmp, candles) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn query_blocking(
        &self,
        symbol: &str,
        resolution: Resolution,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketDataError> {
        if !is_valid_symbol(symbol) {
            return Ok(Vec::new());
        }
        let mut candles = self.read_series_or_empty(symbol, resolution)?;
        candles.reverse();
        candles.truncate(limit);
        Ok(candles)
    }

    fn upsert_blocking(&self, candles: &[Candle]) -> Result<(), MarketDataError> {
        let mut by_series: BTreeMap<(&str, Resolution), Vec<&Candle>> = BTreeMap::new();
        for candle in candles {
            if !is_valid_symbol(&candle.symbol) {
                return Err(MarketDataError::InvalidData(format!(
                    "invalid symbol: {:?}",
                    candle.symbol
                )));
            }
            by_series
                .entry((candle.symbol.as_str(), candle.resolution))
                .or_default()
                .push(candle);
        }

        for ((symbol, resolution), incoming) in by_series {
            let mut merged: BTreeMap<_, Candle> = self
                .read_series_or_empty(symbol, resolution)?
                .into_iter()
                .map(|c| (c.timestamp, c))
                .collect();
            let before = merged.len();
            for candle in incoming {
                merged.insert(candle.timestamp, candle.clone());
            }
            let series: Vec<Candle> = merged.into_values().collect();
            self.write_series(symbol, resolution, &series)?;
            tracing::debug!(
                symbol,
                %resolution,
                inserted = series.len() - before,
                total = series.len(),
                "series upserted"
            );
        }
        Ok(())
    }

    fn summarize_blocking(&self) -> Result<MarketSummary, MarketDataError> {
        let mut latest = Vec::new();
        for symbol in self.list_symbols()? {
            let series = self.read_series_or_empty(&symbol, summary::SUMMARY_RESOLUTION)?;
            if let Some(candle) = series.into_iter().next_back() {
                latest.push(candle);
            }
        }
        Ok(summary::rank(latest))
    }

    /// List all symbols that have data in the store.
    pub fn list_symbols(&self) -> Result<Vec<String>, MarketDataError> {
        if !self.data_dir.exists() {
            return Ok(Vec::new());
        }

        let mut symbols = Vec::new();
        for entry in std::fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir()
                && let Some(name) = entry.file_name().to_str()
                && is_valid_symbol(name)
            {
                symbols.push(name.to_string());
            }
        }
        symbols.sort();
        Ok(symbols)
    }

    /// List the resolutions stored for a symbol, sorted from finest to coarsest.
    pub fn list_series(&self, symbol: &str) -> Result<Vec<Resolution>, MarketDataError> {
        if !is_valid_symbol(symbol) {
            return Ok(Vec::new());
        }
        let symbol_dir = self.data_dir.join(symbol);
        if !symbol_dir.exists() {
            return Ok(Vec::new());
        }

        let mut resolutions = Vec::new();
        for entry in std::fs::read_dir(&symbol_dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if let Some(token) = name.strip_suffix(".parquet")
                && let Ok(resolution) = token.parse::<Resolution>()
            {
                resolutions.push(resolution);
            }
        }
        resolutions.sort();
        Ok(resolutions)
    }
}

#[async_trait]
impl CandleStore for ParquetCandleStore {
    async fn query(
        &self,
        symbol: &str,
        resolution: Resolution,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketDataError> {
        let store = self.clone();
        let symbol = symbol.to_string();
        tokio::task::spawn_blocking(move || store.query_blocking(&symbol, resolution, limit))
            .await?
    }

    async fn upsert(&self, candles: &[Candle]) -> Result<(), MarketDataError> {
        if candles.is_empty() {
            return Ok(());
        }
        // The guard moves into the blocking task so the lock outlives a
        // cancelled caller until the file is renamed into place.
        let guard = self.write_lock.clone().lock_owned().await;
        let store = self.clone();
        let candles = candles.to_vec();
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            store.upsert_blocking(&candles)
        })
        .await?
    }

    async fn summarize(&self) -> Result<MarketSummary, MarketDataError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.summarize_blocking()).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn hourly(symbol: &str, hour: u32, close: f64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2025, 1, 15, hour, 0, 0).unwrap(),
            open: 100.0,
            high: 120.0,
            low: 90.0,
            close,
            volume: 10.0,
            symbol: symbol.to_string(),
            resolution: Resolution::H1,
        }
    }

    fn daily(symbol: &str, day: u32, open: f64, close: f64, volume: f64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2025, 1, day, 0, 0, 0).unwrap(),
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume,
            symbol: symbol.to_string(),
            resolution: Resolution::D1,
        }
    }

    #[test]
    fn file_path_format() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetCandleStore::new(dir.path(), "market_data");
        let path = store.file_path("BTC-USD", Resolution::H1);
        let expected = dir.path().join("market_data/BTC-USD/1h.parquet");
        assert_eq!(path, expected);
    }

    #[test]
    fn read_series_missing_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetCandleStore::new(dir.path(), "db");
        let result = store.read_series("BTC-USD", Resolution::H1);
        assert!(matches!(result, Err(MarketDataError::NoData { .. })));
    }

    #[tokio::test]
    async fn query_empty_store_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetCandleStore::new(dir.path(), "db");
        let result = store.query("BTC-USD", Resolution::H1, 10).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn query_returns_most_recent_first_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetCandleStore::new(dir.path(), "db");
        let candles: Vec<Candle> = (0..5).map(|h| hourly("BTC-USD", h, 100.0)).collect();
        store.upsert(&candles).await.unwrap();

        let result = store.query("BTC-USD", Resolution::H1, 3).await.unwrap();
        let hours: Vec<_> = result.iter().map(|c| c.timestamp).collect();
        assert_eq!(
            hours,
            vec![
                candles[4].timestamp,
                candles[3].timestamp,
                candles[2].timestamp
            ]
        );
    }

    #[tokio::test]
    async fn upsert_same_identity_keeps_one_record_with_latest_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetCandleStore::new(dir.path(), "db");

        store.upsert(&[hourly("BTC-USD", 1, 101.0)]).await.unwrap();
        store.upsert(&[hourly("BTC-USD", 1, 105.0)]).await.unwrap();

        let series = store.read_series("BTC-USD", Resolution::H1).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].close, 105.0);
    }

    #[tokio::test]
    async fn upsert_merges_with_existing_series() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetCandleStore::new(dir.path(), "db");

        store
            .upsert(&[hourly("BTC-USD", 1, 1.0), hourly("BTC-USD", 2, 2.0)])
            .await
            .unwrap();
        store
            .upsert(&[hourly("BTC-USD", 2, 20.0), hourly("BTC-USD", 3, 3.0)])
            .await
            .unwrap();

        let closes: Vec<f64> = store
            .read_series("BTC-USD", Resolution::H1)
            .unwrap()
            .iter()
            .map(|c| c.close)
            .collect();
        assert_eq!(closes, vec![1.0, 20.0, 3.0]);
    }

    #[tokio::test]
    async fn series_are_kept_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetCandleStore::new(dir.path(), "db");

        store
            .upsert(&[
                hourly("BTC-USD", 1, 1.0),
                hourly("ETH-USD", 1, 2.0),
                daily("BTC-USD", 15, 1.0, 2.0, 3.0),
            ])
            .await
            .unwrap();

        assert_eq!(store.list_symbols().unwrap(), vec!["BTC-USD", "ETH-USD"]);
        assert_eq!(
            store.list_series("BTC-USD").unwrap(),
            vec![Resolution::H1, Resolution::D1]
        );
        let eth = store.query("ETH-USD", Resolution::H1, 10).await.unwrap();
        assert_eq!(eth.len(), 1);
        assert_eq!(eth[0].symbol, "ETH-USD");
    }

    #[tokio::test]
    async fn invalid_symbols_match_nothing_and_cannot_be_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetCandleStore::new(dir.path(), "db");

        let result = store.query("../escape", Resolution::H1, 10).await.unwrap();
        assert!(result.is_empty());

        let err = store.upsert(&[hourly("../escape", 1, 1.0)]).await;
        assert!(matches!(err, Err(MarketDataError::InvalidData(_))));
        assert!(!dir.path().join("escape").exists());
    }

    #[tokio::test]
    async fn upsert_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetCandleStore::new(dir.path(), "db");
        store.upsert(&[hourly("BTC-USD", 1, 1.0)]).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path().join("db/BTC-USD"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["1h.parquet"]);
    }

    #[tokio::test]
    async fn cancelled_upsert_holds_lock_until_file_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetCandleStore::new(dir.path(), "db");
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let candles: Vec<Candle> = (0..100_000)
            .map(|i| Candle {
                timestamp: start + chrono::Duration::minutes(i),
                ..hourly("BTC-USD", 0, 1.0)
            })
            .collect();
        let total = candles.len();

        let writer = {
            let store = store.clone();
            tokio::spawn(async move { store.upsert(&candles).await })
        };
        while store.write_lock.try_lock().is_ok() && !writer.is_finished() {
            tokio::task::yield_now().await;
        }
        writer.abort();
        let _ = writer.await;

        if store.write_lock.try_lock().is_ok() {
            assert!(store.has_data("BTC-USD", Resolution::H1));
        }
        let _guard = store.write_lock.lock().await;
        assert_eq!(store.read_series("BTC-USD", Resolution::H1).unwrap().len(), total);
    }

    #[test]
    fn read_series_raw_keeps_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetCandleStore::new(dir.path(), "db");
        let path = store.file_path("BTC-USD", Resolution::H1);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let rows = vec![
            hourly("BTC-USD", 3, 1.0),
            hourly("BTC-USD", 1, 1.0),
            hourly("BTC-USD", 2, 1.0),
        ];
        schema::write_parquet(&path, &rows).unwrap();

        assert_eq!(store.read_series_raw("BTC-USD", Resolution::H1).unwrap(), rows);
        let sorted = store.read_series("BTC-USD", Resolution::H1).unwrap();
        assert!(sorted.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[tokio::test]
    async fn summarize_uses_latest_daily_candle() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetCandleStore::new(dir.path(), "db");

        store
            .upsert(&[
                daily("BTC-USD", 14, 100.0, 50.0, 1.0),
                daily("BTC-USD", 15, 100.0, 110.0, 5.0),
                daily("ETH-USD", 15, 100.0, 95.0, 9.0),
                hourly("SOL-USD", 1, 500.0),
            ])
            .await
            .unwrap();

        let summary = store.summarize().await.unwrap();
        assert_eq!(summary.top_gainers.len(), 1);
        assert_eq!(summary.top_gainers[0].symbol, "BTC-USD");
        assert_eq!(summary.top_gainers[0].close, 110.0);
        assert_eq!(summary.top_losers[0].symbol, "ETH-USD");
        assert_eq!(summary.highest_volume.len(), 2);
    }

    #[tokio::test]
    async fn summarize_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetCandleStore::new(dir.path(), "db");
        assert_eq!(store.summarize().await.unwrap(), MarketSummary::default());
    }

    #[tokio::test]
    async fn concurrent_upserts_do_not_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetCandleStore::new(dir.path(), "db");
        let candles: Vec<Candle> = (0..4).map(|h| hourly("BTC-USD", h, 1.0)).collect();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            let candles = candles.clone();
            handles.push(tokio::spawn(async move { store.upsert(&candles).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.read_series("BTC-USD", Resolution::H1).unwrap().len(), 4);
    }
}
