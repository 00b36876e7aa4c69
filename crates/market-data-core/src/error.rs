use thiserror::Error;

use crate::candle::Resolution;

#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("No data found for {symbol} at {resolution}")]
    NoData {
        symbol: String,
        resolution: Resolution,
    },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
