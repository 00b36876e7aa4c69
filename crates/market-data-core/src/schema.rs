use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray, TimestampSecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::candle::{Candle, Resolution};
use crate::error::MarketDataError;

pub fn candle_schema() -> Schema {
    Schema::new(vec![
        Field::new(
            "timestamp",
            DataType::Timestamp(TimeUnit::Second, Some("UTC".into())),
            false,
        ),
        Field::new("open", DataType::Float64, false),
        Field::new("high", DataType::Float64, false),
        Field::new("low", DataType::Float64, false),
        Field::new("close", DataType::Float64, false),
        Field::new("volume", DataType::Float64, false),
        Field::new("symbol", DataType::Utf8, false),
        Field::new("resolution", DataType::Utf8, false),
    ])
}

pub fn candles_to_record_batch(candles: &[Candle]) -> Result<RecordBatch, MarketDataError> {
    let schema = Arc::new(candle_schema());

    let timestamps: Vec<i64> = candles.iter().map(|c| c.timestamp.timestamp()).collect();
    let column = |f: fn(&Candle) -> f64| -> ArrayRef {
        Arc::new(Float64Array::from(candles.iter().map(f).collect::<Vec<f64>>()))
    };

    let columns: Vec<ArrayRef> = vec![
        Arc::new(TimestampSecondArray::from(timestamps).with_timezone("UTC")),
        column(|c| c.open),
        column(|c| c.high),
        column(|c| c.low),
        column(|c| c.close),
        column(|c| c.volume),
        Arc::new(StringArray::from(
            candles.iter().map(|c| c.symbol.as_str()).collect::<Vec<&str>>(),
        )),
        Arc::new(StringArray::from(
            candles
                .iter()
                .map(|c| c.resolution.as_str())
                .collect::<Vec<&str>>(),
        )),
    ];

    Ok(RecordBatch::try_new(schema, columns)?)
}

fn float_column<'a>(
    batch: &'a RecordBatch,
    index: usize,
    name: &str,
) -> Result<&'a Float64Array, MarketDataError> {
    batch
        .column(index)
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| MarketDataError::InvalidData(format!("expected {name} column")))
}

fn string_column<'a>(
    batch: &'a RecordBatch,
    index: usize,
    name: &str,
) -> Result<&'a StringArray, MarketDataError> {
    batch
        .column(index)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| MarketDataError::InvalidData(format!("expected {name} column")))
}

pub fn record_batch_to_candles(batch: &RecordBatch) -> Result<Vec<Candle>, MarketDataError> {
    let expected = candle_schema().fields().len();
    if batch.num_columns() < expected {
        return Err(MarketDataError::InvalidData(format!(
            "expected {expected} columns, found {}",
            batch.num_columns()
        )));
    }

    let timestamps = batch
        .column(0)
        .as_any()
        .downcast_ref::<TimestampSecondArray>()
        .ok_or_else(|| MarketDataError::InvalidData("expected timestamp column".into()))?;

    let opens = float_column(batch, 1, "open")?;
    let highs = float_column(batch, 2, "high")?;
    let lows = float_column(batch, 3, "low")?;
    let closes = float_column(batch, 4, "close")?;
    let volumes = float_column(batch, 5, "volume")?;
    let symbols = string_column(batch, 6, "symbol")?;
    let resolutions = string_column(batch, 7, "resolution")?;

    let mut candles = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let secs = timestamps.value(i);
        let timestamp = chrono::DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| MarketDataError::InvalidData(format!("invalid timestamp: {secs}")))?;
        let resolution: Resolution = resolutions.value(i).parse()?;

        candles.push(Candle {
            timestamp,
            open: opens.value(i),
            high: highs.value(i),
            low: lows.value(i),
            close: closes.value(i),
            volume: volumes.value(i),
            symbol: symbols.value(i).to_string(),
            resolution,
        });
    }

    Ok(candles)
}

pub fn write_parquet(path: &Path, candles: &[Candle]) -> Result<(), MarketDataError> {
    let batch = candles_to_record_batch(candles)?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let file = std::fs::File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(())
}

pub fn read_parquet(path: &Path) -> Result<Vec<Candle>, MarketDataError> {
    let file = std::fs::File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let reader = builder.build()?;

    let mut all_candles = Vec::new();
    for batch in reader {
        let batch = batch?;
        let mut candles = record_batch_to_candles(&batch)?;
        all_candles.append(&mut candles);
    }

    Ok(all_candles)
}
