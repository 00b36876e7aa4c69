//! Conversion of raw kline records into [`Candle`]s.
//!
//! Records are positional: `[open_time_ms, open, high, low, close, volume, ...]`.
//! Trailing fields (close time, quote volume, trade count, ...) are ignored.

use chrono::DateTime;
use market_data_core::candle::{Candle, Resolution};
use serde_json::Value;
use tracing::warn;

use crate::error::NormalizationError;
use crate::provider::RawKline;

const MIN_FIELDS: usize = 6;

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a JSON value that may be either a string or a number into `f64`.
fn parse_quantity(value: &Value, field: &'static str) -> Result<f64, NormalizationError> {
    let parsed = match value {
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    let v = parsed.ok_or_else(|| NormalizationError::NotNumeric {
        field,
        value: value_text(value),
    })?;
    if !v.is_finite() || v < 0.0 {
        return Err(NormalizationError::OutOfRange {
            field,
            value: value_text(value),
        });
    }
    Ok(v)
}

fn parse_open_time_ms(value: &Value) -> Result<i64, NormalizationError> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| NormalizationError::NotNumeric {
        field: "open_time",
        value: value_text(value),
    })
}

/// Convert one raw record into a candle for the requested series.
///
/// The provider never echoes the internal symbol, so `symbol` and
/// `resolution` come from the request. The open time is truncated to whole
/// seconds.
pub fn normalize_kline(
    raw: &RawKline,
    symbol: &str,
    resolution: Resolution,
) -> Result<Candle, NormalizationError> {
    let fields = &raw.0;
    if fields.len() < MIN_FIELDS {
        return Err(NormalizationError::TooShort {
            found: fields.len(),
            expected: MIN_FIELDS,
        });
    }

    let open_time_ms = parse_open_time_ms(&fields[0])?;
    let timestamp = DateTime::from_timestamp(open_time_ms.div_euclid(1000), 0).ok_or_else(|| {
        NormalizationError::OutOfRange {
            field: "open_time",
            value: open_time_ms.to_string(),
        }
    })?;

    Ok(Candle {
        timestamp,
        open: parse_quantity(&fields[1], "open")?,
        high: parse_quantity(&fields[2], "high")?,
        low: parse_quantity(&fields[3], "low")?,
        close: parse_quantity(&fields[4], "close")?,
        volume: parse_quantity(&fields[5], "volume")?,
        symbol: symbol.to_string(),
        resolution,
    })
}

/// Normalize a batch, dropping (and logging) records that fail conversion.
pub fn normalize_batch(raw: &[RawKline], symbol: &str, resolution: Resolution) -> Vec<Candle> {
    raw.iter()
        .enumerate()
        .filter_map(|(index, kline)| match normalize_kline(kline, symbol, resolution) {
            Ok(candle) => Some(candle),
            Err(e) => {
                warn!(symbol, %resolution, index, "skipping malformed kline: {e}");
                None
            }
        })
        .collect()
}
