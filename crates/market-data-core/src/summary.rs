use std::cmp::Ordering;

use crate::candle::{Candle, MarketSummary, Resolution};

/// Resolution whose latest bar represents a symbol in the summary.
pub const SUMMARY_RESOLUTION: Resolution = Resolution::D1;

/// Maximum entries per summary list.
pub const SUMMARY_SIZE: usize = 5;

/// Rank the latest daily candle of each symbol into gainers, losers and volume leaders.
///
/// Candles without a usable change ratio (zero open) only take part in the
/// volume ranking. Ties keep symbol order so the result is deterministic.
pub fn rank(mut latest: Vec<Candle>) -> MarketSummary {
    latest.sort_by(|a, b| a.symbol.cmp(&b.symbol));

    let mut gainers: Vec<(f64, &Candle)> = Vec::new();
    let mut losers: Vec<(f64, &Candle)> = Vec::new();
    for candle in &latest {
        match candle.change_ratio() {
            Some(ratio) if ratio > 0.0 => gainers.push((ratio, candle)),
            Some(ratio) if ratio < 0.0 => losers.push((ratio, candle)),
            _ => {}
        }
    }

    gainers.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    losers.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    let mut by_volume: Vec<&Candle> = latest.iter().collect();
    by_volume.sort_by(|a, b| b.volume.partial_cmp(&a.volume).unwrap_or(Ordering::Equal));

    MarketSummary {
        top_gainers: gainers
            .into_iter()
            .take(SUMMARY_SIZE)
            .map(|(_, c)| c.clone())
            .collect(),
        top_losers: losers
            .into_iter()
            .take(SUMMARY_SIZE)
            .map(|(_, c)| c.clone())
            .collect(),
        highest_volume: by_volume
            .into_iter()
            .take(SUMMARY_SIZE)
            .cloned()
            .collect(),
    }
}
