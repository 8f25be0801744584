//! Candle and instrument snapshot representations.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// One OHLCV sample for one instrument. Series are ordered ascending by
/// timestamp; gaps between samples are allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// close > open
    pub fn is_green(&self) -> bool {
        self.close > self.open
    }

    /// close < open
    pub fn is_red(&self) -> bool {
        self.close < self.open
    }

    /// Percentage move from `reference` to this candle's close.
    pub fn change_pct_from(&self, reference: f64) -> f64 {
        if reference > 0.0 {
            (self.close - reference) / reference * 100.0
        } else {
            0.0
        }
    }
}

/// Point-in-time descriptive metadata used for entry eligibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSnapshot {
    pub address: String,
    pub symbol: String,
    pub estimated_market_cap: f64,
    pub volume_24h: f64,
    pub price_change_24h: f64,
    pub liquidity: f64,
    pub creation_time: NaiveDateTime,
}

impl InstrumentSnapshot {
    pub fn age_at(&self, at: NaiveDateTime) -> Duration {
        at - self.creation_time
    }
}

/// Number of consecutive green candles ending at the last candle of `window`.
pub fn trailing_green_run(window: &[Candle]) -> usize {
    window.iter().rev().take_while(|c| c.is_green()).count()
}

/// Most recent candle at or before `at`, falling back to the first candle.
pub fn reference_candle(window: &[Candle], at: NaiveDateTime) -> Option<&Candle> {
    window
        .iter()
        .rev()
        .find(|c| c.timestamp <= at)
        .or_else(|| window.first())
}
