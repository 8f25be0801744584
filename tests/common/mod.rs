#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;

use botsim::domain::backtest::{BacktestConfig, CancelToken};
use botsim::domain::candle::{Candle, InstrumentSnapshot};
use botsim::domain::error::BotsimError;
use botsim::ports::data_port::MarketDataPort;
use botsim::ports::intent_port::{TradeIntent, TradeIntentSink};
use chrono::{Duration, NaiveDate, NaiveDateTime};

/// In-memory market data with per-day universes, per-instrument candles and
/// injectable failures.
#[derive(Default)]
pub struct MockMarketData {
    pub universes: BTreeMap<NaiveDate, Vec<InstrumentSnapshot>>,
    pub candles: BTreeMap<String, Vec<Candle>>,
    pub universe_errors: BTreeMap<NaiveDate, (String, bool)>,
    pub candle_errors: BTreeMap<String, (String, bool)>,
    /// Cancels the token once the universe for this date has been served.
    pub cancel_on: Option<(NaiveDate, CancelToken)>,
    pub candle_requests: Mutex<Vec<String>>,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_universe(mut self, date: NaiveDate, instruments: Vec<InstrumentSnapshot>) -> Self {
        self.universes.insert(date, instruments);
        self
    }

    pub fn with_candles(mut self, address: &str, candles: Vec<Candle>) -> Self {
        self.candles
            .entry(address.to_string())
            .or_default()
            .extend(candles);
        self
    }

    pub fn with_universe_error(mut self, date: NaiveDate, reason: &str, retryable: bool) -> Self {
        self.universe_errors
            .insert(date, (reason.to_string(), retryable));
        self
    }

    pub fn with_candle_error(mut self, address: &str, reason: &str, retryable: bool) -> Self {
        self.candle_errors
            .insert(address.to_string(), (reason.to_string(), retryable));
        self
    }

    pub fn cancel_after(mut self, date: NaiveDate, token: CancelToken) -> Self {
        self.cancel_on = Some((date, token));
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.candle_requests.lock().unwrap().clone()
    }
}

impl MarketDataPort for MockMarketData {
    fn get_candles(
        &self,
        instrument_id: &str,
        since: NaiveDateTime,
        _interval_minutes: u32,
    ) -> Result<Vec<Candle>, BotsimError> {
        self.candle_requests
            .lock()
            .unwrap()
            .push(instrument_id.to_string());
        if let Some((reason, retryable)) = self.candle_errors.get(instrument_id) {
            return Err(BotsimError::MarketData {
                reason: reason.clone(),
                retryable: *retryable,
            });
        }
        let mut candles: Vec<Candle> = self
            .candles
            .get(instrument_id)
            .map(|all| all.iter().filter(|c| c.timestamp >= since).cloned().collect())
            .unwrap_or_default();
        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }

    fn get_instrument_universe(
        &self,
        as_of: NaiveDate,
        _max_age_hours: u32,
        _min_market_cap: f64,
    ) -> Result<Vec<InstrumentSnapshot>, BotsimError> {
        if let Some((reason, retryable)) = self.universe_errors.get(&as_of) {
            return Err(BotsimError::MarketData {
                reason: reason.clone(),
                retryable: *retryable,
            });
        }
        if let Some((date, token)) = &self.cancel_on {
            if *date == as_of {
                token.cancel();
            }
        }
        Ok(self.universes.get(&as_of).cloned().unwrap_or_default())
    }
}

/// Collects every intent it receives.
#[derive(Default)]
pub struct RecordingSink {
    pub intents: Mutex<Vec<TradeIntent>>,
}

impl RecordingSink {
    pub fn take(&self) -> Vec<TradeIntent> {
        std::mem::take(&mut *self.intents.lock().unwrap())
    }
}

impl TradeIntentSink for RecordingSink {
    fn submit(&self, intent: TradeIntent) {
        self.intents.lock().unwrap().push(intent);
    }
}

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

pub fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    date(day).and_hms_opt(hour, minute, 0).unwrap()
}

pub fn candle(timestamp: NaiveDateTime, open: f64, close: f64, volume: f64) -> Candle {
    Candle {
        timestamp,
        open,
        high: open.max(close),
        low: open.min(close),
        close,
        volume,
    }
}

/// Five-minute candles starting at `start`, one per `(open, close, volume)`.
pub fn series(start: NaiveDateTime, bars: &[(f64, f64, f64)]) -> Vec<Candle> {
    bars.iter()
        .enumerate()
        .map(|(i, &(open, close, volume))| {
            candle(start + Duration::minutes(5 * i as i64), open, close, volume)
        })
        .collect()
}

pub fn instrument(
    address: &str,
    market_cap: f64,
    volume_24h: f64,
    change_24h: f64,
    created: NaiveDateTime,
) -> InstrumentSnapshot {
    InstrumentSnapshot {
        address: address.to_string(),
        symbol: address.to_uppercase(),
        estimated_market_cap: market_cap,
        volume_24h,
        price_change_24h: change_24h,
        liquidity: market_cap / 10.0,
        creation_time: created,
    }
}

/// `horizon_days` days ending on `end`, everything else default.
pub fn config(end: NaiveDate, horizon_days: u32) -> BacktestConfig {
    BacktestConfig {
        horizon_days,
        ..BacktestConfig::new(end)
    }
}
