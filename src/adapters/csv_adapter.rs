//! CSV file market data adapter.
//!
//! Layout under the base directory:
//! - `instruments.csv`: `as_of,address,symbol,market_cap,volume_24h,price_change_24h,liquidity,creation_time`
//! - `candles/<address>.csv`: `timestamp,open,high,low,close,volume`
//!
//! Candle files are read as stored; the requested interval is not resampled.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;
use tracing::debug;

use crate::domain::candle::{Candle, InstrumentSnapshot};
use crate::domain::error::BotsimError;
use crate::ports::data_port::MarketDataPort;

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(Debug, Deserialize)]
struct InstrumentRecord {
    as_of: String,
    address: String,
    symbol: String,
    market_cap: f64,
    volume_24h: f64,
    price_change_24h: f64,
    liquidity: f64,
    creation_time: String,
}

#[derive(Debug, Deserialize)]
struct CandleRecord {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, BotsimError> {
    let value = value.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .ok_or_else(|| BotsimError::MarketData {
            reason: format!("invalid timestamp: {value:?}"),
            retryable: false,
        })
}

fn csv_error(path: &std::path::Path, e: impl std::fmt::Display) -> BotsimError {
    BotsimError::MarketData {
        reason: format!("CSV parse error in {}: {}", path.display(), e),
        retryable: false,
    }
}

pub struct CsvMarketData {
    base_path: PathBuf,
}

impl CsvMarketData {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn instruments_path(&self) -> PathBuf {
        self.base_path.join("instruments.csv")
    }

    fn candles_path(&self, instrument_id: &str) -> PathBuf {
        self.base_path
            .join("candles")
            .join(format!("{instrument_id}.csv"))
    }
}

impl MarketDataPort for CsvMarketData {
    fn get_candles(
        &self,
        instrument_id: &str,
        since: NaiveDateTime,
        _interval_minutes: u32,
    ) -> Result<Vec<Candle>, BotsimError> {
        let path = self.candles_path(instrument_id);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(instrument = instrument_id, "no candle file");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(BotsimError::MarketData {
                    reason: format!("failed to read {}: {}", path.display(), e),
                    retryable: e.kind() == ErrorKind::Interrupted,
                });
            }
        };

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let mut candles = Vec::new();
        for result in rdr.deserialize::<CandleRecord>() {
            let record = result.map_err(|e| csv_error(&path, e))?;
            let timestamp = parse_timestamp(&record.timestamp)?;
            if timestamp < since {
                continue;
            }
            candles.push(Candle {
                timestamp,
                open: record.open,
                high: record.high,
                low: record.low,
                close: record.close,
                volume: record.volume,
            });
        }

        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }

    fn get_instrument_universe(
        &self,
        as_of: NaiveDate,
        max_age_hours: u32,
        min_market_cap: f64,
    ) -> Result<Vec<InstrumentSnapshot>, BotsimError> {
        let path = self.instruments_path();
        let content = fs::read_to_string(&path).map_err(|e| BotsimError::MarketData {
            reason: format!("failed to read {}: {}", path.display(), e),
            retryable: false,
        })?;

        let day_start = as_of.and_time(NaiveTime::MIN);
        let day_end = day_start + Duration::days(1);
        let oldest = day_start - Duration::hours(i64::from(max_age_hours));

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let mut universe = Vec::new();
        for result in rdr.deserialize::<InstrumentRecord>() {
            let record = result.map_err(|e| csv_error(&path, e))?;
            let row_date = NaiveDate::parse_from_str(&record.as_of, "%Y-%m-%d")
                .map_err(|e| csv_error(&path, format!("as_of {:?}: {e}", record.as_of)))?;
            if row_date != as_of {
                continue;
            }
            let creation_time = parse_timestamp(&record.creation_time)?;
            if creation_time < oldest || creation_time >= day_end {
                continue;
            }
            if record.market_cap < min_market_cap {
                continue;
            }
            universe.push(InstrumentSnapshot {
                address: record.address,
                symbol: record.symbol,
                estimated_market_cap: record.market_cap,
                volume_24h: record.volume_24h,
                price_change_24h: record.price_change_24h,
                liquidity: record.liquidity,
                creation_time,
            });
        }
        Ok(universe)
    }
}
