//! Market data port trait.

use chrono::{NaiveDate, NaiveDateTime};

use crate::domain::candle::{Candle, InstrumentSnapshot};
use crate::domain::error::BotsimError;

/// Source of candles and instrument metadata. Implementations own any rate
/// limiting and retry policy; the engine never retries.
pub trait MarketDataPort {
    /// Candles at or after `since`, ascending by timestamp. An instrument with
    /// no data yields an empty vector, not an error.
    fn get_candles(
        &self,
        instrument_id: &str,
        since: NaiveDateTime,
        interval_minutes: u32,
    ) -> Result<Vec<Candle>, BotsimError>;

    /// Instruments eligible as of `as_of`: no older than `max_age_hours` and
    /// with at least `min_market_cap`.
    fn get_instrument_universe(
        &self,
        as_of: NaiveDate,
        max_age_hours: u32,
        min_market_cap: f64,
    ) -> Result<Vec<InstrumentSnapshot>, BotsimError>;
}
