//! Seeded synthetic market data for runs without a real data source.
//!
//! Every token is derived from `(seed, address)` alone, so output does not
//! depend on call order or on which other tokens were requested. Price paths
//! follow the typical fresh-listing shape: a quiet start, a pump with a volume
//! burst, a dump, then a noisy tail with occasional small pumps.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::domain::candle::{Candle, InstrumentSnapshot};
use crate::domain::error::BotsimError;
use crate::ports::data_port::MarketDataPort;

const ADDRESS_PREFIX: &str = "syn";
const MIN_PRICE: f64 = 1e-7;
/// Length of each token's generated history.
const HISTORY_HOURS: i64 = 48;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenProfile {
    pub name: &'static str,
    /// Total pump size in percent.
    pub pump_pct: f64,
    pub pump_minutes: i64,
    pub dump_pct: f64,
    pub volatility_pct: f64,
    pub volume_burst: f64,
}

pub const PROFILES: [TokenProfile; 3] = [
    TokenProfile {
        name: "meme-coin",
        pump_pct: 5_000.0,
        pump_minutes: 30,
        dump_pct: 80.0,
        volatility_pct: 35.0,
        volume_burst: 15.0,
    },
    TokenProfile {
        name: "utility-token",
        pump_pct: 200.0,
        pump_minutes: 120,
        dump_pct: 60.0,
        volatility_pct: 20.0,
        volume_burst: 8.0,
    },
    TokenProfile {
        name: "quick-flip",
        pump_pct: 1_000.0,
        pump_minutes: 15,
        dump_pct: 90.0,
        volatility_pct: 45.0,
        volume_burst: 20.0,
    },
];

/// 64-bit FNV-1a over the seed and a key.
fn mix(seed: u64, key: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    seed.to_le_bytes()
        .iter()
        .chain(key.as_bytes())
        .fold(OFFSET, |hash, &byte| (hash ^ u64::from(byte)).wrapping_mul(PRIME))
}

#[derive(Debug, Clone, PartialEq)]
struct SyntheticToken {
    snapshot: InstrumentSnapshot,
    profile: TokenProfile,
    start_price: f64,
    quiet_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct SyntheticDataProvider {
    seed: u64,
    tokens_per_day: usize,
}

impl SyntheticDataProvider {
    pub fn new(seed: u64) -> Self {
        SyntheticDataProvider {
            seed,
            tokens_per_day: 8,
        }
    }

    pub fn with_tokens_per_day(mut self, tokens_per_day: usize) -> Self {
        self.tokens_per_day = tokens_per_day;
        self
    }

    pub fn address(day: NaiveDate, index: usize) -> String {
        format!("{ADDRESS_PREFIX}-{}-{index:02}", day.format("%Y%m%d"))
    }

    fn parse_address(address: &str) -> Option<(NaiveDate, usize)> {
        let mut parts = address.splitn(3, '-');
        if parts.next()? != ADDRESS_PREFIX {
            return None;
        }
        let day = NaiveDate::parse_from_str(parts.next()?, "%Y%m%d").ok()?;
        let index = parts.next()?.parse().ok()?;
        Some((day, index))
    }

    fn token(&self, day: NaiveDate, index: usize) -> SyntheticToken {
        let address = Self::address(day, index);
        let mut rng = StdRng::seed_from_u64(mix(self.seed, &format!("meta:{address}")));

        let profile = PROFILES[rng.gen_range(0..PROFILES.len())];
        let creation_time =
            day.and_time(NaiveTime::MIN) + Duration::minutes(rng.gen_range(0..16 * 60));
        let market_cap = rng.gen_range(40_000.0..600_000.0);

        SyntheticToken {
            snapshot: InstrumentSnapshot {
                symbol: format!("SYN{index:02}"),
                estimated_market_cap: market_cap,
                volume_24h: market_cap * rng.gen_range(0.5..3.0),
                price_change_24h: rng.gen_range(-70.0..250.0),
                liquidity: market_cap * rng.gen_range(0.05..0.3),
                creation_time,
                address,
            },
            profile,
            start_price: 1e-6 * rng.gen_range(0.5..2.0),
            quiet_minutes: rng.gen_range(30..180),
        }
    }

    fn generate_path(
        &self,
        token: &SyntheticToken,
        interval_minutes: u32,
    ) -> Result<Vec<Candle>, BotsimError> {
        let interval = i64::from(interval_minutes.max(1));
        let steps = (HISTORY_HOURS * 60 / interval) as usize;
        let profile = token.profile;
        let mut rng = StdRng::seed_from_u64(mix(
            self.seed,
            &format!("path:{}:{interval}", token.snapshot.address),
        ));
        let noise = Normal::new(0.0, profile.volatility_pct / 100.0 * 0.2).map_err(|e| {
            BotsimError::MarketData {
                reason: format!("bad volatility for {}: {e}", profile.name),
                retryable: false,
            }
        })?;

        let pump_start = (token.quiet_minutes / interval) as usize;
        let pump_len = ((profile.pump_minutes / interval) as usize).max(1);
        let pump_end = pump_start + pump_len;
        let dump_end = pump_end + (pump_len / 2).max(1);
        let base_volume = token.snapshot.estimated_market_cap * 0.02;
        let pump_target = profile.pump_pct / 100.0;

        let mut price = token.start_price;
        let mut volume = base_volume;
        let mut candles: Vec<Candle> = Vec::with_capacity(steps);
        for i in 0..steps {
            let (change, volume_mult) = if i < pump_start {
                (noise.sample(&mut rng) * 0.25, rng.gen_range(0.5..1.0))
            } else if i < pump_end {
                let progress = (i - pump_start) as f64 / pump_len as f64;
                (
                    0.1 + progress * pump_target / pump_len as f64,
                    profile.volume_burst * (1.0 + progress * 2.0),
                )
            } else if i < dump_end {
                let progress = (i - pump_end) as f64 / (dump_end - pump_end) as f64;
                (
                    -0.1 - progress * profile.dump_pct / 100.0 * 0.5,
                    profile.volume_burst * (2.0 - progress),
                )
            } else {
                let mut change = noise.sample(&mut rng);
                let mut mult = rng.gen_range(0.3..1.8);
                if rng.gen_bool(0.03) {
                    change += rng.gen_range(0.2..1.0);
                    mult *= 5.0;
                }
                (change, mult)
            };

            let open = price;
            price = (price * (1.0 + change.max(-0.9))).max(MIN_PRICE);
            volume = (volume * 0.95 + rng.r#gen::<f64>() * 5.0 * base_volume * volume_mult / 10.0)
                .max(base_volume * 0.2);
            let variation = price * profile.volatility_pct / 100.0 * rng.gen_range(0.0..0.5);

            candles.push(Candle {
                timestamp: token.snapshot.creation_time + Duration::minutes(interval * i as i64),
                open,
                high: open.max(price) + variation,
                low: (open.min(price) - variation).max(MIN_PRICE),
                close: price,
                volume,
            });
        }
        Ok(candles)
    }
}

impl MarketDataPort for SyntheticDataProvider {
    fn get_candles(
        &self,
        instrument_id: &str,
        since: NaiveDateTime,
        interval_minutes: u32,
    ) -> Result<Vec<Candle>, BotsimError> {
        let Some((day, index)) = Self::parse_address(instrument_id) else {
            return Ok(Vec::new());
        };
        if index >= self.tokens_per_day {
            return Ok(Vec::new());
        }
        let token = self.token(day, index);
        let mut candles = self.generate_path(&token, interval_minutes)?;
        candles.retain(|c| c.timestamp >= since);
        Ok(candles)
    }

    fn get_instrument_universe(
        &self,
        as_of: NaiveDate,
        max_age_hours: u32,
        min_market_cap: f64,
    ) -> Result<Vec<InstrumentSnapshot>, BotsimError> {
        let day_start = as_of.and_time(NaiveTime::MIN);
        let max_age = Duration::hours(i64::from(max_age_hours));
        let previous = as_of - Duration::days(1);
        Ok([previous, as_of]
            .into_iter()
            .flat_map(|day| (0..self.tokens_per_day).map(move |index| (day, index)))
            .map(|(day, index)| self.token(day, index).snapshot)
            .filter(|s| day_start - s.creation_time <= max_age)
            .filter(|s| s.estimated_market_cap >= min_market_cap)
            .collect())
    }
}
