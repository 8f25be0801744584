//! Strategy evaluation: a closed set of named decision functions mapping a
//! trailing candle window to a BUY/SELL/HOLD signal.
//!
//! Each variant carries its own configuration type. Exit thresholds are only
//! described here (see [`ExitPlan`]); the position manager applies them.

pub mod dip_recovery;
pub mod trend_momentum;
pub mod volume_spike;

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::domain::candle::{Candle, InstrumentSnapshot};
use crate::domain::error::BotsimError;
use crate::domain::position::Position;

pub use dip_recovery::DipRecoveryConfig;
pub use trend_momentum::TrendMomentumConfig;
pub use volume_spike::VolumeSpikeConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    VolumeSpike,
    TrendMomentum,
    DipRecovery,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::VolumeSpike,
        StrategyKind::TrendMomentum,
        StrategyKind::DipRecovery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::VolumeSpike => "volume_spike",
            StrategyKind::TrendMomentum => "trend_momentum",
            StrategyKind::DipRecovery => "dip_recovery",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = BotsimError;

    /// Accepts canonical names plus the legacy bot ids.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "volume_spike" | "volume_tracker" => Ok(StrategyKind::VolumeSpike),
            "trend_momentum" | "momentum_bot" | "trend_surfer" => Ok(StrategyKind::TrendMomentum),
            "dip_recovery" | "dip_hunter" => Ok(StrategyKind::DipRecovery),
            _ => Err(BotsimError::UnknownStrategy {
                name: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub action: Action,
    /// Share of available cash the strategy wants committed on a BUY.
    pub size_hint_percent: f64,
    pub reason: String,
}

impl Signal {
    pub fn buy(size_hint_percent: f64, reason: impl Into<String>) -> Self {
        Signal {
            action: Action::Buy,
            size_hint_percent,
            reason: reason.into(),
        }
    }

    pub fn sell(reason: impl Into<String>) -> Self {
        Signal {
            action: Action::Sell,
            size_hint_percent: 0.0,
            reason: reason.into(),
        }
    }

    pub fn hold(reason: impl Into<String>) -> Self {
        Signal {
            action: Action::Hold,
            size_hint_percent: 0.0,
            reason: reason.into(),
        }
    }

    pub fn is_buy(&self) -> bool {
        self.action == Action::Buy
    }

    pub fn is_sell(&self) -> bool {
        self.action == Action::Sell
    }
}

/// Size hint for a BUY: `risk_pct` alone, or `risk_pct + strength_pct` capped
/// at `max_risk_pct` when scaling is configured.
pub(crate) fn scaled_risk(risk_pct: f64, max_risk_pct: Option<f64>, strength_pct: f64) -> f64 {
    match max_risk_pct {
        Some(max) => (risk_pct + strength_pct.max(0.0)).min(max),
        None => risk_pct,
    }
}

/// Release `fraction` of the original size once profit reaches `trigger_pct`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartialExit {
    pub trigger_pct: f64,
    pub fraction: f64,
}

/// Percentage exit thresholds for one strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitPlan {
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub partial_exits: Vec<PartialExit>,
    pub max_holding: Option<Duration>,
    /// When set, a SELL signal after the first partial closes the remainder
    /// provided profit is above this percentage.
    pub momentum_exit_min_profit_pct: Option<f64>,
}

/// Instrument eligibility shared by all strategies.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryFilter {
    pub min_age: Option<Duration>,
    pub max_age: Duration,
    pub min_market_cap: f64,
}

impl EntryFilter {
    /// Returns the rejection reason, or `None` when the instrument is eligible at `at`.
    pub fn rejection(&self, instrument: &InstrumentSnapshot, at: NaiveDateTime) -> Option<String> {
        let age = instrument.age_at(at);
        if let Some(min_age) = self.min_age {
            if age <= min_age {
                return Some(format!("too young ({} min)", age.num_minutes()));
            }
        }
        if age >= self.max_age {
            return Some(format!("too old ({} min)", age.num_minutes()));
        }
        if instrument.estimated_market_cap < self.min_market_cap {
            return Some(format!(
                "market cap {:.0} below {:.0}",
                instrument.estimated_market_cap, self.min_market_cap
            ));
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    VolumeSpike(VolumeSpikeConfig),
    TrendMomentum(TrendMomentumConfig),
    DipRecovery(DipRecoveryConfig),
}

impl Strategy {
    pub fn default_for(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::VolumeSpike => Strategy::VolumeSpike(VolumeSpikeConfig::default()),
            StrategyKind::TrendMomentum => Strategy::TrendMomentum(TrendMomentumConfig::default()),
            StrategyKind::DipRecovery => Strategy::DipRecovery(DipRecoveryConfig::default()),
        }
    }

    /// Unknown names fail here, before any run starts.
    pub fn from_name(name: &str) -> Result<Self, BotsimError> {
        Ok(Strategy::default_for(name.parse()?))
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::VolumeSpike(_) => StrategyKind::VolumeSpike,
            Strategy::TrendMomentum(_) => StrategyKind::TrendMomentum,
            Strategy::DipRecovery(_) => StrategyKind::DipRecovery,
        }
    }

    /// Fewest candles the strategy needs before it will emit anything but HOLD.
    pub fn min_window(&self) -> usize {
        match self {
            Strategy::VolumeSpike(c) => c.min_window(),
            Strategy::TrendMomentum(c) => c.min_window(),
            Strategy::DipRecovery(c) => c.min_window(),
        }
    }

    pub fn risk_pct(&self) -> f64 {
        match self {
            Strategy::VolumeSpike(c) => c.risk_pct,
            Strategy::TrendMomentum(c) => c.risk_pct,
            Strategy::DipRecovery(c) => c.risk_pct,
        }
    }

    pub fn exit_plan(&self) -> &ExitPlan {
        match self {
            Strategy::VolumeSpike(c) => &c.exits,
            Strategy::TrendMomentum(c) => &c.exits,
            Strategy::DipRecovery(c) => &c.exits,
        }
    }

    pub fn exit_plan_mut(&mut self) -> &mut ExitPlan {
        match self {
            Strategy::VolumeSpike(c) => &mut c.exits,
            Strategy::TrendMomentum(c) => &mut c.exits,
            Strategy::DipRecovery(c) => &mut c.exits,
        }
    }

    pub fn entry_filter(&self) -> &EntryFilter {
        match self {
            Strategy::VolumeSpike(c) => &c.filter,
            Strategy::TrendMomentum(c) => &c.filter,
            Strategy::DipRecovery(c) => &c.filter,
        }
    }

    pub fn entry_filter_mut(&mut self) -> &mut EntryFilter {
        match self {
            Strategy::VolumeSpike(c) => &mut c.filter,
            Strategy::TrendMomentum(c) => &mut c.filter,
            Strategy::DipRecovery(c) => &mut c.filter,
        }
    }

    pub fn set_risk_pct(&mut self, risk_pct: f64) {
        match self {
            Strategy::VolumeSpike(c) => c.risk_pct = risk_pct,
            Strategy::TrendMomentum(c) => c.risk_pct = risk_pct,
            Strategy::DipRecovery(c) => c.risk_pct = risk_pct,
        }
    }

    /// Upper bound for strength-scaled size hints. Volume-Spike never scales.
    pub fn max_risk_pct(&self) -> Option<f64> {
        match self {
            Strategy::VolumeSpike(_) => None,
            Strategy::TrendMomentum(c) => c.max_risk_pct,
            Strategy::DipRecovery(c) => c.max_risk_pct,
        }
    }

    pub fn set_max_risk_pct(&mut self, max_risk_pct: f64) -> Result<(), BotsimError> {
        match self {
            Strategy::VolumeSpike(_) => {
                return Err(BotsimError::invalid(
                    "strategy",
                    "max_risk_pct",
                    "volume_spike does not scale its size hint",
                ));
            }
            Strategy::TrendMomentum(c) => c.max_risk_pct = Some(max_risk_pct),
            Strategy::DipRecovery(c) => c.max_risk_pct = Some(max_risk_pct),
        }
        Ok(())
    }

    /// Evaluates the trailing `window` (oldest first, last candle is "now").
    ///
    /// With no open position the strategy looks for an entry; with one it only
    /// gives exit guidance and never emits BUY.
    pub fn evaluate(
        &self,
        window: &[Candle],
        instrument: &InstrumentSnapshot,
        open_position: Option<&Position>,
    ) -> Signal {
        if window.len() < self.min_window() {
            return Signal::hold(format!(
                "insufficient history ({} < {})",
                window.len(),
                self.min_window()
            ));
        }

        match open_position {
            Some(_) => match self {
                Strategy::TrendMomentum(c) => c.exit_guidance(window),
                _ => Signal::hold("position open"),
            },
            None => {
                let Some(last) = window.last() else {
                    return Signal::hold("empty window");
                };
                if let Some(reason) = self.entry_filter().rejection(instrument, last.timestamp) {
                    return Signal::hold(reason);
                }
                match self {
                    Strategy::VolumeSpike(c) => c.entry_signal(window, instrument),
                    Strategy::TrendMomentum(c) => c.entry_signal(window),
                    Strategy::DipRecovery(c) => c.entry_signal(window, instrument),
                }
            }
        }
    }
}

/// Free-function form of [`Strategy::evaluate`].
pub fn evaluate(
    strategy: &Strategy,
    window: &[Candle],
    instrument: &InstrumentSnapshot,
    open_position: Option<&Position>,
) -> Signal {
    strategy.evaluate(window, instrument, open_position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn instrument(cap: f64, created: NaiveDateTime) -> InstrumentSnapshot {
        InstrumentSnapshot {
            address: "tok".into(),
            symbol: "TOK".into(),
            estimated_market_cap: cap,
            volume_24h: 0.0,
            price_change_24h: 0.0,
            liquidity: 0.0,
            creation_time: created,
        }
    }

    fn candle(h: u32, m: u32, open: f64, close: f64, volume: f64) -> Candle {
        Candle {
            timestamp: ts(h, m),
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume,
        }
    }

    #[test]
    fn parses_canonical_names_and_aliases() {
        assert_eq!("volume_spike".parse::<StrategyKind>().unwrap(), StrategyKind::VolumeSpike);
        assert_eq!("volume-tracker".parse::<StrategyKind>().unwrap(), StrategyKind::VolumeSpike);
        assert_eq!("Momentum-Bot".parse::<StrategyKind>().unwrap(), StrategyKind::TrendMomentum);
        assert_eq!("trend-surfer".parse::<StrategyKind>().unwrap(), StrategyKind::TrendMomentum);
        assert_eq!("dip-hunter".parse::<StrategyKind>().unwrap(), StrategyKind::DipRecovery);
    }

    #[test]
    fn unknown_name_is_a_config_error() {
        let err = Strategy::from_name("arbitrage-finder").unwrap_err();
        assert!(matches!(err, BotsimError::UnknownStrategy { name } if name == "arbitrage-finder"));
    }

    #[test]
    fn kind_round_trips_through_default() {
        for kind in StrategyKind::ALL {
            assert_eq!(Strategy::default_for(kind).kind(), kind);
            assert_eq!(kind.as_str().parse::<StrategyKind>().unwrap(), kind);
        }
    }

    #[test]
    fn short_window_always_holds() {
        let inst = instrument(100_000.0, ts(8, 0));
        for kind in StrategyKind::ALL {
            let strategy = Strategy::default_for(kind);
            let window: Vec<Candle> = (0..strategy.min_window() - 1)
                .map(|i| candle(10, i as u32 * 5, 1.0, 2.0, 1e9))
                .collect();
            let signal = strategy.evaluate(&window, &inst, None);
            assert_eq!(signal.action, Action::Hold, "{kind}");
        }
    }

    #[test]
    fn never_buys_with_open_position() {
        let inst = instrument(100_000.0, ts(8, 0));
        let strategy = Strategy::default_for(StrategyKind::VolumeSpike);
        let window = vec![
            candle(10, 0, 1.0, 1.0, 1_000.0),
            candle(10, 5, 1.0, 1.05, 40_000.0),
        ];
        let pos = Position::open("tok", 1.0, 10.0, ts(9, 0), strategy.exit_plan(), 0.0);
        let signal = strategy.evaluate(&window, &inst, Some(&pos));
        assert_ne!(signal.action, Action::Buy);
        assert!(strategy.evaluate(&window, &inst, None).is_buy());
    }

    #[test]
    fn entry_filter_rejections() {
        let filter = EntryFilter {
            min_age: Some(Duration::minutes(30)),
            max_age: Duration::hours(24),
            min_market_cap: 50_000.0,
        };
        let young = instrument(100_000.0, ts(9, 50));
        assert!(filter.rejection(&young, ts(10, 0)).unwrap().contains("too young"));
        let old = instrument(100_000.0, ts(9, 0) - Duration::hours(30));
        assert!(filter.rejection(&old, ts(10, 0)).unwrap().contains("too old"));
        let small = instrument(10_000.0, ts(8, 0));
        assert!(filter.rejection(&small, ts(10, 0)).unwrap().contains("market cap"));
        let ok = instrument(50_000.0, ts(8, 0));
        assert!(filter.rejection(&ok, ts(10, 0)).is_none());
    }

    #[test]
    fn free_function_matches_method() {
        let inst = instrument(100_000.0, ts(8, 0));
        let strategy = Strategy::default_for(StrategyKind::VolumeSpike);
        let window = vec![
            candle(10, 0, 1.0, 1.0, 1_000.0),
            candle(10, 5, 1.0, 1.05, 40_000.0),
        ];
        assert_eq!(
            evaluate(&strategy, &window, &inst, None),
            strategy.evaluate(&window, &inst, None)
        );
    }
}
