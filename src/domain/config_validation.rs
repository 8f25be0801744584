//! Configuration loading and validation.
//!
//! Builds a [`BacktestConfig`] and a [`Strategy`] from a [`ConfigPort`] and
//! checks every threshold before a run starts. Invalid values are reported,
//! never silently corrected.

use chrono::{Days, Duration, NaiveDate};

use crate::domain::backtest::BacktestConfig;
use crate::domain::error::BotsimError;
use crate::domain::strategy::{PartialExit, Strategy};
use crate::ports::config_port::ConfigPort;

const BACKTEST: &str = "backtest";
const STRATEGY: &str = "strategy";

fn read_f64(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<f64>, BotsimError> {
    match config.try_double(section, key) {
        None => Ok(None),
        Some(Ok(v)) if v.is_finite() => Ok(Some(v)),
        Some(Ok(v)) => Err(BotsimError::invalid(section, key, format!("{v} is not finite"))),
        Some(Err(reason)) => Err(BotsimError::invalid(section, key, reason)),
    }
}

fn read_int<T: TryFrom<i64>>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<T>, BotsimError> {
    match config.try_int(section, key) {
        None => Ok(None),
        Some(Ok(v)) => T::try_from(v)
            .map(Some)
            .map_err(|_| BotsimError::invalid(section, key, format!("{v} is out of range"))),
        Some(Err(reason)) => Err(BotsimError::invalid(section, key, reason)),
    }
}

fn minutes(section: &str, key: &str, v: i64) -> Result<Duration, BotsimError> {
    Duration::try_minutes(v)
        .ok_or_else(|| BotsimError::invalid(section, key, format!("{v} minutes is out of range")))
}

fn hours(section: &str, key: &str, v: i64) -> Result<Duration, BotsimError> {
    Duration::try_hours(v)
        .ok_or_else(|| BotsimError::invalid(section, key, format!("{v} hours is out of range")))
}

fn parse_date(value: &str, section: &str, key: &str) -> Result<NaiveDate, BotsimError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| BotsimError::invalid(section, key, format!("expected YYYY-MM-DD: {e}")))
}

/// Parses `trigger:fraction` pairs separated by commas, e.g. `60:0.5, 100:0.25`.
pub fn parse_partial_exits(value: &str) -> Result<Vec<PartialExit>, BotsimError> {
    let mut partials = Vec::new();
    for token in value.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let (trigger, fraction) = token.split_once(':').ok_or_else(|| {
            BotsimError::invalid(STRATEGY, "partial_exits", format!("expected trigger:fraction, got {token:?}"))
        })?;
        let parse = |s: &str| {
            s.trim()
                .parse::<f64>()
                .map_err(|e| BotsimError::invalid(STRATEGY, "partial_exits", format!("{s:?}: {e}")))
        };
        partials.push(PartialExit {
            trigger_pct: parse(trigger)?,
            fraction: parse(fraction)?,
        });
    }
    Ok(partials)
}

/// Reads `[backtest]`, falling back to defaults for everything but `end_date`.
pub fn load_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, BotsimError> {
    let end_date = match config.get_string(BACKTEST, "end_date") {
        Some(raw) if !raw.trim().is_empty() => parse_date(&raw, BACKTEST, "end_date")?,
        _ => return Err(BotsimError::missing(BACKTEST, "end_date")),
    };

    let mut bt = BacktestConfig::new(end_date);
    if let Some(v) = read_int(config, BACKTEST, "horizon_days")? {
        bt.horizon_days = v;
    }
    if let Some(v) = read_f64(config, BACKTEST, "initial_capital")? {
        bt.initial_capital = v;
    }
    if let Some(v) = read_f64(config, BACKTEST, "fee_pct")? {
        bt.execution.fee_pct = v;
    }
    if let Some(v) = read_f64(config, BACKTEST, "min_order_value")? {
        bt.execution.min_order_value = v;
    }
    if let Some(v) = read_int(config, BACKTEST, "top_k")? {
        bt.top_k = v;
    }
    if let Some(v) = read_int(config, BACKTEST, "candle_interval_minutes")? {
        bt.candle_interval_minutes = v;
    }
    if let Some(v) = read_int(config, BACKTEST, "max_age_hours")? {
        bt.max_age_hours = v;
    }
    if let Some(v) = read_f64(config, BACKTEST, "min_market_cap")? {
        bt.min_market_cap = v;
    }
    if let Some(v) = read_int(config, BACKTEST, "seed")? {
        bt.seed = v;
    }

    validate_backtest_config(&bt)?;
    Ok(bt)
}

/// Resolves the strategy named by `name_override` or `[strategy] name`, then
/// applies any `[strategy]` overrides.
pub fn load_strategy(
    config: &dyn ConfigPort,
    name_override: Option<&str>,
) -> Result<Strategy, BotsimError> {
    let name = match name_override {
        Some(name) => name.to_string(),
        None => config
            .get_string(STRATEGY, "name")
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| BotsimError::missing(STRATEGY, "name"))?,
    };
    let mut strategy = Strategy::from_name(&name)?;
    apply_strategy_overrides(config, &mut strategy)?;
    validate_strategy(&strategy)?;
    Ok(strategy)
}

pub fn apply_strategy_overrides(
    config: &dyn ConfigPort,
    strategy: &mut Strategy,
) -> Result<(), BotsimError> {
    if let Some(v) = read_f64(config, STRATEGY, "risk_pct")? {
        strategy.set_risk_pct(v);
    }
    if let Some(v) = read_f64(config, STRATEGY, "max_risk_pct")? {
        strategy.set_max_risk_pct(v)?;
    }

    let filter = strategy.entry_filter_mut();
    if let Some(v) = read_f64(config, STRATEGY, "min_market_cap")? {
        filter.min_market_cap = v;
    }
    if let Some(v) = read_int::<i64>(config, STRATEGY, "min_age_minutes")? {
        filter.min_age = if v > 0 {
            Some(minutes(STRATEGY, "min_age_minutes", v)?)
        } else {
            None
        };
    }
    if let Some(v) = read_int::<i64>(config, STRATEGY, "max_age_hours")? {
        filter.max_age = hours(STRATEGY, "max_age_hours", v)?;
    }

    let exits = strategy.exit_plan_mut();
    if let Some(v) = read_f64(config, STRATEGY, "stop_loss_pct")? {
        exits.stop_loss_pct = v;
    }
    if let Some(v) = read_f64(config, STRATEGY, "take_profit_pct")? {
        exits.take_profit_pct = v;
    }
    if let Some(raw) = config.get_string(STRATEGY, "partial_exits") {
        exits.partial_exits = parse_partial_exits(&raw)?;
    }
    if let Some(v) = read_int::<i64>(config, STRATEGY, "max_holding_minutes")? {
        exits.max_holding = if v != 0 {
            Some(minutes(STRATEGY, "max_holding_minutes", v)?)
        } else {
            None
        };
    }
    if let Some(v) = read_f64(config, STRATEGY, "momentum_exit_min_profit_pct")? {
        exits.momentum_exit_min_profit_pct = Some(v);
    }

    match strategy {
        Strategy::VolumeSpike(c) => {
            if let Some(v) = read_f64(config, STRATEGY, "volume_ratio")? {
                c.volume_ratio = v;
            }
            if let Some(v) = read_f64(config, STRATEGY, "large_cap_threshold")? {
                c.large_cap_threshold = v;
            }
            if let Some(v) = read_f64(config, STRATEGY, "large_cap_volume_ratio")? {
                c.large_cap_volume_ratio = v;
            }
        }
        Strategy::TrendMomentum(c) => {
            if let Some(v) = read_int(config, STRATEGY, "min_green_candles")? {
                c.min_green_candles = v;
            }
            if let Some(v) = read_f64(config, STRATEGY, "min_rise_pct")? {
                c.min_rise_pct = v;
            }
            if let Some(v) = read_int::<i64>(config, STRATEGY, "lookback_minutes")? {
                c.lookback = minutes(STRATEGY, "lookback_minutes", v)?;
            }
        }
        Strategy::DipRecovery(c) => {
            if let Some(v) = read_int(config, STRATEGY, "lookback_candles")? {
                c.lookback_candles = v;
            }
            if let Some(v) = read_f64(config, STRATEGY, "min_retrace_pct")? {
                c.min_retrace_pct = v;
            }
            if let Some(v) = read_f64(config, STRATEGY, "max_retrace_pct")? {
                c.max_retrace_pct = v;
            }
            if let Some(v) = read_f64(config, STRATEGY, "min_volume_to_cap")? {
                c.min_volume_to_cap = v;
            }
            if let Some(v) = read_int(config, STRATEGY, "volume_avg_candles")? {
                c.volume_avg_candles = v;
            }
            if let Some(v) = read_f64(config, STRATEGY, "min_volume_vs_avg")? {
                c.min_volume_vs_avg = v;
            }
        }
    }
    Ok(())
}

pub fn validate_backtest_config(config: &BacktestConfig) -> Result<(), BotsimError> {
    if !(config.initial_capital > 0.0 && config.initial_capital.is_finite()) {
        return Err(BotsimError::invalid(BACKTEST, "initial_capital", "must be positive"));
    }
    if config.horizon_days < 1 {
        return Err(BotsimError::invalid(BACKTEST, "horizon_days", "must be at least 1"));
    }
    if config
        .end_date
        .checked_sub_days(Days::new(u64::from(config.horizon_days)))
        .is_none()
    {
        return Err(BotsimError::invalid(BACKTEST, "horizon_days", "reaches before the earliest date"));
    }
    if config.top_k < 1 {
        return Err(BotsimError::invalid(BACKTEST, "top_k", "must be at least 1"));
    }
    if !(0.0..100.0).contains(&config.execution.fee_pct) {
        return Err(BotsimError::invalid(BACKTEST, "fee_pct", "must be in [0, 100)"));
    }
    if config.execution.min_order_value < 0.0 {
        return Err(BotsimError::invalid(BACKTEST, "min_order_value", "must be non-negative"));
    }
    if config.candle_interval_minutes < 1 {
        return Err(BotsimError::invalid(BACKTEST, "candle_interval_minutes", "must be at least 1"));
    }
    if config.max_age_hours < 1 {
        return Err(BotsimError::invalid(BACKTEST, "max_age_hours", "must be at least 1"));
    }
    if config.min_market_cap < 0.0 {
        return Err(BotsimError::invalid(BACKTEST, "min_market_cap", "must be non-negative"));
    }
    Ok(())
}

pub fn validate_strategy(strategy: &Strategy) -> Result<(), BotsimError> {
    let risk = strategy.risk_pct();
    if !(risk > 0.0 && risk <= 100.0) {
        return Err(BotsimError::invalid(STRATEGY, "risk_pct", "must be in (0, 100]"));
    }
    if let Some(max) = strategy.max_risk_pct() {
        if !(max >= risk && max <= 100.0) {
            return Err(BotsimError::invalid(STRATEGY, "max_risk_pct", "must be in [risk_pct, 100]"));
        }
    }

    let filter = strategy.entry_filter();
    if filter.min_market_cap < 0.0 {
        return Err(BotsimError::invalid(STRATEGY, "min_market_cap", "must be non-negative"));
    }
    if filter.max_age <= Duration::zero() {
        return Err(BotsimError::invalid(STRATEGY, "max_age_hours", "must be positive"));
    }
    if let Some(min_age) = filter.min_age {
        if min_age >= filter.max_age {
            return Err(BotsimError::invalid(STRATEGY, "min_age_minutes", "must be below max age"));
        }
    }

    let exits = strategy.exit_plan();
    if !(exits.stop_loss_pct > 0.0 && exits.stop_loss_pct < 100.0) {
        return Err(BotsimError::invalid(STRATEGY, "stop_loss_pct", "must be in (0, 100)"));
    }
    if exits.take_profit_pct <= 0.0 {
        return Err(BotsimError::invalid(STRATEGY, "take_profit_pct", "must be positive"));
    }

    let mut previous_trigger = 0.0;
    let mut fraction_total = 0.0;
    for partial in &exits.partial_exits {
        if !(partial.trigger_pct > 0.0 && partial.trigger_pct < exits.take_profit_pct) {
            return Err(BotsimError::invalid(
                STRATEGY,
                "partial_exits",
                format!("trigger {} must be in (0, take_profit_pct)", partial.trigger_pct),
            ));
        }
        if partial.trigger_pct <= previous_trigger {
            return Err(BotsimError::invalid(STRATEGY, "partial_exits", "triggers must be ascending"));
        }
        if !(partial.fraction > 0.0 && partial.fraction < 1.0) {
            return Err(BotsimError::invalid(
                STRATEGY,
                "partial_exits",
                format!("fraction {} must be in (0, 1)", partial.fraction),
            ));
        }
        previous_trigger = partial.trigger_pct;
        fraction_total += partial.fraction;
    }
    if fraction_total >= 1.0 {
        return Err(BotsimError::invalid(STRATEGY, "partial_exits", "fractions must sum below 1"));
    }

    if let Some(max_holding) = exits.max_holding {
        if max_holding <= Duration::zero() {
            return Err(BotsimError::invalid(STRATEGY, "max_holding_minutes", "must be positive"));
        }
    }

    match strategy {
        Strategy::VolumeSpike(c) => {
            if c.volume_ratio <= 0.0 || c.large_cap_volume_ratio <= 0.0 {
                return Err(BotsimError::invalid(STRATEGY, "volume_ratio", "must be positive"));
            }
        }
        Strategy::TrendMomentum(c) => {
            if c.min_green_candles < 1 {
                return Err(BotsimError::invalid(STRATEGY, "min_green_candles", "must be at least 1"));
            }
            if c.lookback <= Duration::zero() {
                return Err(BotsimError::invalid(STRATEGY, "lookback_minutes", "must be positive"));
            }
        }
        Strategy::DipRecovery(c) => {
            if c.lookback_candles < 1 {
                return Err(BotsimError::invalid(STRATEGY, "lookback_candles", "must be at least 1"));
            }
            if !(0.0 <= c.min_retrace_pct
                && c.min_retrace_pct < c.max_retrace_pct
                && c.max_retrace_pct < 100.0)
            {
                return Err(BotsimError::invalid(
                    STRATEGY,
                    "min_retrace_pct",
                    "retrace band must satisfy 0 <= min < max < 100",
                ));
            }
        }
    }
    Ok(())
}
