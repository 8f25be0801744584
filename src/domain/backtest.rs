//! Backtest orchestration: the day-by-day loop over the horizon.
//!
//! Each day the universe provider is asked for eligible instruments, the top K
//! (plus any instrument still holding a position) are replayed candle by candle
//! through the [`PositionManager`], and the ledger is snapshotted at the day
//! boundary. Open positions are force-liquidated when the horizon ends.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Duration, NaiveDate, NaiveTime};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::candle::InstrumentSnapshot;
use super::config_validation::{validate_backtest_config, validate_strategy};
use super::error::BotsimError;
use super::execution::{ExecutionConfig, PositionManager};
use super::ledger::{CapitalLedger, DailyValue};
use super::metrics::{self, TradeStats};
use super::position::Trade;
use super::strategy::{Strategy, StrategyKind};
use super::universe::select_candidates;
use crate::ports::data_port::MarketDataPort;
use crate::ports::intent_port::TradeIntentSink;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub horizon_days: u32,
    pub initial_capital: f64,
    /// Last simulated day, inclusive.
    pub end_date: NaiveDate,
    pub top_k: usize,
    pub candle_interval_minutes: u32,
    pub max_age_hours: u32,
    pub min_market_cap: f64,
    pub execution: ExecutionConfig,
    /// Seed for any stochastic data source feeding the run.
    pub seed: u64,
}

impl BacktestConfig {
    pub fn new(end_date: NaiveDate) -> Self {
        BacktestConfig {
            horizon_days: 7,
            initial_capital: 1_000.0,
            end_date,
            top_k: 3,
            candle_interval_minutes: 5,
            max_age_hours: 24,
            min_market_cap: 50_000.0,
            execution: ExecutionConfig::default(),
            seed: 42,
        }
    }

    /// Simulated days, oldest first.
    pub fn days(&self) -> Vec<NaiveDate> {
        (0..self.horizon_days)
            .rev()
            .map(|back| self.end_date - Duration::days(i64::from(back)))
            .collect()
    }
}

/// Cooperative cancellation, checked between days.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything one run needs, owned by the caller.
#[derive(Clone, Copy)]
pub struct RunContext<'a> {
    pub config: &'a BacktestConfig,
    pub strategy: &'a Strategy,
    pub market: &'a dyn MarketDataPort,
    pub intents: Option<&'a dyn TradeIntentSink>,
    pub cancel: Option<&'a CancelToken>,
}

impl<'a> RunContext<'a> {
    pub fn new(
        config: &'a BacktestConfig,
        strategy: &'a Strategy,
        market: &'a dyn MarketDataPort,
    ) -> Self {
        RunContext {
            config,
            strategy,
            market,
            intents: None,
            cancel: None,
        }
    }

    pub fn with_intents(mut self, sink: &'a dyn TradeIntentSink) -> Self {
        self.intents = Some(sink);
        self
    }

    pub fn with_cancel(mut self, token: &'a CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(CancelToken::is_cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled { completed_days: usize },
    Failed { reason: String, retryable: bool },
}

impl RunStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    EmptyUniverse,
    NoCandles,
    InvariantViolation,
    LiquidationFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub date: NaiveDate,
    pub instrument_id: Option<String>,
    pub kind: DiagnosticKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub strategy: StrategyKind,
    pub status: RunStatus,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub profit_percent: f64,
    pub trades: Vec<Trade>,
    pub daily_series: Vec<DailyValue>,
    /// `None` until at least one buy/sell round trip completes.
    pub success_rate: Option<f64>,
    pub max_drawdown_percent: f64,
    pub stats: TradeStats,
    pub diagnostics: Vec<Diagnostic>,
}

/// Runs one strategy over the configured horizon. Never fails: market-data
/// errors end the run with [`RunStatus::Failed`] and whatever was accumulated.
pub fn run_backtest(ctx: &RunContext<'_>) -> SimulationResult {
    let config = ctx.config;
    let kind = ctx.strategy.kind();
    let mut manager = PositionManager::new(ctx.strategy, &config.execution);
    if let Some(sink) = ctx.intents {
        manager = manager.with_intents(sink);
    }

    let mut ledger = CapitalLedger::new(config.initial_capital);
    let mut diagnostics = Vec::new();
    let mut known: BTreeMap<String, InstrumentSnapshot> = BTreeMap::new();
    let mut status = RunStatus::Completed;
    let mut last_day_replayed = false;
    let days = config.days();

    info!(strategy = %kind, days = days.len(), capital = config.initial_capital, "starting backtest");

    'days: for (index, &day) in days.iter().enumerate() {
        if ctx.is_cancelled() {
            info!(strategy = %kind, completed_days = index, "run cancelled");
            status = RunStatus::Cancelled {
                completed_days: index,
            };
            break;
        }

        let universe = match ctx.market.get_instrument_universe(
            day,
            config.max_age_hours,
            config.min_market_cap,
        ) {
            Ok(universe) => universe,
            Err(e) => {
                error!(strategy = %kind, %day, error = %e, "universe fetch failed");
                status = RunStatus::Failed {
                    reason: e.to_string(),
                    retryable: e.is_retryable(),
                };
                break;
            }
        };

        if universe.is_empty() {
            debug!(%day, "empty universe, flat day");
            diagnostics.push(Diagnostic {
                date: day,
                instrument_id: None,
                kind: DiagnosticKind::EmptyUniverse,
                message: "no eligible instruments".to_string(),
            });
            ledger.snapshot(day);
            last_day_replayed = false;
            continue;
        }

        for snapshot in &universe {
            known.insert(snapshot.address.clone(), snapshot.clone());
        }

        let mut candidates = select_candidates(kind, &universe, config.top_k);
        for held in ledger.open_instruments() {
            if candidates.iter().any(|c| c.address == held) {
                continue;
            }
            if let Some(snapshot) = known.get(&held) {
                debug!(instrument = %held, %day, "carrying over open position");
                candidates.push(snapshot.clone());
            }
        }

        for instrument in &candidates {
            match replay_instrument(ctx, &manager, &mut ledger, instrument, day) {
                Ok(0) => diagnostics.push(Diagnostic {
                    date: day,
                    instrument_id: Some(instrument.address.clone()),
                    kind: DiagnosticKind::NoCandles,
                    message: "no candles for day".to_string(),
                }),
                Ok(_) => {}
                Err(e) if e.is_invariant_violation() => {
                    error!(instrument = %instrument.address, %day, error = %e, "replay aborted");
                    diagnostics.push(Diagnostic {
                        date: day,
                        instrument_id: Some(instrument.address.clone()),
                        kind: DiagnosticKind::InvariantViolation,
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    error!(instrument = %instrument.address, %day, error = %e, "candle fetch failed");
                    status = RunStatus::Failed {
                        reason: e.to_string(),
                        retryable: e.is_retryable(),
                    };
                    break 'days;
                }
            }
        }

        let value = ledger.snapshot(day);
        last_day_replayed = true;
        info!(strategy = %kind, %day, value, cash = ledger.cash(), open = ledger.position_count(), "day closed");
    }

    for instrument_id in ledger.open_instruments() {
        if let Err(e) = manager.liquidate(&mut ledger, &instrument_id) {
            warn!(instrument = %instrument_id, error = %e, "liquidation failed");
            diagnostics.push(Diagnostic {
                date: config.end_date,
                instrument_id: Some(instrument_id.clone()),
                kind: DiagnosticKind::LiquidationFailed,
                message: e.to_string(),
            });
        }
    }
    // An empty final day stays equal to the day before it.
    if status.is_completed() && last_day_replayed {
        ledger.restate_last();
    }

    let final_capital = ledger.total_value();
    let (_, trades, daily_series) = ledger.into_parts();
    let round_trips = metrics::round_trips(&trades);
    let stats = metrics::trade_stats(&trades, &round_trips);

    let result = SimulationResult {
        strategy: kind,
        status,
        initial_capital: config.initial_capital,
        final_capital,
        profit_percent: metrics::profit_percent(config.initial_capital, final_capital),
        success_rate: metrics::success_rate(&round_trips),
        max_drawdown_percent: metrics::max_drawdown_percent(config.initial_capital, &daily_series),
        trades,
        daily_series,
        stats,
        diagnostics,
    };
    info!(
        strategy = %kind,
        final_capital = result.final_capital,
        profit_percent = result.profit_percent,
        trades = result.trades.len(),
        "backtest finished"
    );
    result
}

/// Replays one instrument's candles for `day`. Returns the number of ticks.
fn replay_instrument(
    ctx: &RunContext<'_>,
    manager: &PositionManager<'_>,
    ledger: &mut CapitalLedger,
    instrument: &InstrumentSnapshot,
    day: NaiveDate,
) -> Result<usize, BotsimError> {
    let day_start = day.and_time(NaiveTime::MIN);
    let day_end = day_start + Duration::days(1);
    let candles: Vec<_> = ctx
        .market
        .get_candles(&instrument.address, day_start, ctx.config.candle_interval_minutes)?
        .into_iter()
        .filter(|c| c.timestamp >= day_start && c.timestamp < day_end)
        .collect();

    for end in 1..=candles.len() {
        manager.on_tick(ledger, instrument, &candles[..end])?;
    }
    Ok(candles.len())
}

/// Validates inputs, then runs `strategy_name` with defaults for everything
/// else.
pub fn run(
    strategy_name: &str,
    horizon_days: u32,
    initial_capital: f64,
    end_date: NaiveDate,
    market: &dyn MarketDataPort,
) -> Result<SimulationResult, BotsimError> {
    let strategy = Strategy::from_name(strategy_name)?;
    validate_strategy(&strategy)?;
    let config = BacktestConfig {
        horizon_days,
        initial_capital,
        ..BacktestConfig::new(end_date)
    };
    validate_backtest_config(&config)?;
    Ok(run_backtest(&RunContext::new(&config, &strategy, market)))
}

/// Runs independent strategies concurrently. Results come back in input order.
pub fn run_parallel(
    strategies: &[Strategy],
    config: &BacktestConfig,
    market: &(dyn MarketDataPort + Sync),
) -> Vec<SimulationResult> {
    strategies
        .par_iter()
        .map(|strategy| run_backtest(&RunContext::new(config, strategy, market)))
        .collect()
}
