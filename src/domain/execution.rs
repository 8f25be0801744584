//! Position management: fee-aware fills and the per-instrument exit state
//! machine.
//!
//! Entries size off available cash and the strategy's risk percentage. Exits
//! follow a fixed priority and at most one transition fires per tick:
//! stop-loss, take-profit, next partial, max holding time, momentum shift.

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use super::candle::{Candle, InstrumentSnapshot};
use super::error::BotsimError;
use super::ledger::CapitalLedger;
use super::position::{Position, ReasonCode, Trade, TradeSide};
use super::strategy::{ExitPlan, Signal, Strategy};
use crate::ports::intent_port::{TradeIntent, TradeIntentSink};

/// Remaining size at or below this is treated as fully closed.
const SIZE_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    /// Flat fee charged on each fill's notional, in percent.
    pub fee_pct: f64,
    /// Entries whose notional falls below this are skipped.
    pub min_order_value: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            fee_pct: 0.5,
            min_order_value: 1.0,
        }
    }
}

/// fee = notional * fee_pct / 100
pub fn calculate_fee(notional: f64, config: &ExecutionConfig) -> f64 {
    notional * config.fee_pct / 100.0
}

/// Result of an entry attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryResult {
    Entered { trade: Trade },
    AlreadyOpen,
    InsufficientCapital,
}

/// Opens a long position at `price`.
///
/// Size is `cash * risk_pct / 100 / price`, reduced if needed so that cost plus
/// fee never exceeds cash. A second open on the same instrument is a logged
/// no-op.
pub fn open_position(
    ledger: &mut CapitalLedger,
    instrument_id: &str,
    price: f64,
    at: NaiveDateTime,
    risk_pct: f64,
    plan: &ExitPlan,
    config: &ExecutionConfig,
) -> Result<EntryResult, BotsimError> {
    if ledger.has_position(instrument_id) {
        warn!(instrument = instrument_id, "entry ignored, position already open");
        return Ok(EntryResult::AlreadyOpen);
    }
    if !(price.is_finite() && price > 0.0) {
        return Ok(EntryResult::InsufficientCapital);
    }

    let cash = ledger.cash();
    let mut size = cash * risk_pct / 100.0 / price;
    let fee_rate = config.fee_pct / 100.0;
    if size * price * (1.0 + fee_rate) > cash {
        size = cash / (price * (1.0 + fee_rate));
    }

    let notional = size * price;
    if !(notional.is_finite() && notional >= config.min_order_value) {
        debug!(instrument = instrument_id, notional, "entry skipped, order too small");
        return Ok(EntryResult::InsufficientCapital);
    }

    let fee = calculate_fee(notional, config);
    ledger.debit(notional + fee)?;
    ledger.insert_position(Position::open(instrument_id, price, size, at, plan, fee))?;

    let trade = Trade {
        instrument_id: instrument_id.to_string(),
        side: TradeSide::Buy,
        price,
        size,
        timestamp: at,
        fee_amount: fee,
        realized_pnl: None,
        reason: ReasonCode::EntrySignal,
    };
    ledger.record_trade(trade.clone());
    info!(instrument = instrument_id, price, size, fee, "opened position");
    Ok(EntryResult::Entered { trade })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitOrder {
    Full,
    /// Release `size` units and mark partial `index` as taken.
    Partial { index: usize, size: f64 },
}

/// Closes all or part of the instrument's position at `price`.
///
/// `realized_pnl = (price - entry) * exit_size - (entry fee share + exit fee)`.
/// Exiting an instrument with no open position is a contract violation.
pub fn exit_position(
    ledger: &mut CapitalLedger,
    instrument_id: &str,
    order: ExitOrder,
    price: f64,
    at: NaiveDateTime,
    reason: ReasonCode,
    config: &ExecutionConfig,
) -> Result<Trade, BotsimError> {
    let position = ledger
        .position_mut(instrument_id)
        .ok_or_else(|| BotsimError::NoOpenPosition {
            instrument: instrument_id.to_string(),
        })?;

    let exit_size = match order {
        ExitOrder::Full => position.remaining_size,
        ExitOrder::Partial { size, .. } => size.min(position.remaining_size),
    };
    let proceeds = exit_size * price;
    let fee = calculate_fee(proceeds, config);
    let entry_share = position.entry_fee_share(exit_size);
    let pnl = (price - position.entry_price) * exit_size - (entry_share + fee);

    position.remaining_size -= exit_size;
    if let ExitOrder::Partial { index, .. } = order {
        if let Some(flag) = position.partials_taken.get_mut(index) {
            *flag = true;
        }
    }
    let closed = position.remaining_size <= SIZE_EPSILON * position.size.max(1.0);

    if closed {
        ledger.remove_position(instrument_id);
    }
    ledger.credit(proceeds - fee);

    let trade = Trade {
        instrument_id: instrument_id.to_string(),
        side: TradeSide::Sell,
        price,
        size: exit_size,
        timestamp: at,
        fee_amount: fee,
        realized_pnl: Some(pnl),
        reason,
    };
    ledger.record_trade(trade.clone());
    info!(
        instrument = instrument_id,
        price,
        size = exit_size,
        pnl,
        reason = %reason,
        closed,
        "exited position"
    );
    Ok(trade)
}

/// Picks the single exit transition for this tick, if any.
pub fn decide_exit(
    position: &Position,
    plan: &ExitPlan,
    price: f64,
    at: NaiveDateTime,
    signal: &Signal,
) -> Option<(ExitOrder, ReasonCode)> {
    if position.should_stop_loss(price) {
        return Some((ExitOrder::Full, ReasonCode::StopLoss));
    }
    if position.should_take_profit(price) {
        return Some((ExitOrder::Full, ReasonCode::TakeProfit));
    }

    let profit_pct = position.profit_pct(price);

    if let Some(index) = position.next_partial() {
        if let Some(partial) = plan.partial_exits.get(index) {
            if profit_pct >= partial.trigger_pct {
                let size = position.size * partial.fraction;
                return Some((ExitOrder::Partial { index, size }, ReasonCode::PartialTakeProfit));
            }
        }
    }

    if let Some(max_holding) = plan.max_holding {
        if position.holding_time(at) >= max_holding {
            return Some((ExitOrder::Full, ReasonCode::TimeBasedExit));
        }
    }

    if let Some(min_profit) = plan.momentum_exit_min_profit_pct {
        if signal.is_sell() && position.first_partial_taken() && profit_pct > min_profit {
            return Some((ExitOrder::Full, ReasonCode::MomentumShift));
        }
    }

    None
}

/// Drives one strategy's signals into ledger transitions.
pub struct PositionManager<'a> {
    strategy: &'a Strategy,
    config: &'a ExecutionConfig,
    intents: Option<&'a dyn TradeIntentSink>,
}

impl<'a> PositionManager<'a> {
    pub fn new(strategy: &'a Strategy, config: &'a ExecutionConfig) -> Self {
        PositionManager {
            strategy,
            config,
            intents: None,
        }
    }

    pub fn with_intents(mut self, sink: &'a dyn TradeIntentSink) -> Self {
        self.intents = Some(sink);
        self
    }

    /// Processes the last candle of `window` as "now" for `instrument`.
    ///
    /// Returns the trade produced by this tick, if any.
    pub fn on_tick(
        &self,
        ledger: &mut CapitalLedger,
        instrument: &InstrumentSnapshot,
        window: &[Candle],
    ) -> Result<Option<Trade>, BotsimError> {
        let Some(last) = window.last() else {
            return Ok(None);
        };
        let id = instrument.address.as_str();
        ledger.mark(id, last.close, last.timestamp);

        let trade = match ledger.position(id) {
            Some(position) => {
                let signal = self.strategy.evaluate(window, instrument, Some(position));
                match decide_exit(
                    position,
                    self.strategy.exit_plan(),
                    last.close,
                    last.timestamp,
                    &signal,
                ) {
                    Some((order, reason)) => Some(exit_position(
                        ledger,
                        id,
                        order,
                        last.close,
                        last.timestamp,
                        reason,
                        self.config,
                    )?),
                    None => None,
                }
            }
            None => {
                let signal = self.strategy.evaluate(window, instrument, None);
                if !signal.is_buy() {
                    return Ok(None);
                }
                debug!(instrument = id, reason = %signal.reason, "buy signal");
                match open_position(
                    ledger,
                    id,
                    last.close,
                    last.timestamp,
                    signal.size_hint_percent,
                    self.strategy.exit_plan(),
                    self.config,
                )? {
                    EntryResult::Entered { trade } => Some(trade),
                    EntryResult::AlreadyOpen | EntryResult::InsufficientCapital => None,
                }
            }
        };

        if let Some(trade) = &trade {
            self.emit(trade);
        }
        Ok(trade)
    }

    /// Force-closes the instrument at its last observed price.
    pub fn liquidate(
        &self,
        ledger: &mut CapitalLedger,
        instrument_id: &str,
    ) -> Result<Trade, BotsimError> {
        let (price, at) = ledger
            .last_mark(instrument_id)
            .ok_or_else(|| BotsimError::NoPrice {
                instrument: instrument_id.to_string(),
            })?;
        let trade = exit_position(
            ledger,
            instrument_id,
            ExitOrder::Full,
            price,
            at,
            ReasonCode::EndOfHorizon,
            self.config,
        )?;
        self.emit(&trade);
        Ok(trade)
    }

    fn emit(&self, trade: &Trade) {
        if let Some(sink) = self.intents {
            sink.submit(TradeIntent::from(trade));
        }
    }
}
