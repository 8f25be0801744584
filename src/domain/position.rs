//! Position lifecycle state and the immutable trade record.

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use super::strategy::ExitPlan;

/// Lifecycle of one instrument's holding. `Flat` is both the initial state
/// and the state an instrument returns to once its position is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionState {
    Flat,
    Open,
    PartiallyClosed,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub instrument_id: String,
    pub entry_price: f64,
    /// Units bought at entry. Partial-exit fractions apply to this size.
    pub size: f64,
    pub remaining_size: f64,
    pub entry_timestamp: NaiveDateTime,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    /// One flag per partial exit in the strategy's exit plan.
    pub partials_taken: Vec<bool>,
    pub entry_fee: f64,
}

impl Position {
    /// Builds a fresh position, deriving absolute stop-loss and take-profit
    /// prices from the plan's percentages.
    pub fn open(
        instrument_id: &str,
        entry_price: f64,
        size: f64,
        entry_timestamp: NaiveDateTime,
        plan: &ExitPlan,
        entry_fee: f64,
    ) -> Self {
        Position {
            instrument_id: instrument_id.to_string(),
            entry_price,
            size,
            remaining_size: size,
            entry_timestamp,
            stop_loss_price: entry_price * (1.0 - plan.stop_loss_pct / 100.0),
            take_profit_price: entry_price * (1.0 + plan.take_profit_pct / 100.0),
            partials_taken: vec![false; plan.partial_exits.len()],
            entry_fee,
        }
    }

    pub fn state(&self) -> PositionState {
        if self.remaining_size <= 0.0 {
            PositionState::Closed
        } else if self.partials_taken.iter().any(|&taken| taken) {
            PositionState::PartiallyClosed
        } else {
            PositionState::Open
        }
    }

    pub fn profit_pct(&self, price: f64) -> f64 {
        (price - self.entry_price) / self.entry_price * 100.0
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.remaining_size * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.remaining_size * (price - self.entry_price)
    }

    pub fn should_stop_loss(&self, price: f64) -> bool {
        price <= self.stop_loss_price
    }

    pub fn should_take_profit(&self, price: f64) -> bool {
        price >= self.take_profit_price
    }

    pub fn first_partial_taken(&self) -> bool {
        self.partials_taken.first().copied().unwrap_or(false)
    }

    /// Index of the next partial exit not yet taken. Partials fire in order.
    pub fn next_partial(&self) -> Option<usize> {
        self.partials_taken.iter().position(|&taken| !taken)
    }

    pub fn holding_time(&self, at: NaiveDateTime) -> Duration {
        at - self.entry_timestamp
    }

    /// Entry fee attributable to `exit_size` units.
    pub fn entry_fee_share(&self, exit_size: f64) -> f64 {
        if self.size > 0.0 {
            self.entry_fee * exit_size / self.size
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    EntrySignal,
    StopLoss,
    TakeProfit,
    PartialTakeProfit,
    TimeBasedExit,
    MomentumShift,
    EndOfHorizon,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::EntrySignal => "entry_signal",
            ReasonCode::StopLoss => "stop_loss",
            ReasonCode::TakeProfit => "take_profit",
            ReasonCode::PartialTakeProfit => "partial_take_profit",
            ReasonCode::TimeBasedExit => "time_based_exit",
            ReasonCode::MomentumShift => "momentum_shift",
            ReasonCode::EndOfHorizon => "end_of_horizon",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fill. Appended to the trade log and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub instrument_id: String,
    pub side: TradeSide,
    pub price: f64,
    pub size: f64,
    pub timestamp: NaiveDateTime,
    pub fee_amount: f64,
    /// Only set on sells.
    pub realized_pnl: Option<f64>,
    pub reason: ReasonCode,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy::PartialExit;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn plan() -> ExitPlan {
        ExitPlan {
            stop_loss_pct: 35.0,
            take_profit_pct: 140.0,
            partial_exits: vec![
                PartialExit {
                    trigger_pct: 60.0,
                    fraction: 1.0 / 3.0,
                },
                PartialExit {
                    trigger_pct: 100.0,
                    fraction: 1.0 / 3.0,
                },
            ],
            max_holding: None,
            momentum_exit_min_profit_pct: Some(0.0),
        }
    }

    fn sample_position() -> Position {
        Position::open("tok", 1.0, 300.0, ts(10, 0), &plan(), 1.5)
    }

    #[test]
    fn open_derives_levels() {
        let pos = sample_position();
        assert!((pos.stop_loss_price - 0.65).abs() < 1e-12);
        assert!((pos.take_profit_price - 2.4).abs() < 1e-12);
        assert_eq!(pos.partials_taken, vec![false, false]);
        assert_eq!(pos.remaining_size, 300.0);
        assert_eq!(pos.state(), PositionState::Open);
    }

    #[test]
    fn state_transitions() {
        let mut pos = sample_position();
        pos.partials_taken[0] = true;
        pos.remaining_size = 200.0;
        assert_eq!(pos.state(), PositionState::PartiallyClosed);
        pos.remaining_size = 0.0;
        assert_eq!(pos.state(), PositionState::Closed);
    }

    #[test]
    fn stop_loss_and_take_profit_are_inclusive() {
        let pos = sample_position();
        assert!(pos.should_stop_loss(0.60));
        assert!(pos.should_stop_loss(pos.stop_loss_price));
        assert!(!pos.should_stop_loss(0.7));
        assert!(pos.should_take_profit(2.5));
        assert!(pos.should_take_profit(pos.take_profit_price));
        assert!(!pos.should_take_profit(2.3));
    }

    #[test]
    fn partials_are_sequential() {
        let mut pos = sample_position();
        assert_eq!(pos.next_partial(), Some(0));
        pos.partials_taken[0] = true;
        assert!(pos.first_partial_taken());
        assert_eq!(pos.next_partial(), Some(1));
        pos.partials_taken[1] = true;
        assert_eq!(pos.next_partial(), None);
    }

    #[test]
    fn valuation_uses_remaining_size() {
        let mut pos = sample_position();
        pos.remaining_size = 200.0;
        assert!((pos.market_value(1.5) - 300.0).abs() < 1e-9);
        assert!((pos.unrealized_pnl(1.5) - 100.0).abs() < 1e-9);
        assert!((pos.profit_pct(1.65) - 65.0).abs() < 1e-9);
    }

    #[test]
    fn entry_fee_is_shared_pro_rata() {
        let pos = sample_position();
        assert!((pos.entry_fee_share(100.0) - 0.5).abs() < 1e-12);
        assert!((pos.entry_fee_share(300.0) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn holding_time() {
        let pos = sample_position();
        assert_eq!(pos.holding_time(ts(11, 0)), Duration::minutes(60));
    }

    #[test]
    fn reason_codes_render_snake_case() {
        assert_eq!(ReasonCode::StopLoss.as_str(), "stop_loss");
        assert_eq!(ReasonCode::TimeBasedExit.to_string(), "time_based_exit");
        assert_eq!(TradeSide::Sell.as_str(), "sell");
    }
}
