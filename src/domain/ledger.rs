//! Capital ledger: cash, open positions, last observed prices, the trade log
//! and the daily value series for one run.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;

use super::error::BotsimError;
use super::position::{Position, Trade};

/// Debits this far past the balance, relative to it, are treated as rounding
/// rather than overdraft.
const CASH_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyValue {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CapitalLedger {
    cash: f64,
    initial_capital: f64,
    positions: BTreeMap<String, Position>,
    last_prices: BTreeMap<String, (f64, NaiveDateTime)>,
    trades: Vec<Trade>,
    daily_series: Vec<DailyValue>,
}

impl CapitalLedger {
    pub fn new(initial_capital: f64) -> Self {
        CapitalLedger {
            cash: initial_capital,
            initial_capital,
            positions: BTreeMap::new(),
            last_prices: BTreeMap::new(),
            trades: Vec::new(),
            daily_series: Vec::new(),
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn debit(&mut self, amount: f64) -> Result<(), BotsimError> {
        if !(amount.is_finite() && amount >= 0.0) {
            return Err(BotsimError::InvalidCashMovement { amount });
        }
        if amount > self.cash + CASH_TOLERANCE * self.cash.abs().max(1.0) {
            return Err(BotsimError::InsufficientCash {
                needed: amount,
                available: self.cash,
            });
        }
        self.cash = (self.cash - amount).max(0.0);
        Ok(())
    }

    pub fn credit(&mut self, amount: f64) {
        self.cash += amount;
    }

    pub fn position(&self, instrument_id: &str) -> Option<&Position> {
        self.positions.get(instrument_id)
    }

    pub fn position_mut(&mut self, instrument_id: &str) -> Option<&mut Position> {
        self.positions.get_mut(instrument_id)
    }

    pub fn has_position(&self, instrument_id: &str) -> bool {
        self.positions.contains_key(instrument_id)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Rejects a second position on the same instrument.
    pub fn insert_position(&mut self, position: Position) -> Result<(), BotsimError> {
        if self.positions.contains_key(&position.instrument_id) {
            return Err(BotsimError::DuplicatePosition {
                instrument: position.instrument_id,
            });
        }
        self.positions
            .insert(position.instrument_id.clone(), position);
        Ok(())
    }

    pub fn remove_position(&mut self, instrument_id: &str) -> Option<Position> {
        self.positions.remove(instrument_id)
    }

    /// Instruments holding an open position, in address order.
    pub fn open_instruments(&self) -> Vec<String> {
        self.positions.keys().cloned().collect()
    }

    pub fn mark(&mut self, instrument_id: &str, price: f64, at: NaiveDateTime) {
        self.last_prices
            .insert(instrument_id.to_string(), (price, at));
    }

    pub fn last_mark(&self, instrument_id: &str) -> Option<(f64, NaiveDateTime)> {
        self.last_prices.get(instrument_id).copied()
    }

    pub fn record_trade(&mut self, trade: Trade) {
        self.trades.push(trade);
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Cash plus open positions valued at their last mark (entry price if never marked).
    pub fn total_value(&self) -> f64 {
        let held: f64 = self
            .positions
            .values()
            .map(|pos| {
                let price = self
                    .last_prices
                    .get(&pos.instrument_id)
                    .map(|&(p, _)| p)
                    .unwrap_or(pos.entry_price);
                pos.market_value(price)
            })
            .sum();
        self.cash + held
    }

    pub fn snapshot(&mut self, date: NaiveDate) -> f64 {
        let value = self.total_value();
        self.daily_series.push(DailyValue { date, value });
        value
    }

    /// Overwrites the most recent snapshot, e.g. after end-of-run liquidation.
    pub fn restate_last(&mut self) {
        let value = self.total_value();
        if let Some(last) = self.daily_series.last_mut() {
            last.value = value;
        }
    }

    pub fn daily_series(&self) -> &[DailyValue] {
        &self.daily_series
    }

    pub fn into_parts(self) -> (f64, Vec<Trade>, Vec<DailyValue>) {
        (self.cash, self.trades, self.daily_series)
    }
}
