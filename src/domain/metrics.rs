//! Performance aggregation over the trade log and the daily value series.

use std::collections::{BTreeMap, VecDeque};

use chrono::NaiveDateTime;
use serde::Serialize;

use super::ledger::DailyValue;
use super::position::{Trade, TradeSide};

/// A buy lot fully consumed by one or more sells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundTrip {
    pub instrument_id: String,
    pub entry_price: f64,
    /// Size-weighted average of the sells that consumed the lot.
    pub exit_price: f64,
    pub size: f64,
    pub realized_pnl: f64,
    pub entry_timestamp: NaiveDateTime,
    pub exit_timestamp: NaiveDateTime,
}

impl RoundTrip {
    pub fn is_win(&self) -> bool {
        self.exit_price > self.entry_price
    }

    pub fn is_loss(&self) -> bool {
        self.exit_price < self.entry_price
    }

    pub fn holding_minutes(&self) -> i64 {
        (self.exit_timestamp - self.entry_timestamp).num_minutes()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeStats {
    pub trade_count: usize,
    pub completed_round_trips: usize,
    pub winning_round_trips: usize,
    pub losing_round_trips: usize,
    pub realized_pnl: f64,
    pub total_fees: f64,
    /// Gross round-trip profit over gross loss; `None` with no losing PnL.
    pub profit_factor: Option<f64>,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub avg_holding_minutes: f64,
}

/// `(final - initial) / initial * 100`
pub fn profit_percent(initial_capital: f64, final_capital: f64) -> f64 {
    if initial_capital > 0.0 {
        (final_capital - initial_capital) / initial_capital * 100.0
    } else {
        0.0
    }
}

struct OpenLot {
    price: f64,
    size: f64,
    remaining: f64,
    timestamp: NaiveDateTime,
    proceeds: f64,
    pnl: f64,
}

/// Matches sells against buys first-in first-out per instrument. Lots still
/// partly held at the end of the log are not reported.
pub fn round_trips(trades: &[Trade]) -> Vec<RoundTrip> {
    const EPS: f64 = 1e-9;
    let mut books: BTreeMap<&str, VecDeque<OpenLot>> = BTreeMap::new();
    let mut completed = Vec::new();

    for trade in trades {
        let book = books.entry(trade.instrument_id.as_str()).or_default();
        match trade.side {
            TradeSide::Buy => book.push_back(OpenLot {
                price: trade.price,
                size: trade.size,
                remaining: trade.size,
                timestamp: trade.timestamp,
                proceeds: 0.0,
                pnl: 0.0,
            }),
            TradeSide::Sell => {
                let mut unmatched = trade.size;
                let pnl = trade.realized_pnl.unwrap_or(0.0);
                while unmatched > EPS * trade.size.max(1.0) {
                    let Some(lot) = book.front_mut() else {
                        break;
                    };
                    let take = unmatched.min(lot.remaining);
                    lot.remaining -= take;
                    lot.proceeds += take * trade.price;
                    if trade.size > 0.0 {
                        lot.pnl += pnl * take / trade.size;
                    }
                    unmatched -= take;

                    if lot.remaining <= EPS * lot.size.max(1.0) {
                        if let Some(lot) = book.pop_front() {
                            completed.push(RoundTrip {
                                instrument_id: trade.instrument_id.clone(),
                                entry_price: lot.price,
                                exit_price: if lot.size > 0.0 {
                                    lot.proceeds / lot.size
                                } else {
                                    lot.price
                                },
                                size: lot.size,
                                realized_pnl: lot.pnl,
                                entry_timestamp: lot.timestamp,
                                exit_timestamp: trade.timestamp,
                            });
                        }
                    }
                }
            }
        }
    }

    completed
}

/// Percentage of completed round trips that sold above their buy price.
/// `None` when nothing has completed yet.
pub fn success_rate(round_trips: &[RoundTrip]) -> Option<f64> {
    if round_trips.is_empty() {
        return None;
    }
    let wins = round_trips.iter().filter(|rt| rt.is_win()).count();
    Some(wins as f64 / round_trips.len() as f64 * 100.0)
}

/// Largest peak-to-trough decline in percent of the peak. The running peak
/// starts at the initial capital.
pub fn max_drawdown_percent(initial_capital: f64, series: &[DailyValue]) -> f64 {
    let mut peak = initial_capital;
    let mut max_dd = 0.0_f64;
    for point in series {
        if point.value > peak {
            peak = point.value;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - point.value) / peak * 100.0);
        }
    }
    max_dd
}

pub fn trade_stats(trades: &[Trade], round_trips: &[RoundTrip]) -> TradeStats {
    let realized_pnl: f64 = trades.iter().filter_map(|t| t.realized_pnl).sum();
    let total_fees: f64 = trades.iter().map(|t| t.fee_amount).sum();

    let mut gross_win = 0.0_f64;
    let mut gross_loss = 0.0_f64;
    let mut largest_win = 0.0_f64;
    let mut largest_loss = 0.0_f64;
    for rt in round_trips {
        if rt.realized_pnl > 0.0 {
            gross_win += rt.realized_pnl;
            largest_win = largest_win.max(rt.realized_pnl);
        } else if rt.realized_pnl < 0.0 {
            gross_loss += rt.realized_pnl.abs();
            largest_loss = largest_loss.max(rt.realized_pnl.abs());
        }
    }

    let avg_holding_minutes = if round_trips.is_empty() {
        0.0
    } else {
        round_trips.iter().map(|rt| rt.holding_minutes()).sum::<i64>() as f64
            / round_trips.len() as f64
    };

    TradeStats {
        trade_count: trades.len(),
        completed_round_trips: round_trips.len(),
        winning_round_trips: round_trips.iter().filter(|rt| rt.is_win()).count(),
        losing_round_trips: round_trips.iter().filter(|rt| rt.is_loss()).count(),
        realized_pnl,
        total_fees,
        profit_factor: (gross_loss > 0.0).then(|| gross_win / gross_loss),
        largest_win,
        largest_loss,
        avg_holding_minutes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::ReasonCode;
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate};

    fn ts(minutes: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::minutes(minutes)
    }

    fn buy(id: &str, price: f64, size: f64, at: i64) -> Trade {
        Trade {
            instrument_id: id.into(),
            side: TradeSide::Buy,
            price,
            size,
            timestamp: ts(at),
            fee_amount: 0.0,
            realized_pnl: None,
            reason: ReasonCode::EntrySignal,
        }
    }

    fn sell(id: &str, price: f64, size: f64, at: i64, pnl: f64) -> Trade {
        Trade {
            instrument_id: id.into(),
            side: TradeSide::Sell,
            price,
            size,
            timestamp: ts(at),
            fee_amount: 0.0,
            realized_pnl: Some(pnl),
            reason: ReasonCode::TakeProfit,
        }
    }

    fn series(values: &[f64]) -> Vec<DailyValue> {
        values
            .iter()
            .enumerate()
            .map(|(i, &value)| DailyValue {
                date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap() + Duration::days(i as i64),
                value,
            })
            .collect()
    }

    #[test]
    fn profit_percent_basic() {
        assert_relative_eq!(profit_percent(1_000.0, 1_100.0), 10.0);
        assert_relative_eq!(profit_percent(1_000.0, 900.0), -10.0);
        assert_eq!(profit_percent(0.0, 10.0), 0.0);
    }

    #[test]
    fn partial_sells_complete_one_round_trip() {
        let trades = vec![
            buy("a", 1.0, 300.0, 0),
            sell("a", 1.6, 100.0, 10, 60.0),
            sell("a", 0.7, 200.0, 20, -60.0),
        ];
        let rts = round_trips(&trades);
        assert_eq!(rts.len(), 1);
        let rt = &rts[0];
        assert_relative_eq!(rt.exit_price, (160.0 + 140.0) / 300.0);
        assert_relative_eq!(rt.realized_pnl, 0.0);
        assert!(!rt.is_win());
        assert_eq!(rt.holding_minutes(), 20);
    }

    #[test]
    fn open_lot_not_counted() {
        let trades = vec![
            buy("a", 1.0, 100.0, 0),
            sell("a", 2.0, 100.0, 5, 100.0),
            buy("b", 1.0, 100.0, 6),
            sell("b", 1.5, 50.0, 7, 25.0),
        ];
        let rts = round_trips(&trades);
        assert_eq!(rts.len(), 1);
        assert_eq!(rts[0].instrument_id, "a");
    }

    #[test]
    fn fifo_across_instruments() {
        let trades = vec![
            buy("a", 1.0, 10.0, 0),
            buy("b", 2.0, 10.0, 1),
            sell("b", 1.0, 10.0, 2, -10.0),
            sell("a", 3.0, 10.0, 3, 20.0),
            buy("a", 3.0, 10.0, 4),
            sell("a", 3.3, 10.0, 5, 3.0),
        ];
        let rts = round_trips(&trades);
        assert_eq!(rts.len(), 3);
        assert_relative_eq!(success_rate(&rts).unwrap(), 200.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn success_rate_undefined_without_round_trips() {
        assert_eq!(success_rate(&[]), None);
        assert_eq!(success_rate(&round_trips(&[buy("a", 1.0, 1.0, 0)])), None);
    }

    #[test]
    fn drawdown_tracks_running_peak() {
        let dd = max_drawdown_percent(100.0, &series(&[110.0, 90.0, 95.0, 80.0, 100.0]));
        assert_relative_eq!(dd, (110.0 - 80.0) / 110.0 * 100.0);
    }

    #[test]
    fn drawdown_seeded_with_initial_capital() {
        let dd = max_drawdown_percent(1_000.0, &series(&[900.0, 950.0]));
        assert_relative_eq!(dd, 10.0);
        assert_eq!(max_drawdown_percent(1_000.0, &[]), 0.0);
        assert_eq!(max_drawdown_percent(1_000.0, &series(&[1_000.0, 1_200.0])), 0.0);
    }

    #[test]
    fn stats_summary() {
        let mut trades = vec![
            buy("a", 1.0, 100.0, 0),
            sell("a", 2.0, 100.0, 30, 100.0),
            buy("b", 1.0, 100.0, 40),
            sell("b", 0.5, 100.0, 50, -50.0),
        ];
        trades[0].fee_amount = 0.5;
        trades[1].fee_amount = 1.0;
        let rts = round_trips(&trades);
        let stats = trade_stats(&trades, &rts);
        assert_eq!(stats.trade_count, 4);
        assert_eq!(stats.completed_round_trips, 2);
        assert_eq!(stats.winning_round_trips, 1);
        assert_eq!(stats.losing_round_trips, 1);
        assert_relative_eq!(stats.realized_pnl, 50.0);
        assert_relative_eq!(stats.total_fees, 1.5);
        assert_eq!(stats.profit_factor, Some(2.0));
        assert_relative_eq!(stats.largest_win, 100.0);
        assert_relative_eq!(stats.largest_loss, 50.0);
        assert_relative_eq!(stats.avg_holding_minutes, 20.0);
    }

    #[test]
    fn stats_without_losses() {
        let trades = vec![buy("a", 1.0, 1.0, 0), sell("a", 2.0, 1.0, 1, 1.0)];
        let stats = trade_stats(&trades, &round_trips(&trades));
        assert_eq!(stats.profit_factor, None);
    }
}
