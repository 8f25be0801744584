//! CSV/JSON report adapter implementing ReportPort.
//!
//! Writes `trades.csv`, `daily.csv` and `summary.json` into the output
//! directory, creating it if needed.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::domain::backtest::{Diagnostic, RunStatus, SimulationResult};
use crate::domain::error::BotsimError;
use crate::domain::metrics::TradeStats;
use crate::domain::strategy::StrategyKind;
use crate::ports::report_port::ReportPort;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const TRADE_HEADER: [&str; 8] = [
    "timestamp",
    "instrument_id",
    "side",
    "price",
    "size",
    "fee_amount",
    "realized_pnl",
    "reason",
];
const DAILY_HEADER: [&str; 2] = ["date", "value"];

#[derive(Serialize)]
struct TradeRow<'a> {
    timestamp: String,
    instrument_id: &'a str,
    side: &'static str,
    price: f64,
    size: f64,
    fee_amount: f64,
    realized_pnl: Option<f64>,
    reason: &'static str,
}

#[derive(Serialize)]
struct DailyRow {
    date: String,
    value: f64,
}

/// Everything but the trade log and daily series.
#[derive(Serialize)]
pub struct Summary<'a> {
    pub strategy: StrategyKind,
    #[serde(flatten)]
    pub status: &'a RunStatus,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub profit_percent: f64,
    pub trade_count: usize,
    pub success_rate: Option<f64>,
    pub max_drawdown_percent: f64,
    pub stats: &'a TradeStats,
    pub diagnostics: &'a [Diagnostic],
}

impl<'a> From<&'a SimulationResult> for Summary<'a> {
    fn from(result: &'a SimulationResult) -> Self {
        Summary {
            strategy: result.strategy,
            status: &result.status,
            initial_capital: result.initial_capital,
            final_capital: result.final_capital,
            profit_percent: result.profit_percent,
            trade_count: result.trades.len(),
            success_rate: result.success_rate,
            max_drawdown_percent: result.max_drawdown_percent,
            stats: &result.stats,
            diagnostics: &result.diagnostics,
        }
    }
}

fn report_error(what: &str, path: &Path, e: impl std::fmt::Display) -> BotsimError {
    BotsimError::Report {
        reason: format!("failed to write {what} {}: {e}", path.display()),
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        CsvReportAdapter
    }

    /// Header written up front so empty logs still get one.
    fn writer(path: &Path, header: &[&str], what: &str) -> Result<csv::Writer<fs::File>, BotsimError> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)
            .map_err(|e| report_error(what, path, e))?;
        wtr.write_record(header)
            .map_err(|e| report_error(what, path, e))?;
        Ok(wtr)
    }

    fn write_trades(result: &SimulationResult, path: &Path) -> Result<(), BotsimError> {
        let mut wtr = Self::writer(path, &TRADE_HEADER, "trades")?;
        for trade in &result.trades {
            wtr.serialize(TradeRow {
                timestamp: trade.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                instrument_id: &trade.instrument_id,
                side: trade.side.as_str(),
                price: trade.price,
                size: trade.size,
                fee_amount: trade.fee_amount,
                realized_pnl: trade.realized_pnl,
                reason: trade.reason.as_str(),
            })
            .map_err(|e| report_error("trades", path, e))?;
        }
        wtr.flush().map_err(|e| report_error("trades", path, e))
    }

    fn write_daily(result: &SimulationResult, path: &Path) -> Result<(), BotsimError> {
        let mut wtr = Self::writer(path, &DAILY_HEADER, "daily series")?;
        for point in &result.daily_series {
            wtr.serialize(DailyRow {
                date: point.date.format("%Y-%m-%d").to_string(),
                value: point.value,
            })
            .map_err(|e| report_error("daily series", path, e))?;
        }
        wtr.flush().map_err(|e| report_error("daily series", path, e))
    }

    fn write_summary(result: &SimulationResult, path: &Path) -> Result<(), BotsimError> {
        let json = serde_json::to_string_pretty(&Summary::from(result))
            .map_err(|e| report_error("summary", path, e))?;
        fs::write(path, json).map_err(|e| report_error("summary", path, e))
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, result: &SimulationResult, output_dir: &Path) -> Result<(), BotsimError> {
        fs::create_dir_all(output_dir).map_err(|e| report_error("directory", output_dir, e))?;
        Self::write_trades(result, &output_dir.join("trades.csv"))?;
        Self::write_daily(result, &output_dir.join("daily.csv"))?;
        Self::write_summary(result, &output_dir.join("summary.json"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::DailyValue;
    use crate::domain::metrics;
    use crate::domain::position::{ReasonCode, Trade, TradeSide};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn sample_result() -> SimulationResult {
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let trades = vec![
            Trade {
                instrument_id: "tok".into(),
                side: TradeSide::Buy,
                price: 1.0,
                size: 100.0,
                timestamp: day.and_hms_opt(10, 0, 0).unwrap(),
                fee_amount: 0.5,
                realized_pnl: None,
                reason: ReasonCode::EntrySignal,
            },
            Trade {
                instrument_id: "tok".into(),
                side: TradeSide::Sell,
                price: 0.6,
                size: 100.0,
                timestamp: day.and_hms_opt(10, 30, 0).unwrap(),
                fee_amount: 0.3,
                realized_pnl: Some(-40.8),
                reason: ReasonCode::StopLoss,
            },
        ];
        let round_trips = metrics::round_trips(&trades);
        SimulationResult {
            strategy: StrategyKind::VolumeSpike,
            status: RunStatus::Completed,
            initial_capital: 1_000.0,
            final_capital: 959.2,
            profit_percent: -4.08,
            success_rate: metrics::success_rate(&round_trips),
            max_drawdown_percent: 4.08,
            stats: metrics::trade_stats(&trades, &round_trips),
            trades,
            daily_series: vec![DailyValue {
                date: day,
                value: 959.2,
            }],
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn writes_all_files() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("run");
        CsvReportAdapter::new().write(&sample_result(), &out).unwrap();

        let trades = fs::read_to_string(out.join("trades.csv")).unwrap();
        let mut lines = trades.lines();
        assert_eq!(
            lines.next().unwrap(),
            "timestamp,instrument_id,side,price,size,fee_amount,realized_pnl,reason"
        );
        assert!(lines.next().unwrap().contains(",buy,"));
        let sell = lines.next().unwrap();
        assert!(sell.starts_with("2024-03-01 10:30:00,tok,sell,"));
        assert!(sell.ends_with(",stop_loss"));

        let daily = fs::read_to_string(out.join("daily.csv")).unwrap();
        assert_eq!(daily, "date,value\n2024-03-01,959.2\n");

        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join("summary.json")).unwrap()).unwrap();
        assert_eq!(summary["strategy"], "volume_spike");
        assert_eq!(summary["status"], "completed");
        assert_eq!(summary["trade_count"], 2);
        assert_eq!(summary["success_rate"], 0.0);
        assert_eq!(summary["stats"]["completed_round_trips"], 1);
    }

    #[test]
    fn buy_rows_leave_pnl_empty() {
        let dir = TempDir::new().unwrap();
        CsvReportAdapter::new().write(&sample_result(), dir.path()).unwrap();
        let trades = fs::read_to_string(dir.path().join("trades.csv")).unwrap();
        let buy = trades.lines().nth(1).unwrap();
        assert!(buy.ends_with(",,entry_signal"));
    }

    #[test]
    fn empty_run_still_has_headers() {
        let dir = TempDir::new().unwrap();
        let mut result = sample_result();
        result.trades.clear();
        result.daily_series.clear();
        CsvReportAdapter::new().write(&result, dir.path()).unwrap();
        let trades = fs::read_to_string(dir.path().join("trades.csv")).unwrap();
        assert_eq!(trades.lines().count(), 1);
        let daily = fs::read_to_string(dir.path().join("daily.csv")).unwrap();
        assert_eq!(daily, "date,value\n");
    }

    #[test]
    fn write_many_uses_strategy_subdirectories() {
        let dir = TempDir::new().unwrap();
        let mut other = sample_result();
        other.strategy = StrategyKind::DipRecovery;
        CsvReportAdapter::new()
            .write_many(&[sample_result(), other], dir.path())
            .unwrap();
        assert!(dir.path().join("volume_spike/summary.json").exists());
        assert!(dir.path().join("dip_recovery/trades.csv").exists());
    }
}
