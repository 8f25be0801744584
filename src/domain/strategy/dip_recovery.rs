//! Dip-Recovery: buy a retrace into a band below the recent local high while
//! volume holds up.

use chrono::Duration;

use super::{EntryFilter, ExitPlan, PartialExit, Signal, scaled_risk};
use crate::domain::candle::{Candle, InstrumentSnapshot};

#[derive(Debug, Clone, PartialEq)]
pub struct DipRecoveryConfig {
    pub filter: EntryFilter,
    pub exits: ExitPlan,
    pub risk_pct: f64,
    /// When set, the size hint grows with retrace depth past `min_retrace_pct`
    /// up to this cap.
    pub max_risk_pct: Option<f64>,
    /// Number of candles before the current one searched for the local high.
    pub lookback_candles: usize,
    pub min_retrace_pct: f64,
    pub max_retrace_pct: f64,
    /// Last-candle volume floor as a fraction of market cap.
    pub min_volume_to_cap: f64,
    /// Candles averaged for the relative volume floor.
    pub volume_avg_candles: usize,
    pub min_volume_vs_avg: f64,
}

impl Default for DipRecoveryConfig {
    fn default() -> Self {
        DipRecoveryConfig {
            filter: EntryFilter {
                min_age: None,
                max_age: Duration::hours(24),
                min_market_cap: 50_000.0,
            },
            exits: ExitPlan {
                stop_loss_pct: 25.0,
                take_profit_pct: 100.0,
                partial_exits: vec![PartialExit {
                    trigger_pct: 60.0,
                    fraction: 0.5,
                }],
                max_holding: Some(Duration::minutes(60)),
                momentum_exit_min_profit_pct: None,
            },
            risk_pct: 10.0,
            max_risk_pct: None,
            lookback_candles: 10,
            min_retrace_pct: 30.0,
            max_retrace_pct: 60.0,
            min_volume_to_cap: 0.02,
            volume_avg_candles: 5,
            min_volume_vs_avg: 0.7,
        }
    }
}

impl DipRecoveryConfig {
    pub fn min_window(&self) -> usize {
        self.lookback_candles.max(self.volume_avg_candles) + 1
    }

    pub(super) fn entry_signal(&self, window: &[Candle], instrument: &InstrumentSnapshot) -> Signal {
        let Some((last, history)) = window.split_last() else {
            return Signal::hold("empty window");
        };

        let lookback = &history[history.len().saturating_sub(self.lookback_candles)..];
        let local_high = lookback.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        if lookback.is_empty() || local_high <= 0.0 {
            return Signal::hold("no local high");
        }

        let retrace_pct = (local_high - last.close) / local_high * 100.0;
        if retrace_pct < self.min_retrace_pct || retrace_pct > self.max_retrace_pct {
            return Signal::hold(format!(
                "retrace {retrace_pct:.1}% outside {:.0}-{:.0}%",
                self.min_retrace_pct, self.max_retrace_pct
            ));
        }

        let cap_floor = instrument.estimated_market_cap * self.min_volume_to_cap;
        if last.volume < cap_floor {
            return Signal::hold(format!(
                "volume {:.0} below cap floor {cap_floor:.0}",
                last.volume
            ));
        }

        let recent = &history[history.len().saturating_sub(self.volume_avg_candles)..];
        if !recent.is_empty() {
            let avg = recent.iter().map(|c| c.volume).sum::<f64>() / recent.len() as f64;
            if last.volume < avg * self.min_volume_vs_avg {
                return Signal::hold(format!(
                    "volume {:.0} below {:.0}% of average {avg:.0}",
                    last.volume,
                    self.min_volume_vs_avg * 100.0
                ));
            }
        }

        Signal::buy(
            scaled_risk(
                self.risk_pct,
                self.max_risk_pct,
                retrace_pct - self.min_retrace_pct,
            ),
            format!("dip {retrace_pct:.1}% below high {local_high:.6}"),
        )
    }
}
