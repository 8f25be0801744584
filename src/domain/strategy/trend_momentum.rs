//! Trend-Momentum: enter after a run of green candles backed by rising volume
//! or a strong move over the lookback. The only strategy that gives exit
//! guidance on an open position.

use chrono::Duration;

use super::{EntryFilter, ExitPlan, PartialExit, Signal, scaled_risk};
use crate::domain::candle::{Candle, reference_candle, trailing_green_run};

#[derive(Debug, Clone, PartialEq)]
pub struct TrendMomentumConfig {
    pub filter: EntryFilter,
    pub exits: ExitPlan,
    pub risk_pct: f64,
    /// When set, the size hint grows by the lookback rise up to this cap.
    pub max_risk_pct: Option<f64>,
    pub min_green_candles: usize,
    pub min_rise_pct: f64,
    pub lookback: Duration,
}

impl Default for TrendMomentumConfig {
    fn default() -> Self {
        TrendMomentumConfig {
            filter: EntryFilter {
                min_age: Some(Duration::minutes(30)),
                max_age: Duration::hours(24),
                min_market_cap: 40_000.0,
            },
            exits: ExitPlan {
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
            },
            risk_pct: 15.0,
            max_risk_pct: None,
            min_green_candles: 3,
            min_rise_pct: 15.0,
            lookback: Duration::minutes(15),
        }
    }
}

impl TrendMomentumConfig {
    /// The green run plus one earlier candle to compare volume against.
    pub fn min_window(&self) -> usize {
        self.min_green_candles + 1
    }

    pub(super) fn entry_signal(&self, window: &[Candle]) -> Signal {
        let [.., prev, last] = window else {
            return Signal::hold("insufficient history");
        };

        let run = trailing_green_run(window);
        if run < self.min_green_candles {
            return Signal::hold(format!(
                "green run {run} < {}",
                self.min_green_candles
            ));
        }

        let volume_rising = last.volume > prev.volume;
        let rise_pct = reference_candle(window, last.timestamp - self.lookback)
            .map(|reference| last.change_pct_from(reference.close))
            .unwrap_or(0.0);

        let size = scaled_risk(self.risk_pct, self.max_risk_pct, rise_pct);
        if volume_rising {
            Signal::buy(size, format!("{run} green candles with rising volume"))
        } else if rise_pct >= self.min_rise_pct {
            Signal::buy(
                size,
                format!("{run} green candles, +{rise_pct:.1}% over lookback"),
            )
        } else {
            Signal::hold(format!(
                "no confirmation (volume flat, +{rise_pct:.1}% < {:.1}%)",
                self.min_rise_pct
            ))
        }
    }

    /// SELL when volume falls or the last candle turns red.
    pub(super) fn exit_guidance(&self, window: &[Candle]) -> Signal {
        let [.., prev, last] = window else {
            return Signal::hold("insufficient history");
        };
        if last.volume < prev.volume {
            Signal::sell("volume falling")
        } else if last.is_red() {
            Signal::sell("red candle")
        } else {
            Signal::hold("momentum intact")
        }
    }
}
