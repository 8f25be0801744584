//! Volume-Spike: enter on a green candle whose volume is large relative to
//! the instrument's market cap.

use chrono::Duration;

use super::{EntryFilter, ExitPlan, PartialExit, Signal};
use crate::domain::candle::{Candle, InstrumentSnapshot};

#[derive(Debug, Clone, PartialEq)]
pub struct VolumeSpikeConfig {
    pub filter: EntryFilter,
    pub exits: ExitPlan,
    pub risk_pct: f64,
    /// Minimum last-candle volume as a fraction of market cap.
    pub volume_ratio: f64,
    /// Caps strictly above this use `large_cap_volume_ratio` instead.
    pub large_cap_threshold: f64,
    pub large_cap_volume_ratio: f64,
}

impl Default for VolumeSpikeConfig {
    fn default() -> Self {
        VolumeSpikeConfig {
            filter: EntryFilter {
                min_age: Some(Duration::minutes(30)),
                max_age: Duration::hours(24),
                min_market_cap: 100_000.0,
            },
            exits: ExitPlan {
                stop_loss_pct: 35.0,
                take_profit_pct: 140.0,
                partial_exits: vec![PartialExit {
                    trigger_pct: 70.0,
                    fraction: 0.5,
                }],
                max_holding: None,
                momentum_exit_min_profit_pct: None,
            },
            risk_pct: 15.0,
            volume_ratio: 0.25,
            large_cap_threshold: 500_000.0,
            large_cap_volume_ratio: 0.15,
        }
    }
}

impl VolumeSpikeConfig {
    pub fn min_window(&self) -> usize {
        2
    }

    pub fn required_ratio(&self, market_cap: f64) -> f64 {
        if market_cap > self.large_cap_threshold {
            self.large_cap_volume_ratio
        } else {
            self.volume_ratio
        }
    }

    pub(super) fn entry_signal(&self, window: &[Candle], instrument: &InstrumentSnapshot) -> Signal {
        let Some(last) = window.last() else {
            return Signal::hold("empty window");
        };
        if !last.is_green() {
            return Signal::hold("last candle not green");
        }

        let cap = instrument.estimated_market_cap;
        let ratio = self.required_ratio(cap);
        let threshold = cap * ratio;
        if last.volume < threshold {
            return Signal::hold(format!(
                "volume {:.0} below {:.0} ({:.0}% of cap)",
                last.volume,
                threshold,
                ratio * 100.0
            ));
        }

        Signal::buy(
            self.risk_pct,
            format!(
                "volume spike {:.0} >= {:.0}% of cap {:.0}",
                last.volume,
                ratio * 100.0,
                cap
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy::{Action, Strategy};
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn candle(m: u32, open: f64, close: f64, volume: f64) -> Candle {
        Candle {
            timestamp: ts(12, m),
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume,
        }
    }

    fn instrument(cap: f64) -> InstrumentSnapshot {
        InstrumentSnapshot {
            address: "spike".into(),
            symbol: "SPK".into(),
            estimated_market_cap: cap,
            volume_24h: 0.0,
            price_change_24h: 0.0,
            liquidity: 0.0,
            creation_time: ts(10, 0),
        }
    }

    fn strategy() -> Strategy {
        Strategy::VolumeSpike(VolumeSpikeConfig::default())
    }

    #[test]
    fn clean_spike_buys() {
        let window = vec![candle(0, 1.00, 1.00, 1_000.0), candle(5, 1.00, 1.05, 40_000.0)];
        let signal = strategy().evaluate(&window, &instrument(100_000.0), None);
        assert_eq!(signal.action, Action::Buy);
        assert_eq!(signal.size_hint_percent, 15.0);
    }

    #[test]
    fn volume_at_exact_threshold_buys() {
        let window = vec![candle(0, 1.0, 1.0, 1.0), candle(5, 1.0, 1.1, 25_000.0)];
        assert!(strategy().evaluate(&window, &instrument(100_000.0), None).is_buy());
    }

    #[test]
    fn red_candle_holds() {
        let window = vec![candle(0, 1.0, 1.0, 1_000.0), candle(5, 1.05, 1.00, 90_000.0)];
        let signal = strategy().evaluate(&window, &instrument(100_000.0), None);
        assert_eq!(signal.action, Action::Hold);
        assert!(signal.reason.contains("not green"));
    }

    #[test]
    fn thin_volume_holds() {
        let window = vec![candle(0, 1.0, 1.0, 1_000.0), candle(5, 1.0, 1.05, 20_000.0)];
        assert_eq!(
            strategy().evaluate(&window, &instrument(100_000.0), None).action,
            Action::Hold
        );
    }

    #[test]
    fn large_caps_use_lower_ratio() {
        let cfg = VolumeSpikeConfig::default();
        assert_eq!(cfg.required_ratio(500_000.0), 0.25);
        assert_eq!(cfg.required_ratio(600_000.0), 0.15);

        // 100k is 16.7% of 600k: enough for the large-cap ratio only.
        let window = vec![candle(0, 1.0, 1.0, 1.0), candle(5, 1.0, 1.1, 100_000.0)];
        assert!(strategy().evaluate(&window, &instrument(600_000.0), None).is_buy());
    }

    #[test]
    fn below_min_cap_holds() {
        let window = vec![candle(0, 1.0, 1.0, 1.0), candle(5, 1.0, 1.1, 90_000.0)];
        let signal = strategy().evaluate(&window, &instrument(90_000.0), None);
        assert_eq!(signal.action, Action::Hold);
        assert!(signal.reason.contains("market cap"));
    }

    #[test]
    fn single_candle_holds() {
        let window = vec![candle(5, 1.0, 1.05, 40_000.0)];
        assert_eq!(
            strategy().evaluate(&window, &instrument(100_000.0), None).action,
            Action::Hold
        );
    }
}
