//! Daily candidate selection: rank the eligible instruments by the strategy's
//! preference order and keep the top K.

use std::cmp::Ordering;
use std::collections::HashSet;

use tracing::debug;

use super::candle::InstrumentSnapshot;
use super::strategy::StrategyKind;

/// Which snapshot field a strategy ranks by, and in which direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOrder {
    VolumeDescending,
    ChangeDescending,
    ChangeAscending,
}

impl RankOrder {
    pub fn for_strategy(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::VolumeSpike => RankOrder::VolumeDescending,
            StrategyKind::TrendMomentum => RankOrder::ChangeDescending,
            StrategyKind::DipRecovery => RankOrder::ChangeAscending,
        }
    }

    fn key(&self, snapshot: &InstrumentSnapshot) -> f64 {
        match self {
            RankOrder::VolumeDescending => snapshot.volume_24h,
            RankOrder::ChangeDescending | RankOrder::ChangeAscending => snapshot.price_change_24h,
        }
    }

    fn compare(&self, a: &InstrumentSnapshot, b: &InstrumentSnapshot) -> Ordering {
        let primary = match self {
            RankOrder::VolumeDescending | RankOrder::ChangeDescending => {
                self.key(b).total_cmp(&self.key(a))
            }
            RankOrder::ChangeAscending => self.key(a).total_cmp(&self.key(b)),
        };
        primary.then_with(|| a.address.cmp(&b.address))
    }
}

/// Top `top_k` instruments in ranking order. The first snapshot seen for an
/// address wins; snapshots with a non-finite ranking key or market cap are
/// dropped. Ties break on address so the result is deterministic.
pub fn select_candidates(
    kind: StrategyKind,
    instruments: &[InstrumentSnapshot],
    top_k: usize,
) -> Vec<InstrumentSnapshot> {
    let order = RankOrder::for_strategy(kind);
    let mut seen = HashSet::new();
    let mut ranked: Vec<&InstrumentSnapshot> = instruments
        .iter()
        .filter(|s| {
            let usable = order.key(s).is_finite() && s.estimated_market_cap.is_finite();
            if !usable {
                debug!(instrument = %s.address, "dropping snapshot with non-finite fields");
            }
            usable
        })
        .filter(|s| seen.insert(s.address.as_str()))
        .collect();

    ranked.sort_by(|a, b| order.compare(a, b));
    ranked.into_iter().take(top_k).cloned().collect()
}
