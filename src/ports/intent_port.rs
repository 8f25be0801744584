//! Execution side-effect hook: accepted transitions announced to an external
//! execution service.

use serde::Serialize;

use crate::domain::position::{ReasonCode, Trade, TradeSide};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeIntent {
    pub instrument_id: String,
    pub side: TradeSide,
    pub size: f64,
    pub price_hint: f64,
    pub reason: ReasonCode,
}

impl From<&Trade> for TradeIntent {
    fn from(trade: &Trade) -> Self {
        TradeIntent {
            instrument_id: trade.instrument_id.clone(),
            side: trade.side,
            size: trade.size,
            price_hint: trade.price,
            reason: trade.reason,
        }
    }
}

pub trait TradeIntentSink {
    fn submit(&self, intent: TradeIntent);
}
