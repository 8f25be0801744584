//! Trade intent sink that only logs. Stands in for an execution service when
//! the engine runs without one.

use std::sync::Mutex;

use tracing::info;

use crate::ports::intent_port::{TradeIntent, TradeIntentSink};

#[derive(Debug, Default)]
pub struct LogIntentSink {
    submitted: Mutex<usize>,
}

impl LogIntentSink {
    pub fn new() -> Self {
        LogIntentSink::default()
    }

    pub fn submitted(&self) -> usize {
        self.submitted.lock().map(|n| *n).unwrap_or_else(|e| *e.into_inner())
    }
}

impl TradeIntentSink for LogIntentSink {
    fn submit(&self, intent: TradeIntent) {
        info!(
            instrument = %intent.instrument_id,
            side = intent.side.as_str(),
            size = intent.size,
            price_hint = intent.price_hint,
            reason = %intent.reason,
            "trade intent"
        );
        match self.submitted.lock() {
            Ok(mut n) => *n += 1,
            Err(poisoned) => *poisoned.into_inner() += 1,
        }
    }
}
