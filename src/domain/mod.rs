//! Core engine: pure computation, no I/O.

pub mod candle;
pub mod position;
pub mod strategy;
pub mod ledger;
pub mod execution;
pub mod universe;
pub mod backtest;
pub mod metrics;
pub mod config_validation;
pub mod error;
