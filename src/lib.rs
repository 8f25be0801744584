//! botsim: strategy backtester for freshly listed DEX tokens.
//!
//! Hexagonal architecture: the engine lives in [`domain`], boundary traits in
//! [`ports`], concrete implementations in [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
