//! Core domain types and logic.

pub mod account;
pub mod aggregator;
pub mod backtest;
pub mod candle;
pub mod config;
pub mod error;
pub mod granularity;
pub mod indicator;
pub mod ledger;
pub mod metrics;
pub mod risk;
pub mod signal;
pub mod strategy;
