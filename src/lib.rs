//! barbot: candle aggregation, signal engines, risk control and backtracking
//! for FX and spot trading.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`]. [`live`] runs one trading loop per
//! instrument on top of the ports.

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod live;
pub mod ports;
