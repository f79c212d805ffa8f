//! Port traits: what the domain needs from the outside world.

pub mod config_port;
pub mod execution_port;
pub mod market_data_port;
