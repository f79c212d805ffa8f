//! Execution gateway port: account queries and order placement for one instrument.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::account::{AccountState, InstrumentMeta, OpenPositions};
use crate::domain::error::BarbotError;

#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    async fn account_summary(&self) -> Result<AccountState, BarbotError>;

    async fn instrument_meta(&self) -> Result<InstrumentMeta, BarbotError>;

    async fn open_positions(&self) -> Result<OpenPositions, BarbotError>;

    /// Market order with a stop-loss `stop_loss_distance` away from the fill.
    async fn open_long(&self, units: i64, stop_loss_distance: f64) -> Result<(), BarbotError>;

    async fn open_short(&self, units: i64, stop_loss_distance: f64) -> Result<(), BarbotError>;

    async fn close_long(&self) -> Result<(), BarbotError>;

    async fn close_short(&self) -> Result<(), BarbotError>;

    /// Price of one unit of `currency` in the account currency, now or at `as_of`.
    async fn conversion_rate(
        &self,
        currency: &str,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<f64, BarbotError>;
}
