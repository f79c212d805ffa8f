//! Market data feed port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::domain::candle::{Candle, MarketEvent, Quote};
use crate::domain::error::BarbotError;
use crate::domain::granularity::Granularity;

/// Which slice of history to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryRequest {
    /// The newest `n` candles.
    Count(usize),
    /// Every candle starting at or after this time.
    From(DateTime<Utc>),
}

/// One item of a venue push stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeedEvent {
    Market(MarketEvent),
    Quote(Quote),
}

/// Per-instrument market data.
#[async_trait]
pub trait MarketDataFeed: Send + Sync {
    /// Candles in any order; callers sort them.
    async fn historical_candles(
        &self,
        request: HistoryRequest,
        granularity: Granularity,
    ) -> Result<Vec<Candle>, BarbotError>;

    async fn current_quote(&self) -> Result<Quote, BarbotError>;

    /// Push stream of ticks, heartbeats and quotes. `None` when the venue is
    /// polled instead. The stream ending means the connection dropped.
    async fn subscribe(&self) -> Result<Option<mpsc::Receiver<FeedEvent>>, BarbotError> {
        Ok(None)
    }
}
