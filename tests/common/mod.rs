#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use barbot::domain::account::{AccountState, InstrumentMeta, OpenPositions, Position, Side};
use barbot::domain::candle::{Candle, HistoricalCandle, Quote};
use barbot::domain::error::BarbotError;
use barbot::domain::granularity::Granularity;
use barbot::ports::execution_port::ExecutionGateway;
use barbot::ports::market_data_port::{FeedEvent, HistoryRequest, MarketDataFeed};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::mpsc;

/// Monday, so the weekend guard leaves the market open.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap()
}

/// Candles one hour apart opening at the previous close, oldest-first.
pub fn make_candles(levels: &[f64]) -> Vec<Candle> {
    let mut prev = levels.first().copied().unwrap_or_default();
    levels
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = prev;
            prev = close;
            Candle {
                time: t0() + Duration::hours(i as i64),
                open,
                high: open.max(close) + 0.0002,
                low: open.min(close) - 0.0002,
                close,
                volume: 10.0,
            }
        })
        .collect()
}

/// Historical bars with a one-pip spread around the close, oldest-first.
pub fn make_bars(levels: &[f64]) -> Vec<HistoricalCandle> {
    make_candles(levels)
        .into_iter()
        .map(|candle| HistoricalCandle {
            bid: candle.close - 0.00005,
            ask: candle.close + 0.00005,
            candle,
        })
        .collect()
}

/// Flat, then a steady climb, a sharp fall and a bounce. 250 candles.
pub fn uptrend_then_reversal() -> Vec<f64> {
    let mut level = 1.1;
    (0..250)
        .map(|i| {
            if i >= REVERSAL_BOUNCE_START {
                level += REVERSAL_BOUNCE_STEP;
            } else if i >= REVERSAL_FALL_START {
                level -= REVERSAL_FALL_STEP;
            } else if i >= REVERSAL_CLIMB_START {
                level += REVERSAL_CLIMB_STEP;
            }
            level
        })
        .collect()
}

pub const REVERSAL_CLIMB_START: usize = 195;
pub const REVERSAL_FALL_START: usize = 220;
pub const REVERSAL_BOUNCE_START: usize = 230;
pub const REVERSAL_CLIMB_STEP: f64 = 0.001;
pub const REVERSAL_FALL_STEP: f64 = 0.002;
pub const REVERSAL_BOUNCE_STEP: f64 = 0.001;

pub fn eur_usd() -> InstrumentMeta {
    InstrumentMeta {
        name: "EUR_USD".into(),
        pip_location: -4,
        min_trailing_stop_distance: 0.0005,
        margin_rate: 0.02,
        display_precision: 5,
    }
}

pub fn account(balance: f64) -> AccountState {
    AccountState {
        balance,
        margin_rate: 0.05,
        margin_call_percent: 0.0,
        currency: "EUR".into(),
    }
}

#[derive(Default)]
struct FeedState {
    history: Vec<Candle>,
    polled: Vec<Candle>,
    quote: Option<Quote>,
    streams: Vec<mpsc::Receiver<FeedEvent>>,
    history_failures: usize,
    history_calls: usize,
    quote_calls: usize,
    requests: Vec<HistoryRequest>,
}

/// Scripted feed. `Count` requests return the history; `From` requests
/// return the queued poll batch.
#[derive(Default)]
pub struct MockFeed {
    state: Mutex<FeedState>,
}

impl MockFeed {
    pub fn new(history: Vec<Candle>) -> Self {
        let feed = MockFeed::default();
        feed.state.lock().unwrap().history = history;
        feed
    }

    pub fn with_quote(self, bid: f64, ask: f64) -> Self {
        self.state.lock().unwrap().quote = Some(Quote {
            time: t0(),
            bid,
            ask,
        });
        self
    }

    pub fn with_stream(self, events: mpsc::Receiver<FeedEvent>) -> Self {
        self.state.lock().unwrap().streams.push(events);
        self
    }

    /// The next `n` history fetches fail.
    pub fn fail_history(&self, n: usize) {
        self.state.lock().unwrap().history_failures = n;
    }

    pub fn queue_poll(&self, candles: Vec<Candle>) {
        self.state.lock().unwrap().polled = candles;
    }

    pub fn history_calls(&self) -> usize {
        self.state.lock().unwrap().history_calls
    }

    pub fn quote_calls(&self) -> usize {
        self.state.lock().unwrap().quote_calls
    }

    pub fn requests(&self) -> Vec<HistoryRequest> {
        self.state.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl MarketDataFeed for MockFeed {
    async fn historical_candles(
        &self,
        request: HistoryRequest,
        _granularity: Granularity,
    ) -> Result<Vec<Candle>, BarbotError> {
        let mut state = self.state.lock().unwrap();
        state.history_calls += 1;
        state.requests.push(request);
        if state.history_failures > 0 {
            state.history_failures -= 1;
            return Err(BarbotError::FeedUnavailable {
                reason: "connection refused".into(),
            });
        }
        match request {
            HistoryRequest::Count(n) => {
                let skip = state.history.len().saturating_sub(n);
                Ok(state.history[skip..].to_vec())
            }
            HistoryRequest::From(_) => Ok(std::mem::take(&mut state.polled)),
        }
    }

    async fn current_quote(&self) -> Result<Quote, BarbotError> {
        let mut state = self.state.lock().unwrap();
        state.quote_calls += 1;
        state.quote.ok_or_else(|| BarbotError::FeedUnavailable {
            reason: "no quote".into(),
        })
    }

    async fn subscribe(&self) -> Result<Option<mpsc::Receiver<FeedEvent>>, BarbotError> {
        let mut state = self.state.lock().unwrap();
        if state.streams.is_empty() {
            Ok(None)
        } else {
            Ok(Some(state.streams.remove(0)))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    OpenLong { units: i64, stop: f64 },
    OpenShort { units: i64, stop: f64 },
    CloseLong,
    CloseShort,
}

struct GatewayState {
    account: AccountState,
    positions: OpenPositions,
    calls: Vec<GatewayCall>,
}

/// Records every order call and keeps positions in step with them.
pub struct MockGateway {
    meta: InstrumentMeta,
    state: Mutex<GatewayState>,
}

impl MockGateway {
    pub fn new(account: AccountState, meta: InstrumentMeta) -> Self {
        MockGateway {
            meta,
            state: Mutex::new(GatewayState {
                account,
                positions: OpenPositions::default(),
                calls: Vec::new(),
            }),
        }
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().unwrap().calls.clone()
    }

    fn open(&self, side: Side, units: i64, call: GatewayCall) {
        let mut state = self.state.lock().unwrap();
        let position = Some(Position {
            instrument: self.meta.name.clone(),
            side,
            units,
            entry_price: 0.0,
        });
        match side {
            Side::Long => state.positions.long = position,
            Side::Short => state.positions.short = position,
        }
        state.calls.push(call);
    }
}

#[async_trait]
impl ExecutionGateway for MockGateway {
    async fn account_summary(&self) -> Result<AccountState, BarbotError> {
        Ok(self.state.lock().unwrap().account.clone())
    }

    async fn instrument_meta(&self) -> Result<InstrumentMeta, BarbotError> {
        Ok(self.meta.clone())
    }

    async fn open_positions(&self) -> Result<OpenPositions, BarbotError> {
        Ok(self.state.lock().unwrap().positions.clone())
    }

    async fn open_long(&self, units: i64, stop_loss_distance: f64) -> Result<(), BarbotError> {
        self.open(
            Side::Long,
            units,
            GatewayCall::OpenLong {
                units,
                stop: stop_loss_distance,
            },
        );
        Ok(())
    }

    async fn open_short(&self, units: i64, stop_loss_distance: f64) -> Result<(), BarbotError> {
        self.open(
            Side::Short,
            units,
            GatewayCall::OpenShort {
                units,
                stop: stop_loss_distance,
            },
        );
        Ok(())
    }

    async fn close_long(&self) -> Result<(), BarbotError> {
        let mut state = self.state.lock().unwrap();
        state.positions.long = None;
        state.calls.push(GatewayCall::CloseLong);
        Ok(())
    }

    async fn close_short(&self) -> Result<(), BarbotError> {
        let mut state = self.state.lock().unwrap();
        state.positions.short = None;
        state.calls.push(GatewayCall::CloseShort);
        Ok(())
    }

    async fn conversion_rate(
        &self,
        _currency: &str,
        _as_of: Option<DateTime<Utc>>,
    ) -> Result<f64, BarbotError> {
        Ok(1.0)
    }
}
