//! Live trading: one actor task per instrument.
//!
//! The task exclusively owns an [`InstrumentPipeline`] (candle buffer,
//! aggregator, strategy and risk controller), so evaluations for an
//! instrument never overlap. Venues that push events are streamed; the rest
//! are polled. A lost feed discards the buffer and rebuilds it from a fresh
//! history fetch, retrying on a fixed interval.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::aggregator::CandleAggregator;
use crate::domain::candle::{CandleBuffer, Quote};
use crate::domain::config::TraderConfig;
use crate::domain::error::BarbotError;
use crate::domain::granularity::{Granularity, period_duration};
use crate::domain::risk::{MarketWindow, RiskConfig, RiskController};
use crate::domain::signal::Signal;
use crate::domain::strategy::{Strategy, build_strategy};
use crate::ports::execution_port::ExecutionGateway;
use crate::ports::market_data_port::{FeedEvent, HistoryRequest, MarketDataFeed};

pub struct InstrumentPipeline {
    config: TraderConfig,
    granularity: Granularity,
    feed: Arc<dyn MarketDataFeed>,
    strategy: Box<dyn Strategy>,
    controller: RiskController,
    buffer: CandleBuffer,
    aggregator: Option<CandleAggregator>,
}

impl InstrumentPipeline {
    pub async fn new(
        config: TraderConfig,
        feed: Arc<dyn MarketDataFeed>,
        gateway: Arc<dyn ExecutionGateway>,
    ) -> Result<Self, BarbotError> {
        let meta = gateway.instrument_meta().await?;
        let controller = RiskController::new(
            meta,
            RiskConfig {
                period_minutes: config.period_minutes,
                instruments_traded: config.instruments_traded,
                venue: config.venue,
                can_trade: config.can_trade,
                historical_rates: false,
            },
            gateway,
        );
        Ok(InstrumentPipeline {
            granularity: Granularity::from_minutes(config.period_minutes),
            strategy: build_strategy(config.strategy),
            config,
            feed,
            controller,
            buffer: CandleBuffer::new(),
            aggregator: None,
        })
    }

    pub fn instrument(&self) -> &str {
        &self.config.instrument
    }

    pub fn buffer(&self) -> &CandleBuffer {
        &self.buffer
    }

    pub fn strategy(&self) -> &dyn Strategy {
        self.strategy.as_ref()
    }

    /// Drop every buffered candle, then refill from a fresh history fetch.
    pub async fn rebuild(&mut self) -> Result<(), BarbotError> {
        self.buffer.clear();
        self.aggregator = None;

        let candles = self
            .feed
            .historical_candles(HistoryRequest::Count(self.config.history_count), self.granularity)
            .await?;
        if candles.is_empty() {
            return Err(BarbotError::NoData {
                instrument: self.config.instrument.clone(),
            });
        }
        self.buffer = CandleBuffer::from_candles(candles);
        self.aggregator = Some(CandleAggregator::from_buffer(
            &self.buffer,
            period_duration(self.config.period_minutes),
        )?);
        info!(
            instrument = %self.config.instrument,
            granularity = %self.granularity,
            candles = self.buffer.len(),
            "candle buffer built"
        );
        Ok(())
    }

    /// Replay buffered history so the strategy starts with recent events recorded.
    pub fn warm_up(&mut self) {
        self.strategy.warm_up(self.buffer.as_slice());
    }

    /// One polling cycle: refresh candles from the newest buffered one, fetch
    /// a quote and evaluate.
    pub async fn poll(&mut self, now: DateTime<Utc>) -> Result<Signal, BarbotError> {
        if self.controller.check_weekend(now).await? == MarketWindow::Closed {
            return Ok(Signal::Nothing);
        }
        let since = self
            .buffer
            .current()
            .map(|c| c.time)
            .ok_or_else(|| BarbotError::NoData {
                instrument: self.config.instrument.clone(),
            })?;
        let candles = self
            .feed
            .historical_candles(HistoryRequest::From(since), self.granularity)
            .await?;
        let merged = self.buffer.merge_newer(&candles);
        debug!(instrument = %self.config.instrument, merged, "candles polled");

        let quote = self.feed.current_quote().await?;
        self.evaluate(quote).await
    }

    /// Fold one pushed event into the buffer; evaluate when it changed.
    /// Trade events carry no bid/ask, so each evaluation they trigger
    /// fetches a fresh quote.
    pub async fn on_event(&mut self, event: FeedEvent, now: DateTime<Utc>) -> Result<Signal, BarbotError> {
        let aggregator = self.aggregator.as_mut().ok_or_else(|| BarbotError::FeedUnavailable {
            reason: "candle buffer not built".to_string(),
        })?;
        let (updated, pushed_quote) = match &event {
            FeedEvent::Quote(quote) => (aggregator.ingest_quote(quote, &mut self.buffer), Some(*quote)),
            FeedEvent::Market(market) => (aggregator.ingest(market, &mut self.buffer), None),
        };
        if !updated {
            return Ok(Signal::Nothing);
        }
        if self.controller.check_weekend(now).await? == MarketWindow::Closed {
            return Ok(Signal::Nothing);
        }
        let quote = match pushed_quote {
            Some(quote) => quote,
            None => self.feed.current_quote().await?,
        };
        self.evaluate(quote).await
    }

    async fn evaluate(&mut self, quote: Quote) -> Result<Signal, BarbotError> {
        let outcome = self.strategy.evaluate(self.buffer.as_slice())?;
        let signal = outcome.signal;
        if signal == Signal::Nothing {
            return Ok(signal);
        }
        info!(
            instrument = %self.config.instrument,
            signal = %signal,
            bid = quote.bid,
            ask = quote.ask,
            "signal"
        );
        let stop = self
            .strategy
            .stop_loss_distance(self.buffer.as_slice());
        match self.controller.on_signal(signal, &quote, stop).await {
            Ok(acted) => debug!(instrument = %self.config.instrument, acted, "signal handled"),
            Err(err) if err.is_recoverable() => {
                info!(instrument = %self.config.instrument, signal = %signal, reason = %err, "signal dropped")
            }
            Err(err) => return Err(err),
        }
        Ok(signal)
    }
}

fn report(instrument: &str, err: &BarbotError) {
    match err {
        BarbotError::InsufficientHistory { .. } | BarbotError::Parse(_) => {
            warn!(instrument, error = %err, "cycle skipped")
        }
        _ => error!(instrument, error = %err, "cycle failed"),
    }
}

/// Handle to a running trader. Dropping it stops the trader too.
pub struct TraderHandle {
    instrument: String,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TraderHandle {
    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    /// Ask the loop to stop. Pending timers and in-flight calls are dropped.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop and wait for the loop to exit.
    pub async fn shutdown(self) {
        self.stop();
        if let Err(err) = self.task.await {
            error!(instrument = %self.instrument, error = %err, "trader task failed");
        }
    }
}

/// Build the buffer, warm the strategy up and spawn the trading loop.
pub async fn start(
    config: TraderConfig,
    feed: Arc<dyn MarketDataFeed>,
    gateway: Arc<dyn ExecutionGateway>,
) -> Result<TraderHandle, BarbotError> {
    let instrument = config.instrument.clone();
    let mut pipeline = InstrumentPipeline::new(config, feed, gateway).await?;
    pipeline.rebuild().await?;
    pipeline.warm_up();
    info!(
        instrument = %instrument,
        strategy = %pipeline.config.strategy,
        period_minutes = pipeline.config.period_minutes,
        can_trade = pipeline.config.can_trade,
        "trader started"
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(run(pipeline, stop_rx));
    Ok(TraderHandle {
        instrument,
        stop_tx,
        task,
    })
}

enum Exit {
    Stopped,
    FeedLost,
}

async fn run(mut pipeline: InstrumentPipeline, mut stop: watch::Receiver<bool>) {
    loop {
        let exit = match pipeline.feed.subscribe().await {
            Ok(Some(events)) => stream(&mut pipeline, events, &mut stop).await,
            Ok(None) => poll_loop(&mut pipeline, &mut stop).await,
            Err(err) => {
                warn!(instrument = %pipeline.config.instrument, error = %err, "subscription failed");
                Exit::FeedLost
            }
        };
        match exit {
            Exit::Stopped => break,
            Exit::FeedLost => {
                if !reconnect(&mut pipeline, &mut stop).await {
                    break;
                }
            }
        }
    }
    info!(instrument = %pipeline.config.instrument, "trader stopped");
}

async fn poll_loop(pipeline: &mut InstrumentPipeline, stop: &mut watch::Receiver<bool>) -> Exit {
    let mut ticker = tokio::time::interval(pipeline.config.poll_interval);
    loop {
        tokio::select! {
            _ = stop.changed() => return Exit::Stopped,
            _ = ticker.tick() => {}
        }
        let result = tokio::select! {
            _ = stop.changed() => return Exit::Stopped,
            result = pipeline.poll(Utc::now()) => result,
        };
        match result {
            Ok(_) => {}
            Err(BarbotError::FeedUnavailable { reason }) => {
                warn!(instrument = %pipeline.config.instrument, reason = %reason, "feed unavailable");
                return Exit::FeedLost;
            }
            Err(err) => report(&pipeline.config.instrument, &err),
        }
    }
}

async fn stream(
    pipeline: &mut InstrumentPipeline,
    mut events: mpsc::Receiver<FeedEvent>,
    stop: &mut watch::Receiver<bool>,
) -> Exit {
    info!(instrument = %pipeline.config.instrument, "streaming");
    loop {
        let event = tokio::select! {
            _ = stop.changed() => return Exit::Stopped,
            event = events.recv() => event,
        };
        let Some(event) = event else {
            warn!(instrument = %pipeline.config.instrument, "stream closed unexpectedly");
            return Exit::FeedLost;
        };
        let result = tokio::select! {
            _ = stop.changed() => return Exit::Stopped,
            result = pipeline.on_event(event, Utc::now()) => result,
        };
        if let Err(err) = result {
            report(&pipeline.config.instrument, &err);
        }
    }
}

/// Retry the history fetch until it succeeds. Returns false when stopped first.
async fn reconnect(pipeline: &mut InstrumentPipeline, stop: &mut watch::Receiver<bool>) -> bool {
    let started = Instant::now();
    let notify_every = pipeline.config.notify_every.max(1);
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let result = tokio::select! {
            _ = stop.changed() => return false,
            result = pipeline.rebuild() => result,
        };
        match result {
            Ok(()) => {
                info!(instrument = %pipeline.config.instrument, attempt, "reconnected");
                return true;
            }
            Err(err) if attempt % notify_every == 0 => error!(
                instrument = %pipeline.config.instrument,
                attempt,
                elapsed_secs = started.elapsed().as_secs(),
                error = %err,
                "feed still unavailable"
            ),
            Err(err) => warn!(
                instrument = %pipeline.config.instrument,
                attempt,
                error = %err,
                "reconnect failed"
            ),
        }
        tokio::select! {
            _ = stop.changed() => return false,
            _ = tokio::time::sleep(pipeline.config.reconnect_interval) => {}
        }
    }
}
