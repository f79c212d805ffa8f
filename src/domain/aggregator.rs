//! Tick/heartbeat stream to fixed-period candles.
//!
//! The aggregator owns the period clock; the buffer owns the candles. A new
//! candle is opened only when an event is strictly past the next boundary and
//! the clock then advances by exactly one period, so gaps longer than one
//! period are not backfilled.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::domain::candle::{Candle, CandleBuffer, MarketEvent, Quote, Tick};
use crate::domain::error::BarbotError;

/// Round to five decimals, the quote precision of the FX venue.
pub fn round_5(value: f64) -> f64 {
    (value * 100_000.0).round() / 100_000.0
}

/// Mid price of a two-sided quote.
pub fn mid_price(bid: f64, ask: f64) -> f64 {
    round_5((bid + ask) / 2.0)
}

/// Start of the period containing `time`, aligned to the epoch.
pub fn period_floor(time: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    let secs = period.num_seconds();
    if secs <= 0 {
        return time;
    }
    let ts = time.timestamp();
    DateTime::from_timestamp(ts - ts.rem_euclid(secs), 0).unwrap_or(time)
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandleAggregator {
    period: Duration,
    period_start: DateTime<Utc>,
    next_period_start: DateTime<Utc>,
    latest_price: f64,
}

impl CandleAggregator {
    /// Start the clock from the buffer's current candle.
    pub fn from_buffer(buffer: &CandleBuffer, period: Duration) -> Result<Self, BarbotError> {
        let current = buffer
            .current()
            .ok_or(BarbotError::InsufficientHistory { have: 0, need: 1 })?;
        Ok(Self::starting_at(current.time, current.close, period))
    }

    pub fn starting_at(period_start: DateTime<Utc>, latest_price: f64, period: Duration) -> Self {
        CandleAggregator {
            period,
            period_start,
            next_period_start: period_start + period,
            latest_price,
        }
    }

    pub fn period_start(&self) -> DateTime<Utc> {
        self.period_start
    }

    pub fn next_period_start(&self) -> DateTime<Utc> {
        self.next_period_start
    }

    pub fn latest_price(&self) -> f64 {
        self.latest_price
    }

    /// Fold one event into the buffer. Returns whether the strategy should run.
    pub fn ingest(&mut self, event: &MarketEvent, buffer: &mut CandleBuffer) -> bool {
        match event {
            MarketEvent::Tick(tick) => {
                self.ingest_tick(tick, buffer);
                true
            }
            MarketEvent::Heartbeat(hb) => {
                if hb.time > self.next_period_start {
                    let price = self.latest_price;
                    self.open_candle(Candle::flat(self.next_period_start, price, 0.0), buffer);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Quotes become ticks at the mid price with one unit of volume.
    pub fn ingest_quote(&mut self, quote: &Quote, buffer: &mut CandleBuffer) -> bool {
        let tick = Tick {
            time: quote.time,
            price: mid_price(quote.bid, quote.ask),
            volume: 1.0,
        };
        self.ingest(&MarketEvent::Tick(tick), buffer)
    }

    fn ingest_tick(&mut self, tick: &Tick, buffer: &mut CandleBuffer) {
        self.latest_price = tick.price;
        if tick.time > self.next_period_start {
            self.open_candle(
                Candle::flat(self.next_period_start, tick.price, tick.volume),
                buffer,
            );
            return;
        }
        match buffer.current_mut() {
            Some(current) => {
                let untraded = current.volume == 0.0;
                if tick.price < current.low || untraded {
                    current.low = tick.price;
                }
                if tick.price > current.high || untraded {
                    current.high = tick.price;
                }
                if untraded {
                    current.open = tick.price;
                }
                current.close = tick.price;
                current.volume += tick.volume;
            }
            None => {
                buffer.push_front(Candle::flat(self.period_start, tick.price, tick.volume));
            }
        }
    }

    fn open_candle(&mut self, candle: Candle, buffer: &mut CandleBuffer) {
        debug!(time = %candle.time, volume = candle.volume, "opening candle");
        buffer.push_front(candle);
        self.period_start = self.next_period_start;
        self.next_period_start = self.period_start + self.period;
    }
}

/// Build candles from a time-ordered event stream. The first tick seeds the
/// clock at the start of its period; events before it are ignored.
pub fn aggregate_events(events: &[MarketEvent], period: Duration) -> CandleBuffer {
    let mut buffer = CandleBuffer::new();
    let Some(first) = events.iter().position(|e| matches!(e, MarketEvent::Tick(_))) else {
        return buffer;
    };
    let MarketEvent::Tick(seed) = events[first] else {
        return buffer;
    };
    let start = period_floor(seed.time, period);
    buffer.push_front(Candle::flat(start, seed.price, seed.volume));
    let mut aggregator = CandleAggregator::starting_at(start, seed.price, period);
    for event in &events[first + 1..] {
        aggregator.ingest(event, &mut buffer);
    }
    buffer
}
