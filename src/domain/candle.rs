//! Candle (OHLCV bar) representation, market events and the rolling buffer.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

/// Maximum number of candles kept per instrument.
pub const MAX_CANDLES: usize = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// O=H=L=C=price.
    pub fn flat(time: DateTime<Utc>, price: f64, volume: f64) -> Self {
        Candle {
            time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    /// Green body.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Red body.
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Zero-volume candles are clock placeholders, not trades.
    pub fn has_trades(&self) -> bool {
        self.volume > 0.0
    }
}

/// Drop placeholder candles, preserving order.
pub fn traded_candles(candles: &[Candle]) -> Vec<Candle> {
    candles.iter().filter(|c| c.has_trades()).cloned().collect()
}

/// One trade print.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub time: DateTime<Utc>,
    pub price: f64,
    pub volume: f64,
}

/// Liveness pulse without a price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Heartbeat {
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarketEvent {
    Tick(Tick),
    Heartbeat(Heartbeat),
}

impl MarketEvent {
    pub fn time(&self) -> DateTime<Utc> {
        match self {
            MarketEvent::Tick(t) => t.time,
            MarketEvent::Heartbeat(h) => h.time,
        }
    }
}

/// Two-sided price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub time: DateTime<Utc>,
    pub bid: f64,
    pub ask: f64,
}

/// A historical bar with the closing bid and ask, as replayed by the backtracker.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalCandle {
    pub candle: Candle,
    pub bid: f64,
    pub ask: f64,
}

/// Newest-first rolling buffer of candles. Only the front candle is mutable.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleBuffer {
    candles: VecDeque<Candle>,
    capacity: usize,
}

impl Default for CandleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl CandleBuffer {
    pub fn new() -> Self {
        Self::with_capacity(MAX_CANDLES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        CandleBuffer {
            candles: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Build from candles in any order; they are sorted newest-first and capped.
    pub fn from_candles(mut candles: Vec<Candle>) -> Self {
        candles.sort_by(|a, b| b.time.cmp(&a.time));
        let mut buffer = Self::new();
        candles.truncate(buffer.capacity);
        buffer.candles = candles.into();
        buffer
    }

    /// Prepend a new current candle, returning the evicted oldest one if the cap was hit.
    pub fn push_front(&mut self, candle: Candle) -> Option<Candle> {
        self.candles.push_front(candle);
        if self.candles.len() > self.capacity {
            self.candles.pop_back()
        } else {
            None
        }
    }

    /// Merge a newest-first batch from a poll: buffered candles at or after the
    /// oldest incoming time are replaced, newer ones are prepended.
    pub fn merge_newer(&mut self, newest_first: &[Candle]) -> usize {
        let Some(oldest_incoming) = newest_first.iter().map(|c| c.time).min() else {
            return 0;
        };
        while self
            .candles
            .front()
            .is_some_and(|c| c.time >= oldest_incoming)
        {
            self.candles.pop_front();
        }
        let mut incoming = newest_first.to_vec();
        incoming.sort_by_key(|c| c.time);
        let added = incoming.len();
        for candle in incoming {
            self.push_front(candle);
        }
        added
    }

    pub fn current(&self) -> Option<&Candle> {
        self.candles.front()
    }

    pub fn current_mut(&mut self) -> Option<&mut Candle> {
        self.candles.front_mut()
    }

    /// Contiguous newest-first view for the strategy engines.
    pub fn as_slice(&mut self) -> &[Candle] {
        self.candles.make_contiguous()
    }

    /// Newest-first.
    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.candles.iter()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.candles.clear();
    }
}
