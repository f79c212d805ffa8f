//! Trading signals and the bounded per-strategy signal history.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::domain::account::Side;
use crate::domain::candle::Candle;

pub const HISTORY_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Nothing,
    Buy,
    StrongBuy,
    Sell,
    StrongSell,
    LongExit,
    ShortExit,
    UpwardsBreakout,
    DownwardsBreakout,
    UpwardsCrossover,
    DownwardsCrossover,
}

impl Signal {
    /// Side an entry signal opens, if any.
    pub fn entry_side(&self) -> Option<Side> {
        match self {
            Signal::Buy | Signal::StrongBuy => Some(Side::Long),
            Signal::Sell | Signal::StrongSell => Some(Side::Short),
            _ => None,
        }
    }

    /// Side an exit signal closes, if any.
    pub fn exit_side(&self) -> Option<Side> {
        match self {
            Signal::LongExit => Some(Side::Long),
            Signal::ShortExit => Some(Side::Short),
            _ => None,
        }
    }

    pub fn is_strong(&self) -> bool {
        matches!(self, Signal::StrongBuy | Signal::StrongSell)
    }

    /// Cloud-strategy bookkeeping events, never acted on directly.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Signal::UpwardsBreakout
                | Signal::DownwardsBreakout
                | Signal::UpwardsCrossover
                | Signal::DownwardsCrossover
        )
    }

    pub fn is_crossover(&self) -> bool {
        matches!(self, Signal::UpwardsCrossover | Signal::DownwardsCrossover)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Signal::Nothing => "Nothing",
            Signal::Buy => "Buy",
            Signal::StrongBuy => "StrongBuy",
            Signal::Sell => "Sell",
            Signal::StrongSell => "StrongSell",
            Signal::LongExit => "LongExit",
            Signal::ShortExit => "ShortExit",
            Signal::UpwardsBreakout => "UpwardsBreakout",
            Signal::DownwardsBreakout => "DownwardsBreakout",
            Signal::UpwardsCrossover => "UpwardsCrossover",
            Signal::DownwardsCrossover => "DownwardsCrossover",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalHistoryEntry {
    pub signal: Signal,
    /// Start of the period the signal was recorded in.
    pub timestamp: DateTime<Utc>,
    pub reference: Option<Candle>,
}

/// Fixed-capacity ring of recorded signals; the oldest entry is overwritten
/// once full. Iteration is newest-first.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalHistory {
    slots: Vec<SignalHistoryEntry>,
    next: usize,
    capacity: usize,
}

impl Default for SignalHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHistory {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        SignalHistory {
            slots: Vec::with_capacity(capacity.min(HISTORY_CAPACITY)),
            next: 0,
            capacity,
        }
    }

    /// Record a signal. A `Nothing` right after another `Nothing` is dropped.
    pub fn push(&mut self, signal: Signal, timestamp: DateTime<Utc>, reference: Option<Candle>) {
        if signal == Signal::Nothing
            && self.latest().is_some_and(|e| e.signal == Signal::Nothing)
        {
            return;
        }
        let entry = SignalHistoryEntry {
            signal,
            timestamp,
            reference,
        };
        if self.slots.len() < self.capacity {
            self.slots.push(entry);
            self.next = self.slots.len() % self.capacity;
        } else {
            self.slots[self.next] = entry;
            self.next = (self.next + 1) % self.capacity;
        }
    }

    /// The i-th newest entry.
    pub fn get(&self, i: usize) -> Option<&SignalHistoryEntry> {
        let n = self.slots.len();
        if i >= n {
            return None;
        }
        self.slots.get((self.next + n - 1 - i) % n)
    }

    pub fn latest(&self) -> Option<&SignalHistoryEntry> {
        self.get(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SignalHistoryEntry> + '_ {
        (0..self.slots.len()).filter_map(move |i| self.get(i))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether `signal` was already recorded in `[start, end)`.
    pub fn fired_within(&self, signal: Signal, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.iter()
            .any(|e| e.signal == signal && e.timestamp >= start && e.timestamp < end)
    }

    /// Most recent crossover before the latest entry.
    pub fn previous_crossover(&self) -> Option<Signal> {
        self.iter().skip(1).map(|e| e.signal).find(Signal::is_crossover)
    }

    /// Nearest breakout or crossover that kept its reference candle.
    pub fn stop_loss_reference(&self) -> Option<(Signal, &Candle)> {
        self.iter().find_map(|e| match (e.signal.is_internal(), &e.reference) {
            (true, Some(candle)) => Some((e.signal, candle)),
            _ => None,
        })
    }

    /// Entries newest-first, cloned out for reporting.
    pub fn snapshot(&self) -> Vec<SignalHistoryEntry> {
        self.iter().cloned().collect()
    }
}
