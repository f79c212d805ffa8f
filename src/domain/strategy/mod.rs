//! Signal engines over newest-first candle windows.
//!
//! Each engine drops placeholder (zero-volume) candles, computes its
//! indicators oldest-first and compares the newest few values. Evaluation
//! takes `&mut self`: an engine is owned by exactly one instrument pipeline,
//! so there is never more than one evaluation in flight.

pub mod ichimoku;
pub mod moving_average;
pub mod patterns;
pub mod rules;

use std::fmt;

use crate::domain::candle::{Candle, traded_candles};
use crate::domain::error::BarbotError;
use crate::domain::indicator::IchimokuPoint;
use crate::domain::indicator::atr::atr_stop_distance;
use crate::domain::signal::{Signal, SignalHistory};

pub use ichimoku::{IchimokuStrategy, IchimokuVariant};
pub use moving_average::{MovingAverageKind, MovingAverageStrategy};

/// Traded candles the cloud engines need before they will evaluate.
pub const CLOUD_MIN_CANDLES: usize = 200;

/// Index, oldest-first, of the first window replayed by [`Strategy::warm_up`].
pub const WARM_UP_START: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaPeriods {
    pub short: usize,
    pub long: usize,
    pub base: usize,
}

impl Default for MaPeriods {
    fn default() -> Self {
        MaPeriods {
            short: 10,
            long: 20,
            base: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    IchimokuTrend,
    IchimokuRegular,
    MovingAverageCrossover {
        average: MovingAverageKind,
        periods: MaPeriods,
    },
}

impl StrategyKind {
    /// Config name to kind: `ichimoku`, `ichimoku_regular`, `sma`, `ema`.
    pub fn parse(name: &str, periods: MaPeriods) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ichimoku" | "ichimoku_trend" => Some(StrategyKind::IchimokuTrend),
            "ichimoku_regular" => Some(StrategyKind::IchimokuRegular),
            "sma" => Some(StrategyKind::MovingAverageCrossover {
                average: MovingAverageKind::Simple,
                periods,
            }),
            "ema" => Some(StrategyKind::MovingAverageCrossover {
                average: MovingAverageKind::Exponential,
                periods,
            }),
            _ => None,
        }
    }

    pub fn is_cloud(&self) -> bool {
        matches!(self, StrategyKind::IchimokuTrend | StrategyKind::IchimokuRegular)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::IchimokuTrend => write!(f, "ichimoku"),
            StrategyKind::IchimokuRegular => write!(f, "ichimoku_regular"),
            StrategyKind::MovingAverageCrossover { average, periods } => write!(
                f,
                "{}({},{},{})",
                average, periods.short, periods.long, periods.base
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaTriple {
    pub short: f64,
    pub long: f64,
    pub base: f64,
}

/// Indicator values behind a decision, previous and current candle.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostics {
    Cloud {
        previous: IchimokuPoint,
        current: IchimokuPoint,
        previous_close: f64,
        current_close: f64,
    },
    MovingAverages {
        previous: MaTriple,
        current: MaTriple,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOutcome {
    pub signal: Signal,
    pub diagnostics: Diagnostics,
}

pub trait Strategy: Send {
    fn kind(&self) -> StrategyKind;

    /// Traded candles required by `evaluate`.
    fn min_candles(&self) -> usize;

    /// Evaluate the newest-first window.
    fn evaluate(&mut self, candles: &[Candle]) -> Result<StrategyOutcome, BarbotError>;

    /// Stop distance for an order placed now. `candles` are newest-first.
    fn stop_loss_distance(&self, candles: &[Candle]) -> Option<f64> {
        volatility_stop(candles)
    }

    /// Absolute stop price, for engines that track reference candles.
    fn stop_loss_price(&self) -> Option<f64> {
        None
    }

    /// Recorded signal history, for engines that keep one.
    fn history(&self) -> Option<&SignalHistory> {
        None
    }

    /// Replay older windows so the history reflects recent events before
    /// live evaluation. A no-op for engines without history.
    fn warm_up(&mut self, _candles: &[Candle]) {}
}

pub fn build_strategy(kind: StrategyKind) -> Box<dyn Strategy> {
    match kind {
        StrategyKind::IchimokuTrend => Box::new(IchimokuStrategy::new(IchimokuVariant::TrendFocus)),
        StrategyKind::IchimokuRegular => Box::new(IchimokuStrategy::new(IchimokuVariant::Regular)),
        StrategyKind::MovingAverageCrossover { average, periods } => {
            Box::new(MovingAverageStrategy::new(average, periods))
        }
    }
}

/// ATR(14) * 2 over the traded candles of a newest-first window.
pub fn volatility_stop(candles: &[Candle]) -> Option<f64> {
    let mut oldest_first = traded_candles(candles);
    oldest_first.reverse();
    atr_stop_distance(&oldest_first)
}

/// Drop placeholders and enforce the engine minimum. Returns newest-first.
pub(crate) fn traded_window(candles: &[Candle], need: usize) -> Result<Vec<Candle>, BarbotError> {
    let traded = traded_candles(candles);
    if traded.len() < need {
        return Err(BarbotError::InsufficientHistory {
            have: traded.len(),
            need,
        });
    }
    Ok(traded)
}
