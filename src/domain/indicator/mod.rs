//! Technical indicator implementations.
//!
//! Every calculator takes candles oldest-first and returns one point per input
//! candle; points inside the warmup window are marked invalid. Strategies read
//! the valid tail newest-first through [`IndicatorSeries::newest_first`].

pub mod atr;
pub mod ema;
pub mod ichimoku;
pub mod roc;
pub mod sma;

use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub time: DateTime<Utc>,
    pub valid: bool,
    pub value: IndicatorValue,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Ichimoku(IchimokuPoint),
}

/// The four cloud lines at one candle, spans already displaced.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IchimokuPoint {
    pub conversion: f64,
    pub base: f64,
    pub span_a: f64,
    pub span_b: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Sma(usize),
    Ema(usize),
    Atr(usize),
    Roc(usize),
    Ichimoku {
        conversion: usize,
        base: usize,
        span: usize,
    },
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    pub fn empty(indicator_type: IndicatorType) -> Self {
        IndicatorSeries {
            indicator_type,
            values: Vec::new(),
        }
    }

    /// Valid scalar values, newest first.
    pub fn newest_first(&self) -> Vec<f64> {
        self.values
            .iter()
            .rev()
            .filter(|p| p.valid)
            .filter_map(|p| match p.value {
                IndicatorValue::Simple(v) => Some(v),
                IndicatorValue::Ichimoku(_) => None,
            })
            .collect()
    }

    /// Valid cloud points, newest first.
    pub fn cloud_newest_first(&self) -> Vec<IchimokuPoint> {
        self.values
            .iter()
            .rev()
            .filter(|p| p.valid)
            .filter_map(|p| match p.value {
                IndicatorValue::Ichimoku(point) => Some(point),
                IndicatorValue::Simple(_) => None,
            })
            .collect()
    }

    /// Newest valid scalar value.
    pub fn latest(&self) -> Option<f64> {
        self.newest_first().first().copied()
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::Roc(period) => write!(f, "ROC({})", period),
            IndicatorType::Ichimoku {
                conversion,
                base,
                span,
            } => write!(f, "ICHIMOKU({},{},{})", conversion, base, span),
        }
    }
}
