//! Rate of Change.
//!
//! ROC(n)[i] = (C[i] - C[i-n]) / C[i-n], 0 when C[i-n] == 0. First n points invalid.
//! Only the sign of the two newest values is used for trade decisions.

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};

pub const ROC_PERIOD: usize = 12;

pub fn calculate_roc(candles: &[Candle], period: usize) -> IndicatorSeries {
    let values = candles
        .iter()
        .enumerate()
        .map(|(i, candle)| {
            let valid = period > 0 && i >= period;
            let value = if valid {
                let prev_close = candles[i - period].close;
                if prev_close == 0.0 {
                    0.0
                } else {
                    (candle.close - prev_close) / prev_close
                }
            } else {
                0.0
            };
            IndicatorPoint {
                time: candle.time,
                valid,
                value: IndicatorValue::Simple(value),
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Roc(period),
        values,
    }
}

/// Sign of momentum over the two newest ROC values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Momentum {
    Rising,
    Falling,
    Mixed,
}

impl Momentum {
    /// `newest_first` must hold at least two values, otherwise `Mixed`.
    pub fn from_newest(newest_first: &[f64]) -> Self {
        match newest_first {
            [a, b, ..] if *a > 0.0 && *b > 0.0 => Momentum::Rising,
            [a, b, ..] if *a < 0.0 && *b < 0.0 => Momentum::Falling,
            _ => Momentum::Mixed,
        }
    }
}
