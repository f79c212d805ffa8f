//! Average True Range, Wilder smoothing.
//!
//! TR[0] = high - low; TR[i] = max(H-L, |H-Cprev|, |L-Cprev|).
//! Seed = mean of the first n TRs, then ATR[i] = (ATR[i-1]*(n-1) + TR[i]) / n.

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};

pub const STOP_LOSS_ATR_PERIOD: usize = 14;
pub const STOP_LOSS_ATR_MULTIPLIER: f64 = 2.0;

pub fn calculate_atr(candles: &[Candle], period: usize) -> IndicatorSeries {
    if period == 0 || candles.len() < period {
        return IndicatorSeries::empty(IndicatorType::Atr(period));
    }

    let tr_values: Vec<f64> = candles
        .iter()
        .enumerate()
        .map(|(i, candle)| match i {
            0 => candle.high - candle.low,
            _ => candle.true_range(candles[i - 1].close),
        })
        .collect();

    let mut values = Vec::with_capacity(candles.len());
    let mut atr = 0.0;

    for (i, candle) in candles.iter().enumerate() {
        let valid = i + 1 >= period;
        if i + 1 == period {
            atr = tr_values[..period].iter().sum::<f64>() / period as f64;
        } else if i + 1 > period {
            atr = (atr * (period - 1) as f64 + tr_values[i]) / period as f64;
        }
        values.push(IndicatorPoint {
            time: candle.time,
            valid,
            value: IndicatorValue::Simple(if valid { atr } else { 0.0 }),
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Atr(period),
        values,
    }
}

/// Volatility stop distance: twice the latest ATR(14). `candles` are oldest-first.
pub fn atr_stop_distance(candles: &[Candle]) -> Option<f64> {
    calculate_atr(candles, STOP_LOSS_ATR_PERIOD)
        .latest()
        .map(|atr| atr * STOP_LOSS_ATR_MULTIPLIER)
}
