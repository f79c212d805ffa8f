//! Simple Moving Average: mean of the last n closes, rolling sum.

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};

pub fn calculate_sma(candles: &[Candle], period: usize) -> IndicatorSeries {
    if period == 0 || candles.is_empty() {
        return IndicatorSeries::empty(IndicatorType::Sma(period));
    }

    let mut values = Vec::with_capacity(candles.len());
    let mut sum = 0.0;

    for (i, candle) in candles.iter().enumerate() {
        sum += candle.close;
        if i >= period {
            sum -= candles[i - period].close;
        }
        let valid = i + 1 >= period;
        values.push(IndicatorPoint {
            time: candle.time,
            valid,
            value: IndicatorValue::Simple(if valid { sum / period as f64 } else { 0.0 }),
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Sma(period),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn make_candles(prices: &[f64]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle::flat(start + Duration::minutes(i as i64), close, 1.0))
            .collect()
    }

    #[test]
    fn sma_basic() {
        let candles = make_candles(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let series = calculate_sma(&candles, 3);
        assert!(!series.values[1].valid);
        let newest = series.newest_first();
        assert_eq!(newest.len(), 3);
        assert!((newest[0] - 4.0).abs() < f64::EPSILON);
        assert!((newest[1] - 3.0).abs() < f64::EPSILON);
        assert!((newest[2] - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sma_period_longer_than_input() {
        let candles = make_candles(&[1.0, 2.0]);
        let series = calculate_sma(&candles, 3);
        assert_eq!(series.values.len(), 2);
        assert!(series.newest_first().is_empty());
    }

    #[test]
    fn sma_period_0() {
        let candles = make_candles(&[1.0]);
        assert!(calculate_sma(&candles, 0).values.is_empty());
    }
}
