//! Ichimoku cloud lines per candle.
//!
//! conversion = (max_9(high) + min_9(low)) / 2
//! base       = (max_26(high) + min_26(low)) / 2
//! span A     = (conversion + base) / 2
//! span B     = (max_52(high) + min_52(low)) / 2
//!
//! Spans are projected forward: the cloud reported at candle `i` holds the
//! spans computed `displacement - 1` candles earlier, which is the cloud
//! drawn under price `i` on a chart. Strategies compare it against the
//! same-index price.

use crate::domain::candle::Candle;
use crate::domain::indicator::{
    IchimokuPoint, IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue,
};

pub const CONVERSION_PERIOD: usize = 9;
pub const BASE_PERIOD: usize = 26;
pub const SPAN_PERIOD: usize = 52;
pub const DISPLACEMENT: usize = 26;

fn midpoint(window: &[Candle]) -> f64 {
    let high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    (high + low) / 2.0
}

pub fn calculate_ichimoku(
    candles: &[Candle],
    conversion: usize,
    base: usize,
    span: usize,
    displacement: usize,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::Ichimoku {
        conversion,
        base,
        span,
    };
    if conversion == 0 || base == 0 || span == 0 || displacement == 0 {
        return IndicatorSeries::empty(indicator_type);
    }
    let warmup = conversion.max(base).max(span);
    let shift = displacement - 1;

    let values = candles
        .iter()
        .enumerate()
        .map(|(i, candle)| {
            let valid = i >= shift && i - shift + 1 >= warmup;
            let point = if valid {
                let conversion_line = midpoint(&candles[i + 1 - conversion..=i]);
                let base_line = midpoint(&candles[i + 1 - base..=i]);
                let j = i - shift;
                let projected_conversion = midpoint(&candles[j + 1 - conversion..=j]);
                let projected_base = midpoint(&candles[j + 1 - base..=j]);
                IchimokuPoint {
                    conversion: conversion_line,
                    base: base_line,
                    span_a: (projected_conversion + projected_base) / 2.0,
                    span_b: midpoint(&candles[j + 1 - span..=j]),
                }
            } else {
                IchimokuPoint::default()
            };
            IndicatorPoint {
                time: candle.time,
                valid,
                value: IndicatorValue::Ichimoku(point),
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type,
        values,
    }
}

/// Standard 9/26/52 cloud displaced by 26.
pub fn standard_cloud(candles: &[Candle]) -> IndicatorSeries {
    calculate_ichimoku(candles, CONVERSION_PERIOD, BASE_PERIOD, SPAN_PERIOD, DISPLACEMENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn ramp(n: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let mid = 100.0 + i as f64;
                Candle {
                    time: start + Duration::minutes(i as i64),
                    open: mid,
                    high: mid + 1.0,
                    low: mid - 1.0,
                    close: mid,
                    volume: 1.0,
                }
            })
            .collect()
    }

    #[test]
    fn warmup_covers_the_projection() {
        let series = standard_cloud(&ramp(100));
        assert!(!series.values[75].valid);
        assert!(series.values[76].valid);
        assert_eq!(series.cloud_newest_first().len(), 24);
    }

    #[test]
    fn lines_on_a_ramp() {
        let candles = ramp(100);
        let series = standard_cloud(&candles);
        let latest = series.cloud_newest_first()[0];
        // newest mid = 199; a window of n candles ending at mid m spans m-n+1..=m
        assert!((latest.conversion - (200.0 + 190.0) / 2.0).abs() < f64::EPSILON);
        assert!((latest.base - (200.0 + 173.0) / 2.0).abs() < f64::EPSILON);
        // spans come from 25 candles back, mid 174
        let projected_conversion = (175.0 + 165.0) / 2.0;
        let projected_base = (175.0 + 148.0) / 2.0;
        assert!((latest.span_a - (projected_conversion + projected_base) / 2.0).abs() < f64::EPSILON);
        assert!((latest.span_b - (175.0 + 122.0) / 2.0).abs() < f64::EPSILON);
        assert!(latest.conversion > latest.base);
        assert!(latest.base > latest.span_a);
        assert!(latest.span_a > latest.span_b);
    }

    #[test]
    fn short_input_has_no_valid_points() {
        let series = standard_cloud(&ramp(60));
        assert_eq!(series.values.len(), 60);
        assert!(series.cloud_newest_first().is_empty());
    }

    #[test]
    fn zero_period_is_empty() {
        assert!(calculate_ichimoku(&ramp(10), 0, 2, 3, 1).values.is_empty());
    }
}
