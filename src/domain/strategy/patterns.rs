//! Building blocks shared by the rule tables. Slices are newest-first:
//! index 0 is the current candle, 1 the previous one, 2 the one before.

use crate::domain::candle::Candle;
use crate::domain::indicator::IchimokuPoint;
use crate::domain::signal::Signal;

/// Conversion line crossed above the base line one candle ago and stayed there.
pub fn conversion_crossed_above(cloud: &[IchimokuPoint; 3]) -> bool {
    cloud[2].conversion <= cloud[2].base
        && cloud[1].conversion > cloud[1].base
        && cloud[0].conversion > cloud[0].base
}

pub fn conversion_crossed_below(cloud: &[IchimokuPoint; 3]) -> bool {
    cloud[2].conversion >= cloud[2].base
        && cloud[1].conversion < cloud[1].base
        && cloud[0].conversion < cloud[0].base
}

/// Both lines strictly above both spans.
pub fn lines_above_cloud(point: &IchimokuPoint) -> bool {
    point.conversion > point.span_a
        && point.conversion > point.span_b
        && point.base > point.span_a
        && point.base > point.span_b
}

pub fn lines_below_cloud(point: &IchimokuPoint) -> bool {
    point.conversion < point.span_a
        && point.conversion < point.span_b
        && point.base < point.span_a
        && point.base < point.span_b
}

pub fn above_cloud(price: f64, point: &IchimokuPoint) -> bool {
    price > point.span_a && price > point.span_b
}

pub fn below_cloud(price: f64, point: &IchimokuPoint) -> bool {
    price < point.span_a && price < point.span_b
}

/// Previous and current closes both above the cloud at their own index.
pub fn closes_above_cloud(price: &[Candle; 3], cloud: &[IchimokuPoint; 3]) -> bool {
    above_cloud(price[1].close, &cloud[1]) && above_cloud(price[0].close, &cloud[0])
}

pub fn closes_below_cloud(price: &[Candle; 3], cloud: &[IchimokuPoint; 3]) -> bool {
    below_cloud(price[1].close, &cloud[1]) && below_cloud(price[0].close, &cloud[0])
}

/// Highs went from touching a span two candles ago to clearing the cloud.
pub fn broke_out_above(price: &[Candle; 3], cloud: &[IchimokuPoint; 3]) -> bool {
    (price[2].high <= cloud[2].span_a || price[2].high <= cloud[2].span_b)
        && above_cloud(price[1].high, &cloud[1])
        && above_cloud(price[0].high, &cloud[0])
}

pub fn broke_out_below(price: &[Candle; 3], cloud: &[IchimokuPoint; 3]) -> bool {
    (price[2].low >= cloud[2].span_a || price[2].low >= cloud[2].span_b)
        && below_cloud(price[1].low, &cloud[1])
        && below_cloud(price[0].low, &cloud[0])
}

/// Previous body closed at or under the base line after a body fully above it.
pub fn body_fell_through_base(price: &[Candle; 3], cloud: &[IchimokuPoint; 3]) -> bool {
    price[1].open <= cloud[1].base
        && price[1].close <= cloud[1].base
        && price[2].open > cloud[2].base
        && price[2].close > cloud[2].base
}

pub fn body_rose_through_base(price: &[Candle; 3], cloud: &[IchimokuPoint; 3]) -> bool {
    price[1].open >= cloud[1].base
        && price[1].close >= cloud[1].base
        && price[2].open < cloud[2].base
        && price[2].close < cloud[2].base
}

/// Conversion line dropped to or under the base line on the current candle.
pub fn conversion_lost_base(cloud: &[IchimokuPoint; 3]) -> bool {
    cloud[1].conversion > cloud[1].base && cloud[0].conversion <= cloud[0].base
}

pub fn conversion_regained_base(cloud: &[IchimokuPoint; 3]) -> bool {
    cloud[1].conversion < cloud[1].base && cloud[0].conversion >= cloud[0].base
}

/// Three consecutive bodies before the current candle in one direction call
/// for closing the side betting against them.
pub fn three_body_exit(price: &[Candle]) -> Signal {
    let Some(previous) = price.get(1..4) else {
        return Signal::Nothing;
    };
    if previous.iter().all(Candle::is_bearish) {
        Signal::LongExit
    } else if previous.iter().all(Candle::is_bullish) {
        Signal::ShortExit
    } else {
        Signal::Nothing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn point(conversion: f64, base: f64, span_a: f64, span_b: f64) -> IchimokuPoint {
        IchimokuPoint {
            conversion,
            base,
            span_a,
            span_b,
        }
    }

    fn body(open: f64, close: f64) -> Candle {
        Candle {
            time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn crossover_needs_prior_non_cross() {
        let cloud = [point(2.0, 1.0, 0.0, 0.0), point(2.0, 1.0, 0.0, 0.0), point(1.0, 1.0, 0.0, 0.0)];
        assert!(conversion_crossed_above(&cloud));
        assert!(!conversion_crossed_below(&cloud));
        let already_above = [cloud[0], cloud[1], point(1.5, 1.0, 0.0, 0.0)];
        assert!(!conversion_crossed_above(&already_above));
    }

    #[test]
    fn cloud_position() {
        let p = point(3.0, 2.5, 2.0, 1.0);
        assert!(lines_above_cloud(&p));
        assert!(above_cloud(2.1, &p));
        assert!(!above_cloud(1.5, &p));
        assert!(below_cloud(0.5, &p));
        assert!(!lines_below_cloud(&p));
    }

    #[test]
    fn upward_breakout_uses_highs() {
        let cloud = [point(0.0, 0.0, 2.0, 1.0); 3];
        let price = [body(2.5, 2.6), body(2.1, 2.4), body(1.5, 1.8)];
        assert!(broke_out_above(&price, &cloud));
        assert!(!broke_out_below(&price, &cloud));
    }

    #[test]
    fn base_line_body_crosses() {
        let cloud = [point(0.0, 2.0, 0.0, 0.0); 3];
        let falling = [body(1.0, 1.0), body(1.9, 1.5), body(2.5, 2.2)];
        assert!(body_fell_through_base(&falling, &cloud));
        let rising = [body(1.0, 1.0), body(2.1, 2.5), body(1.5, 1.9)];
        assert!(body_rose_through_base(&rising, &cloud));
    }

    #[test]
    fn three_bodies() {
        let red = [body(1.0, 1.0), body(2.0, 1.0), body(3.0, 2.0), body(4.0, 3.0)];
        assert_eq!(three_body_exit(&red), Signal::LongExit);
        let green = [body(9.0, 9.0), body(2.0, 3.0), body(1.0, 2.0), body(0.5, 1.0)];
        assert_eq!(three_body_exit(&green), Signal::ShortExit);
        let mixed = [body(1.0, 1.0), body(2.0, 3.0), body(3.0, 2.0), body(1.0, 2.0)];
        assert_eq!(three_body_exit(&mixed), Signal::Nothing);
        assert_eq!(three_body_exit(&red[..3]), Signal::Nothing);
    }
}
