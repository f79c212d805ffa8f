//! Ichimoku cloud engines: trend-focus and regular.
//!
//! Both keep a signal history. A rule whose recorded signal is already in the
//! history for the current period yields `Nothing`, so each
//! `(signal, period start)` pair fires at most once.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::domain::candle::Candle;
use crate::domain::error::BarbotError;
use crate::domain::indicator::IchimokuPoint;
use crate::domain::indicator::ichimoku::standard_cloud;
use crate::domain::indicator::roc::{Momentum, ROC_PERIOD, calculate_roc};
use crate::domain::signal::{Signal, SignalHistory};
use crate::domain::strategy::patterns::*;
use crate::domain::strategy::rules::{Reference, Rule, first_match};
use crate::domain::strategy::{
    CLOUD_MIN_CANDLES, Diagnostics, Strategy, StrategyKind, StrategyOutcome, WARM_UP_START,
    traded_window, volatility_stop,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IchimokuVariant {
    /// Breakouts and crossovers tracked in history, crossovers double as exits.
    TrendFocus,
    /// ROC-confirmed entries, base-line exits.
    Regular,
}

/// What the rules look at: the three newest cloud points and candles, ROC
/// momentum, and the two history facts the breakout entries depend on.
#[derive(Debug, Clone)]
pub struct CloudInput {
    pub cloud: [IchimokuPoint; 3],
    pub price: [Candle; 3],
    pub momentum: Momentum,
    pub latest_recorded: Option<Signal>,
    pub previous_crossover: Option<Signal>,
}

fn strong_buy(i: &CloudInput) -> bool {
    conversion_crossed_above(&i.cloud)
        && lines_above_cloud(&i.cloud[1])
        && closes_above_cloud(&i.price, &i.cloud)
}

fn strong_sell(i: &CloudInput) -> bool {
    conversion_crossed_below(&i.cloud)
        && lines_below_cloud(&i.cloud[1])
        && closes_below_cloud(&i.price, &i.cloud)
}

fn buy_after_breakout(i: &CloudInput) -> bool {
    i.previous_crossover == Some(Signal::UpwardsCrossover)
        && i.latest_recorded == Some(Signal::UpwardsBreakout)
}

fn sell_after_breakout(i: &CloudInput) -> bool {
    i.previous_crossover == Some(Signal::DownwardsCrossover)
        && i.latest_recorded == Some(Signal::DownwardsBreakout)
}

fn upwards_breakout(i: &CloudInput) -> bool {
    broke_out_above(&i.price, &i.cloud)
}

fn downwards_breakout(i: &CloudInput) -> bool {
    broke_out_below(&i.price, &i.cloud)
}

fn upwards_crossover(i: &CloudInput) -> bool {
    conversion_crossed_above(&i.cloud)
}

fn downwards_crossover(i: &CloudInput) -> bool {
    conversion_crossed_below(&i.cloud)
}

fn strong_buy_confirmed(i: &CloudInput) -> bool {
    strong_buy(i) && i.momentum == Momentum::Rising
}

fn strong_sell_confirmed(i: &CloudInput) -> bool {
    strong_sell(i) && i.momentum == Momentum::Falling
}

fn buy_confirmed(i: &CloudInput) -> bool {
    conversion_crossed_above(&i.cloud)
        && i.cloud[1].conversion > i.cloud[1].span_b
        && i.cloud[1].base > i.cloud[1].span_b
        && i.momentum == Momentum::Rising
}

fn sell_confirmed(i: &CloudInput) -> bool {
    conversion_crossed_below(&i.cloud)
        && i.cloud[1].conversion < i.cloud[1].span_b
        && i.cloud[1].base < i.cloud[1].span_b
        && i.momentum == Momentum::Falling
}

fn body_below_base(i: &CloudInput) -> bool {
    body_fell_through_base(&i.price, &i.cloud)
}

fn conversion_under_base(i: &CloudInput) -> bool {
    conversion_lost_base(&i.cloud)
}

fn body_above_base(i: &CloudInput) -> bool {
    body_rose_through_base(&i.price, &i.cloud)
}

fn conversion_over_base(i: &CloudInput) -> bool {
    conversion_regained_base(&i.cloud)
}

fn momentum_rising(i: &CloudInput) -> bool {
    i.momentum == Momentum::Rising
}

fn momentum_falling(i: &CloudInput) -> bool {
    i.momentum == Momentum::Falling
}

pub const TREND_RULES: &[Rule<CloudInput>] = &[
    Rule::new("strong_buy", strong_buy, Signal::StrongBuy).keep(Reference::Current),
    Rule::new("buy_after_breakout", buy_after_breakout, Signal::Buy).keep(Reference::Current),
    Rule::new("strong_sell", strong_sell, Signal::StrongSell).keep(Reference::Current),
    Rule::new("sell_after_breakout", sell_after_breakout, Signal::Sell).keep(Reference::Current),
    // Breakouts keep the candle that pierced the cloud.
    Rule::new("upwards_breakout", upwards_breakout, Signal::Nothing)
        .recording(Signal::UpwardsBreakout)
        .keep(Reference::Previous),
    Rule::new("downwards_breakout", downwards_breakout, Signal::Nothing)
        .recording(Signal::DownwardsBreakout)
        .keep(Reference::Previous),
    Rule::new("upwards_crossover", upwards_crossover, Signal::ShortExit)
        .recording(Signal::UpwardsCrossover)
        .keep(Reference::Current),
    Rule::new("downwards_crossover", downwards_crossover, Signal::LongExit)
        .recording(Signal::DownwardsCrossover)
        .keep(Reference::Current),
];

pub const REGULAR_RULES: &[Rule<CloudInput>] = &[
    Rule::new("strong_buy", strong_buy_confirmed, Signal::StrongBuy),
    Rule::new("buy", buy_confirmed, Signal::Buy),
    Rule::new("strong_sell", strong_sell_confirmed, Signal::StrongSell),
    Rule::new("sell", sell_confirmed, Signal::Sell),
    Rule::new("long_exit_body", body_below_base, Signal::LongExit),
    Rule::new("long_exit_lines", conversion_under_base, Signal::LongExit),
    Rule::new("short_exit_body", body_above_base, Signal::ShortExit),
    Rule::new("short_exit_lines", conversion_over_base, Signal::ShortExit),
    Rule::new("roc_short_exit", momentum_rising, Signal::ShortExit),
    Rule::new("roc_long_exit", momentum_falling, Signal::LongExit),
];

impl IchimokuVariant {
    pub fn rules(&self) -> &'static [Rule<CloudInput>] {
        match self {
            IchimokuVariant::TrendFocus => TREND_RULES,
            IchimokuVariant::Regular => REGULAR_RULES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IchimokuStrategy {
    variant: IchimokuVariant,
    history: SignalHistory,
}

impl IchimokuStrategy {
    pub fn new(variant: IchimokuVariant) -> Self {
        IchimokuStrategy {
            variant,
            history: SignalHistory::new(),
        }
    }

    pub fn variant(&self) -> IchimokuVariant {
        self.variant
    }

    fn input(&self, window: &[Candle]) -> Result<CloudInput, BarbotError> {
        // Cloud and ROC values only depend on the trailing 77 candles.
        let mut oldest_first: Vec<Candle> = window[..CLOUD_MIN_CANDLES.min(window.len())].to_vec();
        oldest_first.reverse();
        let cloud = standard_cloud(&oldest_first).cloud_newest_first();
        let roc = calculate_roc(&oldest_first, ROC_PERIOD).newest_first();

        let (Some(cloud), Some(price)) = (cloud.get(..3), window.get(..3)) else {
            return Err(BarbotError::InsufficientHistory {
                have: window.len(),
                need: CLOUD_MIN_CANDLES,
            });
        };
        Ok(CloudInput {
            cloud: [cloud[0], cloud[1], cloud[2]],
            price: [price[0].clone(), price[1].clone(), price[2].clone()],
            momentum: Momentum::from_newest(&roc),
            latest_recorded: self.history.latest().map(|e| e.signal),
            previous_crossover: self.history.previous_crossover(),
        })
    }

    fn decide(&mut self, input: &CloudInput, start: DateTime<Utc>, end: DateTime<Utc>) -> Signal {
        let Some(rule) = first_match(self.variant.rules(), input) else {
            self.history.push(Signal::Nothing, start, None);
            return Signal::Nothing;
        };
        if self.history.fired_within(rule.record, start, end) {
            debug!(rule = rule.name, signal = %rule.record, "already recorded this period");
            return Signal::Nothing;
        }
        let reference = match rule.reference {
            Reference::None => None,
            Reference::Current => Some(input.price[0].clone()),
            Reference::Previous => Some(input.price[1].clone()),
        };
        self.history.push(rule.record, start, reference);
        if rule.record != Signal::Nothing {
            debug!(rule = rule.name, recorded = %rule.record, emitted = %rule.emit, time = %start, "cloud rule fired");
        }
        rule.emit
    }
}

impl Strategy for IchimokuStrategy {
    fn kind(&self) -> StrategyKind {
        match self.variant {
            IchimokuVariant::TrendFocus => StrategyKind::IchimokuTrend,
            IchimokuVariant::Regular => StrategyKind::IchimokuRegular,
        }
    }

    fn min_candles(&self) -> usize {
        CLOUD_MIN_CANDLES
    }

    fn evaluate(&mut self, candles: &[Candle]) -> Result<StrategyOutcome, BarbotError> {
        let window = traded_window(candles, CLOUD_MIN_CANDLES)?;
        let input = self.input(&window)?;

        let start = window[0].time;
        let period = (window[0].time - window[1].time).max(Duration::seconds(1));
        let signal = self.decide(&input, start, start + period);

        Ok(StrategyOutcome {
            signal,
            diagnostics: Diagnostics::Cloud {
                previous: input.cloud[1],
                current: input.cloud[0],
                previous_close: input.price[1].close,
                current_close: input.price[0].close,
            },
        })
    }

    /// Distance from the current close to the nearest recorded reference
    /// candle: its high after a downward event, its low after an upward one.
    /// Falls back to the ATR distance when nothing was recorded.
    fn stop_loss_distance(&self, candles: &[Candle]) -> Option<f64> {
        let current = candles.first()?;
        match self.stop_loss_price() {
            Some(price) => Some((current.close - price).abs()),
            None => volatility_stop(candles),
        }
    }

    fn stop_loss_price(&self) -> Option<f64> {
        self.history
            .stop_loss_reference()
            .map(|(signal, candle)| match signal {
                Signal::DownwardsBreakout | Signal::DownwardsCrossover => candle.high,
                _ => candle.low,
            })
    }

    fn history(&self) -> Option<&SignalHistory> {
        Some(&self.history)
    }

    fn warm_up(&mut self, candles: &[Candle]) {
        let len = candles.len();
        for i in WARM_UP_START..len {
            // The oldest i candles, still newest-first.
            if let Err(err) = self.evaluate(&candles[len - i..]) {
                debug!(window = i, error = %err, "warm-up window skipped");
            }
        }
        debug!(entries = self.history.len(), "warm-up replay finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn point(conversion: f64, base: f64, span_a: f64, span_b: f64) -> IchimokuPoint {
        IchimokuPoint {
            conversion,
            base,
            span_a,
            span_b,
        }
    }

    fn candle(minute: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            time: t(minute),
            open,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    /// Conversion crosses above base with everything above a cloud at 1.0-1.2.
    fn strong_buy_input() -> CloudInput {
        CloudInput {
            cloud: [
                point(1.6, 1.5, 1.2, 1.0),
                point(1.55, 1.5, 1.2, 1.0),
                point(1.45, 1.5, 1.2, 1.0),
            ],
            price: [
                candle(2, 1.5, 1.7, 1.45, 1.65),
                candle(1, 1.45, 1.6, 1.4, 1.5),
                candle(0, 1.4, 1.5, 1.35, 1.45),
            ],
            momentum: Momentum::Rising,
            latest_recorded: None,
            previous_crossover: None,
        }
    }

    fn flat_input() -> CloudInput {
        CloudInput {
            cloud: [point(1.0, 1.0, 1.0, 1.0); 3],
            price: [
                candle(2, 1.0, 1.0, 1.0, 1.0),
                candle(1, 1.0, 1.0, 1.0, 1.0),
                candle(0, 1.0, 1.0, 1.0, 1.0),
            ],
            momentum: Momentum::Mixed,
            latest_recorded: None,
            previous_crossover: None,
        }
    }

    #[test]
    fn trend_rule_order_prefers_strong_buy_over_crossover() {
        let rule = first_match(TREND_RULES, &strong_buy_input()).unwrap();
        assert_eq!(rule.name, "strong_buy");
    }

    #[test]
    fn crossover_below_cloud_is_a_short_exit() {
        let mut input = strong_buy_input();
        for p in input.cloud.iter_mut() {
            p.span_a = 3.0;
            p.span_b = 2.5;
        }
        let rule = first_match(TREND_RULES, &input).unwrap();
        assert_eq!(rule.name, "upwards_crossover");
        assert_eq!(rule.emit, Signal::ShortExit);
        assert_eq!(rule.record, Signal::UpwardsCrossover);
    }

    #[test]
    fn buy_needs_breakout_after_upward_crossover() {
        let mut input = flat_input();
        input.latest_recorded = Some(Signal::UpwardsBreakout);
        input.previous_crossover = Some(Signal::UpwardsCrossover);
        assert_eq!(first_match(TREND_RULES, &input).unwrap().emit, Signal::Buy);
        input.previous_crossover = Some(Signal::DownwardsCrossover);
        assert!(first_match(TREND_RULES, &input).is_none());
    }

    #[test]
    fn regular_strong_buy_needs_rising_momentum() {
        let mut input = strong_buy_input();
        assert_eq!(first_match(REGULAR_RULES, &input).unwrap().name, "strong_buy");
        input.momentum = Momentum::Mixed;
        // still a crossover over span B: the plain buy also needs momentum
        assert_ne!(first_match(REGULAR_RULES, &input).map(|r| r.emit), Some(Signal::Buy));
    }

    #[test]
    fn regular_falls_back_to_roc_exit() {
        let mut input = flat_input();
        input.momentum = Momentum::Falling;
        let rule = first_match(REGULAR_RULES, &input).unwrap();
        assert_eq!(rule.name, "roc_long_exit");
        assert_eq!(rule.emit, Signal::LongExit);
    }

    #[test]
    fn decide_dedups_within_period() {
        let mut strategy = IchimokuStrategy::new(IchimokuVariant::TrendFocus);
        let input = strong_buy_input();
        assert_eq!(strategy.decide(&input, t(2), t(3)), Signal::StrongBuy);
        assert_eq!(strategy.decide(&input, t(2), t(3)), Signal::Nothing);
        assert_eq!(strategy.decide(&input, t(3), t(4)), Signal::StrongBuy);
    }

    #[test]
    fn breakout_is_recorded_silently_with_previous_candle() {
        let mut strategy = IchimokuStrategy::new(IchimokuVariant::TrendFocus);
        let mut input = flat_input();
        input.cloud = [point(1.0, 1.0, 1.2, 1.1); 3];
        input.price = [
            candle(2, 1.3, 1.4, 1.25, 1.35),
            candle(1, 1.15, 1.3, 1.05, 1.25),
            candle(0, 1.1, 1.15, 1.0, 1.1),
        ];
        assert_eq!(strategy.decide(&input, t(2), t(3)), Signal::Nothing);
        let latest = strategy.history.latest().unwrap();
        assert_eq!(latest.signal, Signal::UpwardsBreakout);
        assert_eq!(latest.reference.as_ref().unwrap().time, t(1));
        assert_eq!(strategy.stop_loss_price(), Some(1.05));
    }

    #[test]
    fn stop_loss_uses_high_after_downward_event() {
        let mut strategy = IchimokuStrategy::new(IchimokuVariant::TrendFocus);
        strategy.history.push(
            Signal::DownwardsCrossover,
            t(0),
            Some(candle(0, 1.2, 1.25, 1.1, 1.15)),
        );
        let current = [candle(1, 1.1, 1.1, 1.0, 1.05)];
        let distance = strategy.stop_loss_distance(&current).unwrap();
        assert!((distance - 0.2).abs() < 1e-12);
    }

    #[test]
    fn stop_loss_without_reference_falls_back_to_atr() {
        let strategy = IchimokuStrategy::new(IchimokuVariant::TrendFocus);
        let candles: Vec<Candle> = (0..30).rev().map(|i| candle(i, 1.0, 1.1, 1.0, 1.05)).collect();
        let distance = strategy.stop_loss_distance(&candles).unwrap();
        assert!((distance - 0.2).abs() < 1e-9);
        assert!(strategy.stop_loss_price().is_none());
    }

    #[test]
    fn evaluate_requires_two_hundred_traded_candles() {
        let mut strategy = IchimokuStrategy::new(IchimokuVariant::TrendFocus);
        let mut candles: Vec<Candle> = (0..250).rev().map(|i| candle(i, 1.0, 1.1, 0.9, 1.0)).collect();
        for c in candles.iter_mut().take(60) {
            c.volume = 0.0;
        }
        match strategy.evaluate(&candles) {
            Err(BarbotError::InsufficientHistory { have, need }) => {
                assert_eq!(have, 190);
                assert_eq!(need, 200);
            }
            other => panic!("expected InsufficientHistory, got {:?}", other),
        }
    }

    #[test]
    fn flat_market_records_a_single_nothing() {
        let mut strategy = IchimokuStrategy::new(IchimokuVariant::TrendFocus);
        let candles: Vec<Candle> = (0..220).rev().map(|i| candle(i, 1.0, 1.1, 0.9, 1.0)).collect();
        for _ in 0..3 {
            let outcome = strategy.evaluate(&candles).unwrap();
            assert_eq!(outcome.signal, Signal::Nothing);
        }
        assert_eq!(strategy.history.len(), 1);
    }
}
