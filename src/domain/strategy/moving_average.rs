//! Three moving averages (short/long/base) crossover engine, SMA or EMA.
//!
//! Only the last emitted signal is remembered: the same signal is not emitted
//! twice in a row, and any evaluation with no crossover and no candle pattern
//! resets that memory.

use std::fmt;

use crate::domain::candle::Candle;
use crate::domain::error::BarbotError;
use crate::domain::indicator::IndicatorSeries;
use crate::domain::indicator::ema::calculate_ema;
use crate::domain::indicator::sma::calculate_sma;
use crate::domain::signal::Signal;
use crate::domain::strategy::patterns::three_body_exit;
use crate::domain::strategy::rules::{Rule, first_match};
use crate::domain::strategy::{
    Diagnostics, MaPeriods, MaTriple, Strategy, StrategyKind, StrategyOutcome, traded_window,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovingAverageKind {
    Simple,
    Exponential,
}

impl MovingAverageKind {
    fn calculate(&self, candles: &[Candle], period: usize) -> IndicatorSeries {
        match self {
            MovingAverageKind::Simple => calculate_sma(candles, period),
            MovingAverageKind::Exponential => calculate_ema(candles, period),
        }
    }
}

impl fmt::Display for MovingAverageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MovingAverageKind::Simple => write!(f, "SMA"),
            MovingAverageKind::Exponential => write!(f, "EMA"),
        }
    }
}

/// Newest-first pairs: index 0 current, 1 previous.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaInput {
    pub short: [f64; 2],
    pub long: [f64; 2],
    pub base: [f64; 2],
    pub candle_exit: Signal,
}

fn strong_buy(i: &MaInput) -> bool {
    i.short[0] > i.long[0] && i.long[1] <= i.base[1] && i.long[0] > i.base[0]
}

fn buy(i: &MaInput) -> bool {
    i.short[1] <= i.long[1] && i.short[0] > i.long[0]
}

fn sell(i: &MaInput) -> bool {
    i.short[1] >= i.long[1] && i.short[0] < i.long[0]
}

fn strong_sell(i: &MaInput) -> bool {
    i.short[0] < i.long[0] && i.long[1] >= i.base[1] && i.long[0] < i.base[0]
}

fn red_bodies(i: &MaInput) -> bool {
    i.candle_exit == Signal::LongExit
}

fn green_bodies(i: &MaInput) -> bool {
    i.candle_exit == Signal::ShortExit
}

pub const MA_RULES: &[Rule<MaInput>] = &[
    Rule::new("strong_buy", strong_buy, Signal::StrongBuy),
    Rule::new("buy", buy, Signal::Buy),
    Rule::new("sell", sell, Signal::Sell),
    Rule::new("strong_sell", strong_sell, Signal::StrongSell),
    Rule::new("three_red_bodies", red_bodies, Signal::LongExit),
    Rule::new("three_green_bodies", green_bodies, Signal::ShortExit),
];

#[derive(Debug, Clone)]
pub struct MovingAverageStrategy {
    average: MovingAverageKind,
    periods: MaPeriods,
    last_emitted: Signal,
}

impl MovingAverageStrategy {
    pub fn new(average: MovingAverageKind, periods: MaPeriods) -> Self {
        MovingAverageStrategy {
            average,
            periods,
            last_emitted: Signal::Nothing,
        }
    }

    pub fn last_emitted(&self) -> Signal {
        self.last_emitted
    }

    fn decide(&mut self, input: &MaInput) -> Signal {
        match first_match(MA_RULES, input) {
            Some(rule) if rule.emit == self.last_emitted => Signal::Nothing,
            Some(rule) => {
                self.last_emitted = rule.emit;
                rule.emit
            }
            None => {
                self.last_emitted = Signal::Nothing;
                Signal::Nothing
            }
        }
    }
}

fn pair(values: &[f64], needed: usize) -> Result<[f64; 2], BarbotError> {
    match values {
        [current, previous, ..] => Ok([*current, *previous]),
        _ => Err(BarbotError::InsufficientHistory {
            have: values.len(),
            need: needed,
        }),
    }
}

impl Strategy for MovingAverageStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MovingAverageCrossover {
            average: self.average,
            periods: self.periods,
        }
    }

    /// Two values of the slowest average, and four candles for the body pattern.
    fn min_candles(&self) -> usize {
        let slowest = self.periods.short.max(self.periods.long).max(self.periods.base);
        (slowest + 1).max(4)
    }

    fn evaluate(&mut self, candles: &[Candle]) -> Result<StrategyOutcome, BarbotError> {
        let need = self.min_candles();
        let window = traded_window(candles, need)?;
        let mut oldest_first = window.clone();
        oldest_first.reverse();

        let short = self.average.calculate(&oldest_first, self.periods.short).newest_first();
        let long = self.average.calculate(&oldest_first, self.periods.long).newest_first();
        let base = self.average.calculate(&oldest_first, self.periods.base).newest_first();

        let input = MaInput {
            short: pair(&short, need)?,
            long: pair(&long, need)?,
            base: pair(&base, need)?,
            candle_exit: three_body_exit(&window),
        };
        let signal = self.decide(&input);

        Ok(StrategyOutcome {
            signal,
            diagnostics: Diagnostics::MovingAverages {
                previous: MaTriple {
                    short: input.short[1],
                    long: input.long[1],
                    base: input.base[1],
                },
                current: MaTriple {
                    short: input.short[0],
                    long: input.long[0],
                    base: input.base[0],
                },
            },
        })
    }
}
