//! Backtrack simulator: replays historical bid/ask candles through a strategy
//! and the risk controller against a synthetic account.
//!
//! The oldest [`SEED_BARS`] candles seed the window; every later candle is
//! prepended in time order, evaluated, and any signal is acted on at that
//! candle's bid/ask close. The run stops early once the balance is gone.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::domain::account::{AccountState, InstrumentMeta, Venue};
use crate::domain::candle::{Candle, CandleBuffer, HistoricalCandle, Quote};
use crate::domain::error::BarbotError;
use crate::domain::ledger::{ClosedTrade, RateTable, SimulatedGateway};
use crate::domain::risk::{RiskConfig, RiskController};
use crate::domain::signal::{Signal, SignalHistoryEntry};
use crate::domain::strategy::{StrategyKind, build_strategy};

pub const SEED_BARS: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub strategy: StrategyKind,
    pub period_minutes: f64,
    pub instruments_traded: usize,
    pub venue: Venue,
    pub account: AccountState,
    pub meta: InstrumentMeta,
    /// Price of the instrument's base currency in the account currency.
    /// Ignored when both are the same.
    pub conversion_rate: f64,
    /// Price of the quote currency in the account currency, for closing
    /// trades on a pair that holds neither side in the account currency.
    pub quote_conversion_rate: f64,
    /// Time-indexed rates; they win over the constants where they cover a bar.
    pub rates: RateTable,
}

/// One non-`Nothing` signal and what the controller did with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub time: DateTime<Utc>,
    pub signal: Signal,
    pub bid: f64,
    pub ask: f64,
    pub acted: bool,
    /// Guard that dropped the signal, if any.
    pub rejection: Option<String>,
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub initial_balance: f64,
    pub final_balance: f64,
    pub decisions: Vec<Decision>,
    /// The engine's own signal history, newest-first. Empty for engines
    /// that keep none.
    pub history: Vec<SignalHistoryEntry>,
    pub trades: Vec<ClosedTrade>,
    pub bars_replayed: usize,
    pub ruined: bool,
}

pub async fn run_backtrack(
    bars: &[HistoricalCandle],
    config: &BacktestConfig,
) -> Result<BacktestResult, BarbotError> {
    if bars.len() <= SEED_BARS {
        return Err(BarbotError::InsufficientHistory {
            have: bars.len(),
            need: SEED_BARS + 1,
        });
    }
    let mut ordered = bars.to_vec();
    ordered.sort_by_key(|b| b.candle.time);

    let gateway = Arc::new(
        SimulatedGateway::new(config.account.clone(), config.meta.clone())
            .with_rate(config.meta.base_currency(), config.conversion_rate)
            .with_rate(config.meta.quote_currency(), config.quote_conversion_rate)
            .with_rate_table(config.rates.clone()),
    );
    let mut controller = RiskController::new(
        config.meta.clone(),
        RiskConfig {
            period_minutes: config.period_minutes,
            instruments_traded: config.instruments_traded,
            venue: config.venue,
            can_trade: true,
            historical_rates: true,
        },
        gateway.clone(),
    );
    let mut strategy = build_strategy(config.strategy);

    let (seed, replay) = ordered.split_at(SEED_BARS);
    let mut buffer =
        CandleBuffer::from_candles(seed.iter().map(|b| b.candle.clone()).collect::<Vec<Candle>>());
    info!(
        instrument = %config.meta.name,
        strategy = %config.strategy,
        balance = config.account.balance,
        bars = replay.len(),
        "backtrack started"
    );

    let mut decisions = Vec::new();
    let mut bars_replayed = 0;
    let mut ruined = false;

    for bar in replay {
        buffer.push_front(bar.candle.clone());
        bars_replayed += 1;

        let outcome = match strategy.evaluate(buffer.as_slice()) {
            Ok(outcome) => outcome,
            Err(BarbotError::InsufficientHistory { have, need }) => {
                debug!(have, need, time = %bar.candle.time, "bar skipped");
                continue;
            }
            Err(err) => return Err(err),
        };
        if outcome.signal == Signal::Nothing {
            continue;
        }

        let quote = Quote {
            time: bar.candle.time,
            bid: bar.bid,
            ask: bar.ask,
        };
        gateway.set_quote(quote)?;
        let stop = strategy.stop_loss_distance(buffer.as_slice());
        let (acted, rejection) = match controller.on_signal(outcome.signal, &quote, stop).await {
            Ok(acted) => (acted, None),
            Err(err) if err.is_recoverable() => {
                debug!(signal = %outcome.signal, reason = %err, "signal dropped");
                (false, Some(err.to_string()))
            }
            Err(err) => return Err(err),
        };
        let balance = gateway.balance()?;
        decisions.push(Decision {
            time: bar.candle.time,
            signal: outcome.signal,
            bid: bar.bid,
            ask: bar.ask,
            acted,
            rejection,
            balance,
        });

        if balance <= 0.0 {
            warn!(instrument = %config.meta.name, balance, "account ruined, backtrack stopped");
            ruined = true;
            break;
        }
    }

    let final_balance = gateway.balance()?;
    info!(
        instrument = %config.meta.name,
        final_balance,
        decisions = decisions.len(),
        "backtrack finished"
    );
    Ok(BacktestResult {
        initial_balance: config.account.balance,
        final_balance,
        decisions,
        history: strategy.history().map(|h| h.snapshot()).unwrap_or_default(),
        trades: gateway.trades()?,
        bars_replayed,
        ruined,
    })
}
