//! Entry guards, position sizing, stop distance and the weekend window.
//!
//! [`RiskController`] turns a signal into gateway calls. Guards run in a fixed
//! order (spread, margin, open position, funds) and each rejection is a
//! recoverable [`BarbotError`]: the signal is dropped and the next cycle
//! reassesses from fresh account state. Exit signals skip every guard.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use tracing::{debug, info, warn};

use crate::domain::account::{AccountState, InstrumentMeta, OpenPositions, Side, Venue};
use crate::domain::candle::Quote;
use crate::domain::error::BarbotError;
use crate::domain::signal::Signal;
use crate::ports::execution_port::ExecutionGateway;

/// Above this margin call percent no new entry is placed.
pub const MAX_MARGIN_CALL_PERCENT: f64 = 0.9;

/// Widest spread accepted for a candle period. Longer periods tolerate more.
pub fn max_spread_pips(period_minutes: f64) -> f64 {
    if period_minutes < 60.0 {
        3.0
    } else if period_minutes < 240.0 {
        5.0
    } else {
        10.0
    }
}

pub fn spread_pips(bid: f64, ask: f64, meta: &InstrumentMeta) -> f64 {
    (ask - bid).abs() * meta.pip_factor()
}

pub fn check_spread(
    bid: f64,
    ask: f64,
    meta: &InstrumentMeta,
    period_minutes: f64,
) -> Result<(), BarbotError> {
    let spread = spread_pips(bid, ask, meta);
    let max = max_spread_pips(period_minutes);
    if spread > max {
        return Err(BarbotError::SpreadTooWide {
            spread_pips: spread,
            max_pips: max,
        });
    }
    Ok(())
}

pub fn check_margin(account: &AccountState) -> Result<(), BarbotError> {
    if account.margin_call_percent > MAX_MARGIN_CALL_PERCENT {
        return Err(BarbotError::MarginCallRisk {
            margin_call_percent: account.margin_call_percent,
        });
    }
    Ok(())
}

/// Units purchasable from an amount of account-currency funds.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSizer {
    pub balance: f64,
    pub instruments_traded: usize,
    /// The larger of the account and instrument margin rates.
    pub margin_rate: f64,
    /// Price of one unit of the instrument's base currency in the account currency.
    pub conversion_rate: f64,
}

impl PositionSizer {
    pub fn new(
        account: &AccountState,
        meta: &InstrumentMeta,
        instruments_traded: usize,
        conversion_rate: f64,
    ) -> Self {
        PositionSizer {
            balance: account.balance,
            instruments_traded: instruments_traded.max(1),
            margin_rate: account.margin_rate.max(meta.margin_rate),
            conversion_rate,
        }
    }

    /// Balance share of one instrument; funds are split evenly.
    pub fn pair_funds(&self) -> f64 {
        self.balance / self.instruments_traded as f64
    }

    /// Two thirds of the instrument share for strong signals, one third otherwise.
    pub fn allocable_funds(&self, strong: bool) -> f64 {
        let third = self.pair_funds() / 3.0;
        if strong { third * 2.0 } else { third }
    }

    pub fn units(&self, funds: f64) -> i64 {
        let divisor = self.margin_rate * self.conversion_rate;
        if !(divisor > 0.0) || !funds.is_finite() || funds <= 0.0 {
            return 0;
        }
        (funds / self.margin_rate / self.conversion_rate).floor() as i64
    }

    /// Cap on units committed to the instrument.
    pub fn max_units(&self) -> i64 {
        self.units(self.pair_funds())
    }

    pub fn has_reached_funds_limit(&self, order_units: i64, allocated_units: i64) -> bool {
        allocated_units + order_units > self.max_units()
    }

    pub fn check_funds(&self, order_units: i64, allocated_units: i64) -> Result<(), BarbotError> {
        if self.has_reached_funds_limit(order_units, allocated_units) {
            return Err(BarbotError::FundsLimitExceeded {
                requested: order_units,
                allocated: allocated_units,
                max: self.max_units(),
            });
        }
        Ok(())
    }
}

/// Engine stop distance floored at the venue's minimum trailing stop,
/// rounded to pip precision.
pub fn stop_distance(strategy_distance: Option<f64>, meta: &InstrumentMeta) -> f64 {
    let distance = strategy_distance
        .filter(|d| d.is_finite())
        .unwrap_or(0.0)
        .max(meta.min_trailing_stop_distance);
    meta.round_to_pip(distance)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketWindow {
    Open,
    /// Last minutes before the Friday close: flatten once.
    CloseOut,
    Closed,
}

/// FX market hours. Closed Friday 21:00 to Sunday 21:00 UTC.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeekendGuard {
    closed_before_weekend: bool,
}

impl WeekendGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_weekend(now: DateTime<Utc>) -> bool {
        match now.weekday() {
            Weekday::Fri => now.hour() >= 21,
            Weekday::Sat => true,
            Weekday::Sun => now.hour() < 21,
            _ => false,
        }
    }

    pub fn check(&mut self, now: DateTime<Utc>) -> MarketWindow {
        if Self::is_weekend(now) {
            if self.closed_before_weekend {
                info!("market closed for the weekend");
                self.closed_before_weekend = false;
            }
            return MarketWindow::Closed;
        }
        if !self.closed_before_weekend
            && now.weekday() == Weekday::Fri
            && now.hour() == 20
            && now.minute() >= 55
        {
            self.closed_before_weekend = true;
            return MarketWindow::CloseOut;
        }
        MarketWindow::Open
    }

    pub fn closed_before_weekend(&self) -> bool {
        self.closed_before_weekend
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskConfig {
    pub period_minutes: f64,
    pub instruments_traded: usize,
    pub venue: Venue,
    /// When false signals are only logged.
    pub can_trade: bool,
    /// Query conversion rates as of the quote time instead of now.
    pub historical_rates: bool,
}

pub struct RiskController {
    instrument: String,
    meta: InstrumentMeta,
    config: RiskConfig,
    weekend: WeekendGuard,
    gateway: Arc<dyn ExecutionGateway>,
}

impl RiskController {
    pub fn new(meta: InstrumentMeta, config: RiskConfig, gateway: Arc<dyn ExecutionGateway>) -> Self {
        RiskController {
            instrument: meta.name.clone(),
            meta,
            config,
            weekend: WeekendGuard::new(),
            gateway,
        }
    }

    pub fn meta(&self) -> &InstrumentMeta {
        &self.meta
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Act on a signal. Returns whether any order was placed or closed.
    pub async fn on_signal(
        &mut self,
        signal: Signal,
        quote: &Quote,
        strategy_stop: Option<f64>,
    ) -> Result<bool, BarbotError> {
        if signal == Signal::Nothing || signal.is_internal() {
            return Ok(false);
        }
        if !self.config.can_trade {
            info!(instrument = %self.instrument, signal = %signal, "trading disabled, signal ignored");
            return Ok(false);
        }

        if let Some(side) = signal.exit_side() {
            return self.close_if_open(side).await;
        }
        let Some(side) = signal.entry_side() else {
            return Ok(false);
        };
        if side == Side::Short && !self.config.venue.allows_short() {
            return self.close_if_open(Side::Long).await;
        }
        self.enter(side, signal.is_strong(), quote, strategy_stop).await
    }

    async fn enter(
        &mut self,
        side: Side,
        strong: bool,
        quote: &Quote,
        strategy_stop: Option<f64>,
    ) -> Result<bool, BarbotError> {
        check_spread(quote.bid, quote.ask, &self.meta, self.config.period_minutes)?;

        let account = self.gateway.account_summary().await?;
        check_margin(&account)?;

        let mut positions = self.gateway.open_positions().await?;
        if positions.is_open(side) {
            return Err(BarbotError::PositionAlreadyOpen {
                instrument: self.instrument.clone(),
                side,
            });
        }
        if positions.is_open(side.opposite()) {
            self.close(side.opposite()).await?;
            clear_side(&mut positions, side.opposite());
        }

        let as_of = self.config.historical_rates.then_some(quote.time);
        let rate = self.conversion_rate(&account, as_of).await?;
        let sizer = PositionSizer::new(&account, &self.meta, self.config.instruments_traded, rate);
        let units = sizer.units(sizer.allocable_funds(strong));
        if units <= 0 {
            debug!(instrument = %self.instrument, balance = account.balance, "no units affordable");
            return Ok(false);
        }
        sizer.check_funds(units, positions.allocated_units())?;

        let stop = stop_distance(strategy_stop, &self.meta);
        match side {
            Side::Long => self.gateway.open_long(units, stop).await?,
            Side::Short => self.gateway.open_short(units, stop).await?,
        }
        info!(
            instrument = %self.instrument,
            side = %side,
            units,
            stop_distance = stop,
            strong,
            "position opened"
        );
        Ok(true)
    }

    async fn conversion_rate(
        &self,
        account: &AccountState,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<f64, BarbotError> {
        if self.meta.quoted_in(&account.currency) {
            return Ok(1.0);
        }
        self.gateway
            .conversion_rate(self.meta.base_currency(), as_of)
            .await
    }

    async fn close_if_open(&self, side: Side) -> Result<bool, BarbotError> {
        let positions = self.gateway.open_positions().await?;
        if !positions.is_open(side) {
            return Ok(false);
        }
        self.close(side).await?;
        Ok(true)
    }

    async fn close(&self, side: Side) -> Result<(), BarbotError> {
        match side {
            Side::Long => self.gateway.close_long().await?,
            Side::Short => self.gateway.close_short().await?,
        }
        info!(instrument = %self.instrument, side = %side, "position closed");
        Ok(())
    }

    /// Weekend handling for venues that close. On close-out both sides are
    /// flattened; callers skip the cycle while the window is `Closed`.
    pub async fn check_weekend(&mut self, now: DateTime<Utc>) -> Result<MarketWindow, BarbotError> {
        if !self.config.venue.has_weekend_close() {
            return Ok(MarketWindow::Open);
        }
        let window = self.weekend.check(now);
        if window == MarketWindow::CloseOut {
            warn!(instrument = %self.instrument, "closing positions before the weekend");
            if self.config.can_trade {
                for side in [Side::Long, Side::Short] {
                    self.close_if_open(side).await?;
                }
            }
        }
        Ok(window)
    }
}

fn clear_side(positions: &mut OpenPositions, side: Side) {
    match side {
        Side::Long => positions.long = None,
        Side::Short => positions.short = None,
    }
}
