//! Building and validating run configuration from a [`ConfigPort`].
//!
//! Every value is checked before a run starts; a bad value is reported as
//! `ConfigInvalid` naming the section and key.

use std::time::Duration;

use crate::domain::account::{AccountState, InstrumentMeta, Venue};
use crate::domain::backtest::BacktestConfig;
use crate::domain::error::BarbotError;
use crate::domain::ledger::RateTable;
use crate::domain::strategy::{MaPeriods, StrategyKind};
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_PERIOD_MINUTES: f64 = 5.0;
pub const DEFAULT_POLL_INTERVAL_SECS: i64 = 5;
pub const DEFAULT_RECONNECT_INTERVAL_SECS: i64 = 30;
pub const DEFAULT_NOTIFY_EVERY: i64 = 30;
pub const DEFAULT_HISTORY_COUNT: i64 = 500;

/// Live trading settings for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct TraderConfig {
    pub instrument: String,
    pub venue: Venue,
    pub strategy: StrategyKind,
    pub period_minutes: f64,
    pub instruments_traded: usize,
    pub poll_interval: Duration,
    pub reconnect_interval: Duration,
    /// Reconnect attempts between escalated log lines.
    pub notify_every: u32,
    pub can_trade: bool,
    /// Candles fetched when the buffer is (re)built.
    pub history_count: usize,
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> BarbotError {
    BarbotError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn positive_int(config: &dyn ConfigPort, section: &str, key: &str, default: i64) -> Result<i64, BarbotError> {
    let value = config.get_int(section, key, default);
    if value <= 0 {
        return Err(invalid(section, key, format!("{key} must be positive")));
    }
    Ok(value)
}

fn positive_double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, BarbotError> {
    let value = config.get_double(section, key, default);
    if !(value > 0.0) || !value.is_finite() {
        return Err(invalid(section, key, format!("{key} must be positive")));
    }
    Ok(value)
}

pub fn ma_periods(config: &dyn ConfigPort) -> Result<MaPeriods, BarbotError> {
    let defaults = MaPeriods::default();
    let periods = MaPeriods {
        short: positive_int(config, "trader", "ma_short", defaults.short as i64)? as usize,
        long: positive_int(config, "trader", "ma_long", defaults.long as i64)? as usize,
        base: positive_int(config, "trader", "ma_base", defaults.base as i64)? as usize,
    };
    if periods.short >= periods.long {
        return Err(invalid("trader", "ma_short", "ma_short must be below ma_long"));
    }
    if periods.long >= periods.base {
        return Err(invalid("trader", "ma_long", "ma_long must be below ma_base"));
    }
    Ok(periods)
}

pub fn strategy_kind(config: &dyn ConfigPort) -> Result<StrategyKind, BarbotError> {
    let name = config.require_string("trader", "strategy")?;
    let periods = ma_periods(config)?;
    StrategyKind::parse(&name, periods).ok_or_else(|| {
        invalid(
            "trader",
            "strategy",
            format!("unknown strategy '{name}', expected ichimoku, ichimoku_regular, sma or ema"),
        )
    })
}

pub fn venue(config: &dyn ConfigPort) -> Result<Venue, BarbotError> {
    match config.get_string("trader", "venue") {
        None => Ok(Venue::Fx),
        Some(s) => Venue::parse(&s)
            .ok_or_else(|| invalid("trader", "venue", format!("unknown venue '{s}', expected fx or spot"))),
    }
}

pub fn period_minutes(config: &dyn ConfigPort) -> Result<f64, BarbotError> {
    positive_double(config, "trader", "period_minutes", DEFAULT_PERIOD_MINUTES)
}

pub fn instruments_traded(config: &dyn ConfigPort) -> Result<usize, BarbotError> {
    Ok(positive_int(config, "trader", "instruments_traded", 1)? as usize)
}

pub fn trader_config(config: &dyn ConfigPort) -> Result<TraderConfig, BarbotError> {
    let notify_every = positive_int(config, "trader", "notify_every", DEFAULT_NOTIFY_EVERY)?;
    let notify_every = u32::try_from(notify_every)
        .map_err(|_| invalid("trader", "notify_every", "notify_every is too large"))?;
    Ok(TraderConfig {
        instrument: config.require_string("trader", "instrument")?,
        venue: venue(config)?,
        strategy: strategy_kind(config)?,
        period_minutes: period_minutes(config)?,
        instruments_traded: instruments_traded(config)?,
        poll_interval: Duration::from_secs(
            positive_int(config, "trader", "poll_interval_secs", DEFAULT_POLL_INTERVAL_SECS)? as u64,
        ),
        reconnect_interval: Duration::from_secs(positive_int(
            config,
            "trader",
            "reconnect_interval_secs",
            DEFAULT_RECONNECT_INTERVAL_SECS,
        )? as u64),
        notify_every,
        can_trade: config.get_bool("trader", "can_trade", true),
        history_count: positive_int(config, "trader", "history_count", DEFAULT_HISTORY_COUNT)?
            as usize,
    })
}

pub fn instrument_meta(config: &dyn ConfigPort) -> Result<InstrumentMeta, BarbotError> {
    let pip_location = config.get_int("instrument", "pip_location", -4);
    if !(-10..=0).contains(&pip_location) {
        return Err(invalid(
            "instrument",
            "pip_location",
            "pip_location must be between -10 and 0",
        ));
    }
    let min_trailing_stop_distance = config.get_double("instrument", "min_trailing_stop_distance", 0.0005);
    if min_trailing_stop_distance < 0.0 {
        return Err(invalid(
            "instrument",
            "min_trailing_stop_distance",
            "min_trailing_stop_distance must be non-negative",
        ));
    }
    let display_precision = config.get_int("instrument", "display_precision", 5);
    let display_precision = u32::try_from(display_precision)
        .map_err(|_| invalid("instrument", "display_precision", "display_precision must be non-negative"))?;
    Ok(InstrumentMeta {
        name: config.require_string("trader", "instrument")?,
        pip_location: pip_location as i32,
        min_trailing_stop_distance,
        margin_rate: positive_double(config, "instrument", "margin_rate", 0.02)?,
        display_precision,
    })
}

pub fn account_state(config: &dyn ConfigPort) -> Result<AccountState, BarbotError> {
    let margin_call_percent = config.get_double("backtest", "margin_call_percent", 0.0);
    if !(0.0..=1.0).contains(&margin_call_percent) {
        return Err(invalid(
            "backtest",
            "margin_call_percent",
            "margin_call_percent must be between 0 and 1",
        ));
    }
    Ok(AccountState {
        balance: positive_double(config, "backtest", "initial_balance", 0.0)?,
        margin_rate: positive_double(config, "backtest", "margin_rate", 0.02)?,
        margin_call_percent,
        currency: config.require_string("backtest", "currency")?,
    })
}

/// CSV of bid/ask candles the backtrack replays.
pub fn backtest_data_path(config: &dyn ConfigPort) -> Result<String, BarbotError> {
    config.require_string("backtest", "data")
}

/// Optional CSV of `time,currency,rate` rows the backtrack converts with.
pub fn backtest_rates_path(config: &dyn ConfigPort) -> Option<String> {
    config.get_string("backtest", "rates")
}

/// The rate table itself is loaded separately; see [`backtest_rates_path`].
pub fn backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, BarbotError> {
    let account = account_state(config)?;
    let meta = instrument_meta(config)?;
    let conversion_rate = if meta.quoted_in(&account.currency) {
        1.0
    } else {
        positive_double(config, "backtest", "conversion_rate", 1.0)?
    };
    let holds_account_currency = meta.quoted_in(&account.currency)
        || meta.quote_currency().eq_ignore_ascii_case(&account.currency);
    let quote_conversion_rate = if holds_account_currency {
        1.0
    } else {
        positive_double(config, "backtest", "quote_conversion_rate", 1.0)?
    };
    Ok(BacktestConfig {
        strategy: strategy_kind(config)?,
        period_minutes: period_minutes(config)?,
        instruments_traded: instruments_traded(config)?,
        venue: venue(config)?,
        account,
        meta,
        conversion_rate,
        quote_conversion_rate,
        rates: RateTable::new(),
    })
}

/// Every check a live run or backtest depends on.
pub fn validate(config: &dyn ConfigPort) -> Result<(), BarbotError> {
    trader_config(config)?;
    instrument_meta(config)?;
    if config.get_string("backtest", "data").is_some() {
        backtest_config(config)?;
    }
    Ok(())
}
