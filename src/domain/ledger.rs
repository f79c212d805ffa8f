//! Synthetic account used by the backtrack simulator.
//!
//! Implements [`ExecutionGateway`] so the same [`RiskController`] drives
//! simulated and live trading. Fills happen at the quote set for the current
//! bar: longs enter at the ask and exit at the bid, shorts the reverse.
//! Realised P&L is in the quote currency and is converted to the account
//! currency at close. Stop-losses, financing and slippage are not simulated.
//!
//! [`RiskController`]: crate::domain::risk::RiskController

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::domain::account::{AccountState, InstrumentMeta, OpenPositions, Position, Side};
use crate::domain::candle::Quote;
use crate::domain::error::BarbotError;
use crate::ports::execution_port::ExecutionGateway;

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub side: Side,
    pub units: i64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    /// Quote currency to account currency at the exit.
    pub conversion_rate: f64,
    pub pnl: f64,
    /// Balance right after the trade was realised.
    pub balance_after: f64,
}

/// Conversion rates over time: currency, then time, to the price of one unit
/// in the account currency.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateTable {
    rates: HashMap<String, BTreeMap<DateTime<Utc>, f64>>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, currency: &str, time: DateTime<Utc>, rate: f64) {
        self.rates
            .entry(currency.to_ascii_uppercase())
            .or_default()
            .insert(time, rate);
    }

    /// Latest rate at or before `as_of`, or the newest one when no time is given.
    pub fn rate_at(&self, currency: &str, as_of: Option<DateTime<Utc>>) -> Option<f64> {
        let series = self.rates.get(&currency.to_ascii_uppercase())?;
        match as_of {
            Some(time) => series.range(..=time).next_back().map(|(_, rate)| *rate),
            None => series.values().next_back().copied(),
        }
    }

    pub fn len(&self) -> usize {
        self.rates.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
struct OpenTrade {
    side: Side,
    units: i64,
    entry_price: f64,
    entry_time: DateTime<Utc>,
}

#[derive(Debug)]
struct LedgerState {
    account: AccountState,
    quote: Option<Quote>,
    open: Option<OpenTrade>,
    trades: Vec<ClosedTrade>,
}

pub struct SimulatedGateway {
    meta: InstrumentMeta,
    /// Currency -> price in the account currency, used when the table has no
    /// entry for the time asked.
    rates: HashMap<String, f64>,
    table: RateTable,
    state: Mutex<LedgerState>,
}

impl SimulatedGateway {
    pub fn new(account: AccountState, meta: InstrumentMeta) -> Self {
        SimulatedGateway {
            meta,
            rates: HashMap::new(),
            table: RateTable::new(),
            state: Mutex::new(LedgerState {
                account,
                quote: None,
                open: None,
                trades: Vec::new(),
            }),
        }
    }

    /// Fixed conversion rate for a currency other than the account's.
    pub fn with_rate(mut self, currency: &str, rate: f64) -> Self {
        self.rates.insert(currency.to_ascii_uppercase(), rate);
        self
    }

    pub fn with_rate_table(mut self, table: RateTable) -> Self {
        self.table = table;
        self
    }

    /// Price every following fill and close happens at.
    pub fn set_quote(&self, quote: Quote) -> Result<(), BarbotError> {
        self.lock()?.quote = Some(quote);
        Ok(())
    }

    pub fn balance(&self) -> Result<f64, BarbotError> {
        Ok(self.lock()?.account.balance)
    }

    pub fn trades(&self) -> Result<Vec<ClosedTrade>, BarbotError> {
        Ok(self.lock()?.trades.clone())
    }

    pub fn has_open_trade(&self) -> Result<bool, BarbotError> {
        Ok(self.lock()?.open.is_some())
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>, BarbotError> {
        self.state.lock().map_err(|_| BarbotError::GatewayRequestFailed {
            reason: "ledger state poisoned".to_string(),
        })
    }

    fn rate_for(
        &self,
        currency: &str,
        account_currency: &str,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<f64, BarbotError> {
        if currency.eq_ignore_ascii_case(account_currency) {
            return Ok(1.0);
        }
        self.table
            .rate_at(currency, as_of)
            .or_else(|| self.rates.get(&currency.to_ascii_uppercase()).copied())
            .ok_or_else(|| BarbotError::GatewayRequestFailed {
                reason: format!("no conversion rate for {currency}"),
            })
    }

    /// Rate turning quote-currency P&L into the account currency at `quote`.
    fn closing_rate(&self, quote: &Quote, account_currency: &str) -> Result<f64, BarbotError> {
        if self.meta.quote_currency().eq_ignore_ascii_case(account_currency) {
            return Ok(1.0);
        }
        if self.meta.base_currency().eq_ignore_ascii_case(account_currency) {
            let mid = (quote.bid + quote.ask) / 2.0;
            if mid <= 0.0 {
                return Err(BarbotError::GatewayRequestFailed {
                    reason: format!("cannot convert at price {mid}"),
                });
            }
            return Ok(1.0 / mid);
        }
        self.rate_for(self.meta.quote_currency(), account_currency, Some(quote.time))
    }

    fn open(&self, side: Side, units: i64) -> Result<(), BarbotError> {
        let mut state = self.lock()?;
        let quote = current_quote(&state)?;
        if state.open.is_some() {
            return Err(BarbotError::PositionAlreadyOpen {
                instrument: self.meta.name.clone(),
                side,
            });
        }
        let entry_price = match side {
            Side::Long => quote.ask,
            Side::Short => quote.bid,
        };
        state.open = Some(OpenTrade {
            side,
            units,
            entry_price,
            entry_time: quote.time,
        });
        Ok(())
    }

    fn close(&self, side: Side) -> Result<(), BarbotError> {
        let mut state = self.lock()?;
        let quote = current_quote(&state)?;
        let Some(trade) = state.open.take_if(|t| t.side == side) else {
            return Ok(());
        };
        let exit_price = match side {
            Side::Long => quote.bid,
            Side::Short => quote.ask,
        };
        let rate = self.closing_rate(&quote, &state.account.currency)?;
        let pnl = (exit_price - trade.entry_price) * side.sign() * trade.units as f64 * rate;
        state.account.balance += pnl;
        let balance_after = state.account.balance;
        info!(
            instrument = %self.meta.name,
            side = %side,
            pnl,
            balance = balance_after,
            "simulated trade closed"
        );
        state.trades.push(ClosedTrade {
            side,
            units: trade.units,
            entry_price: trade.entry_price,
            exit_price,
            entry_time: trade.entry_time,
            exit_time: quote.time,
            conversion_rate: rate,
            pnl,
            balance_after,
        });
        Ok(())
    }
}

fn current_quote(state: &LedgerState) -> Result<Quote, BarbotError> {
    state.quote.ok_or_else(|| BarbotError::GatewayRequestFailed {
        reason: "no quote set for the simulated bar".to_string(),
    })
}

#[async_trait]
impl ExecutionGateway for SimulatedGateway {
    async fn account_summary(&self) -> Result<AccountState, BarbotError> {
        Ok(self.lock()?.account.clone())
    }

    async fn instrument_meta(&self) -> Result<InstrumentMeta, BarbotError> {
        Ok(self.meta.clone())
    }

    async fn open_positions(&self) -> Result<OpenPositions, BarbotError> {
        let state = self.lock()?;
        let mut positions = OpenPositions::default();
        if let Some(trade) = &state.open {
            let position = Position {
                instrument: self.meta.name.clone(),
                side: trade.side,
                units: trade.units * trade.side.sign() as i64,
                entry_price: trade.entry_price,
            };
            match trade.side {
                Side::Long => positions.long = Some(position),
                Side::Short => positions.short = Some(position),
            }
        }
        Ok(positions)
    }

    async fn open_long(&self, units: i64, _stop_loss_distance: f64) -> Result<(), BarbotError> {
        self.open(Side::Long, units)
    }

    async fn open_short(&self, units: i64, _stop_loss_distance: f64) -> Result<(), BarbotError> {
        self.open(Side::Short, units)
    }

    async fn close_long(&self) -> Result<(), BarbotError> {
        self.close(Side::Long)
    }

    async fn close_short(&self) -> Result<(), BarbotError> {
        self.close(Side::Short)
    }

    async fn conversion_rate(
        &self,
        currency: &str,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<f64, BarbotError> {
        let account_currency = self.lock()?.account.currency.clone();
        self.rate_for(currency, &account_currency, as_of)
    }
}
