//! Account, instrument and position state as reported by the execution venue.

use std::fmt;

/// Trading venue. The FX broker allows shorting and closes for the weekend;
/// the spot exchange does neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Venue {
    Fx,
    Spot,
}

impl Venue {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fx" | "oanda" => Some(Venue::Fx),
            "spot" | "coinbase" => Some(Venue::Spot),
            _ => None,
        }
    }

    pub fn allows_short(&self) -> bool {
        matches!(self, Venue::Fx)
    }

    pub fn has_weekend_close(&self) -> bool {
        matches!(self, Venue::Fx)
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Venue::Fx => write!(f, "fx"),
            Venue::Spot => write!(f, "spot"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub instrument: String,
    pub side: Side,
    pub units: i64,
    pub entry_price: f64,
}

/// At most one position per side per instrument.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpenPositions {
    pub long: Option<Position>,
    pub short: Option<Position>,
}

impl OpenPositions {
    pub fn get(&self, side: Side) -> Option<&Position> {
        match side {
            Side::Long => self.long.as_ref(),
            Side::Short => self.short.as_ref(),
        }
        .filter(|p| p.units != 0)
    }

    pub fn is_open(&self, side: Side) -> bool {
        self.get(side).is_some()
    }

    /// Units committed on the instrument across both sides.
    pub fn allocated_units(&self) -> i64 {
        [Side::Long, Side::Short]
            .iter()
            .filter_map(|s| self.get(*s))
            .map(|p| p.units.abs())
            .sum()
    }

    pub fn is_flat(&self) -> bool {
        !self.is_open(Side::Long) && !self.is_open(Side::Short)
    }
}

/// Snapshot of the account, refreshed before every entry decision.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountState {
    pub balance: f64,
    pub margin_rate: f64,
    pub margin_call_percent: f64,
    pub currency: String,
}

/// Static per-session instrument properties.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentMeta {
    pub name: String,
    pub pip_location: i32,
    pub min_trailing_stop_distance: f64,
    pub margin_rate: f64,
    pub display_precision: u32,
}

impl InstrumentMeta {
    /// Multiplier turning a price difference into pips.
    pub fn pip_factor(&self) -> f64 {
        10f64.powi(self.pip_location.abs())
    }

    /// Round a price distance to pip precision.
    pub fn round_to_pip(&self, value: f64) -> f64 {
        let factor = self.pip_factor();
        (value * factor).round() / factor
    }

    /// Base currency: "EUR" for "EUR_USD", "BTC" for "BTC-EUR".
    pub fn base_currency(&self) -> &str {
        self.name
            .split(['_', '-', '/'])
            .next()
            .unwrap_or(self.name.as_str())
    }

    /// Currency prices and P&L are denominated in.
    pub fn quote_currency(&self) -> &str {
        self.name
            .split(['_', '-', '/'])
            .nth(1)
            .unwrap_or(self.name.as_str())
    }

    /// Whether units are already denominated in the account currency.
    pub fn quoted_in(&self, account_currency: &str) -> bool {
        self.base_currency().eq_ignore_ascii_case(account_currency)
    }
}
