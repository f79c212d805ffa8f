//! Domain error types.

use crate::domain::account::Side;

/// A malformed venue payload or input record.
#[derive(Debug, Clone, thiserror::Error)]
#[error("parse error in {source_name} at record {position}: {message}")]
pub struct ParseError {
    pub source_name: String,
    pub message: String,
    pub position: usize,
}

impl ParseError {
    pub fn new(source_name: impl Into<String>, position: usize, message: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            message: message.into(),
            position,
        }
    }
}

/// Top-level error type for barbot.
#[derive(Debug, thiserror::Error)]
pub enum BarbotError {
    #[error("insufficient history: have {have} traded candles, need {need}")]
    InsufficientHistory { have: usize, need: usize },

    #[error("spread too wide: {spread_pips:.1} pips (max {max_pips})")]
    SpreadTooWide { spread_pips: f64, max_pips: f64 },

    #[error("too close to margin call: margin call percent {margin_call_percent}")]
    MarginCallRisk { margin_call_percent: f64 },

    #[error("a {side} position is already open on {instrument}")]
    PositionAlreadyOpen { instrument: String, side: Side },

    #[error("funds limit exceeded: requested {requested} + allocated {allocated} > max {max}")]
    FundsLimitExceeded {
        requested: i64,
        allocated: i64,
        max: i64,
    },

    #[error("market data feed unavailable: {reason}")]
    FeedUnavailable { reason: String },

    #[error("gateway request failed: {reason}")]
    GatewayRequestFailed { reason: String },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("no data for {instrument}")]
    NoData { instrument: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BarbotError {
    /// Guard rejections: the signal is dropped and the next cycle reassesses.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BarbotError::SpreadTooWide { .. }
                | BarbotError::MarginCallRisk { .. }
                | BarbotError::PositionAlreadyOpen { .. }
                | BarbotError::FundsLimitExceeded { .. }
        )
    }
}

impl From<&BarbotError> for std::process::ExitCode {
    fn from(err: &BarbotError) -> Self {
        let code: u8 = match err {
            BarbotError::Io(_) => 1,
            BarbotError::ConfigParse { .. }
            | BarbotError::ConfigMissing { .. }
            | BarbotError::ConfigInvalid { .. } => 2,
            BarbotError::FeedUnavailable { .. } | BarbotError::GatewayRequestFailed { .. } => 3,
            BarbotError::Parse(_) => 4,
            BarbotError::NoData { .. } | BarbotError::InsufficientHistory { .. } => 5,
            BarbotError::SpreadTooWide { .. }
            | BarbotError::MarginCallRisk { .. }
            | BarbotError::PositionAlreadyOpen { .. }
            | BarbotError::FundsLimitExceeded { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
