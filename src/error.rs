// Unified error handling for the trading bot

use thiserror::Error;

/// Main error type shared across the library.
///
/// Order submission and modification carry their own error enums in
/// `core::orders` because callers react to each failure mode
/// differently; everything else funnels through here.
#[derive(Debug, Error)]
pub enum TradingError {
    #[error("market data error: {0}")]
    MarketData(String),

    #[error("indicator error: {0}")]
    Indicator(String),

    #[error("exchange transient error: {0}")]
    ExchangeTransient(String),

    #[error("exchange rejected request: {0}")]
    ExchangeRejected(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("journal error: {0}")]
    Journal(String),

    #[error("trading halted by kill switch")]
    Halted,
}

impl TradingError {
    /// Transient errors are the only class that may be retried (once).
    pub fn is_retryable(&self) -> bool {
        matches!(self, TradingError::ExchangeTransient(_))
    }

    /// Coarse category used in log fields.
    pub fn category(&self) -> &'static str {
        match self {
            TradingError::MarketData(_) | TradingError::Indicator(_) => "market_data",
            TradingError::ExchangeTransient(_) | TradingError::ExchangeRejected(_) => "exchange",
            TradingError::InvariantViolation(_) => "invariant",
            TradingError::Config(_) => "config",
            TradingError::Journal(_) => "journal",
            TradingError::Halted => "kill_switch",
        }
    }
}

impl From<reqwest::Error> for TradingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            TradingError::ExchangeTransient(err.to_string())
        } else {
            TradingError::ExchangeRejected(err.to_string())
        }
    }
}

impl From<serde_json::Error> for TradingError {
    fn from(err: serde_json::Error) -> Self {
        TradingError::MarketData(format!("JSON parse error: {}", err))
    }
}

impl From<rusqlite::Error> for TradingError {
    fn from(err: rusqlite::Error) -> Self {
        TradingError::Journal(err.to_string())
    }
}

/// Result type alias using TradingError
pub type TradingResult<T> = Result<T, TradingError>;
