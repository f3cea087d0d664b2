// Exchange abstraction: the trading core talks to this trait only

pub mod okx;
pub mod okx_ws;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::types::{Bar, Direction};
use crate::error::TradingResult;

pub use okx::OkxClient;
pub use okx_ws::OkxPublicWs;

/// Entry order plus its protective bracket, submitted together.
#[derive(Debug, Clone)]
pub struct BracketRequest {
    pub symbol: String,
    pub direction: Direction,
    /// Size in contracts/base units.
    pub size: f64,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub leverage: f64,
    pub client_order_id: String,
}

/// Identifier pair for an order we placed.
#[derive(Debug, Clone)]
pub struct OrderHandle {
    pub order_id: String,
    pub client_order_id: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderStatus {
    Live,
    Filled { fill_price: f64 },
    Cancelled,
    Rejected(String),
}

/// Account numbers the venue reports; daily/peak baselines are
/// maintained locally by the engine.
#[derive(Debug, Clone, Copy)]
pub struct AccountBalance {
    pub equity: f64,
    pub margin_used: f64,
}

/// A position as the venue reports it.
#[derive(Debug, Clone)]
pub struct ExchangePosition {
    pub symbol: String,
    pub direction: Direction,
    pub size: f64,
    pub entry_price: f64,
    pub leverage: f64,
    pub mark_price: f64,
    pub unrealized_pnl: f64,
}

/// Venue operations used by the trading core. Implementations must be
/// safe to share across the signal and monitor loops.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Whether the venue accepts an entry with attached stop and
    /// take-profit as one atomic request.
    fn supports_bracket(&self) -> bool {
        true
    }

    async fn set_leverage(&self, symbol: &str, leverage: f64) -> TradingResult<()>;

    /// Submit entry + stop + target as a single atomic request.
    async fn place_bracket(&self, req: &BracketRequest) -> TradingResult<OrderHandle>;

    /// Degraded path: entry order alone, no protection attached.
    async fn place_entry(&self, req: &BracketRequest) -> TradingResult<OrderHandle>;

    /// Degraded path: reduce-only stop + take-profit for an already
    /// submitted entry. Returns the protective order id.
    async fn place_protection(
        &self,
        symbol: &str,
        direction: Direction,
        size: f64,
        stop_price: f64,
        target_price: f64,
    ) -> TradingResult<String>;

    /// Move the protective stop and/or target for a symbol.
    async fn amend_protection(
        &self,
        symbol: &str,
        new_stop: Option<f64>,
        new_target: Option<f64>,
    ) -> TradingResult<()>;

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> TradingResult<()>;

    async fn order_status(&self, symbol: &str, order_id: &str) -> TradingResult<OrderStatus>;

    async fn account_balance(&self) -> TradingResult<AccountBalance>;

    async fn positions(&self) -> TradingResult<Vec<ExchangePosition>>;

    /// Market-close the whole position for a symbol.
    async fn close_position(&self, symbol: &str) -> TradingResult<()>;

    /// Latest traded price.
    async fn ticker(&self, symbol: &str) -> TradingResult<f64>;

    /// Closed candles, oldest first.
    async fn candles(&self, symbol: &str, interval: &str, limit: usize)
        -> TradingResult<Vec<Bar>>;
}
