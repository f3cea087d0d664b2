// Shared test helpers: scriptable mock exchange and fixture builders

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use perp_trading_bot::config::Config;
use perp_trading_bot::core::types::{AccountState, Bar, Direction, Signal};
use perp_trading_bot::error::{TradingError, TradingResult};
use perp_trading_bot::exchange::{
    AccountBalance, BracketRequest, ExchangeClient, ExchangePosition, OrderHandle, OrderStatus,
};

pub const SYMBOL: &str = "SOL-USDT-SWAP";

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SetLeverage(String, f64),
    PlaceBracket(String),
    PlaceEntry(String),
    PlaceProtection(String),
    Amend {
        symbol: String,
        stop: Option<f64>,
        target: Option<f64>,
    },
    Cancel(String),
    Close(String),
}

/// In-memory exchange double. Every mutation is recorded in `calls`;
/// failure behavior is scripted through the counters and flags.
pub struct MockExchange {
    pub calls: Mutex<Vec<Call>>,
    pub bracket_supported: bool,
    /// Remaining transient failures for order placement.
    pub place_transient_failures: AtomicUsize,
    /// Remaining transient failures for amendments.
    pub amend_transient_failures: AtomicUsize,
    /// Reject the next protective-leg placement (degraded path).
    pub fail_protection: AtomicBool,
    /// Reject all order placement outright.
    pub reject_orders: AtomicBool,
    pub statuses: Mutex<HashMap<String, OrderStatus>>,
    pub positions: Mutex<Vec<ExchangePosition>>,
    pub balance: Mutex<AccountBalance>,
    pub candles: Mutex<Vec<Bar>>,
    pub last_price: Mutex<f64>,
    next_id: AtomicUsize,
}

impl Default for MockExchange {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            bracket_supported: true,
            place_transient_failures: AtomicUsize::new(0),
            amend_transient_failures: AtomicUsize::new(0),
            fail_protection: AtomicBool::new(false),
            reject_orders: AtomicBool::new(false),
            statuses: Mutex::new(HashMap::new()),
            positions: Mutex::new(Vec::new()),
            balance: Mutex::new(AccountBalance {
                equity: 1000.0,
                margin_used: 0.0,
            }),
            candles: Mutex::new(flat_bars(100, 100.0)),
            last_price: Mutex::new(100.0),
            next_id: AtomicUsize::new(1),
        }
    }
}

impl MockExchange {
    pub fn without_brackets() -> Self {
        Self {
            bracket_supported: false,
            ..Self::default()
        }
    }

    pub fn recorded(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_amends(&self) -> usize {
        self.recorded()
            .iter()
            .filter(|c| matches!(c, Call::Amend { .. }))
            .count()
    }

    pub fn set_status(&self, order_id: &str, status: OrderStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(order_id.to_string(), status);
    }

    pub fn set_equity(&self, equity: f64) {
        self.balance.lock().unwrap().equity = equity;
    }

    pub fn add_position(&self, symbol: &str, direction: Direction, size: f64, entry: f64) {
        self.positions.lock().unwrap().push(ExchangePosition {
            symbol: symbol.to_string(),
            direction,
            size,
            entry_price: entry,
            leverage: 5.0,
            mark_price: entry,
            unrealized_pnl: 0.0,
        });
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn place(&self, req: &BracketRequest) -> TradingResult<OrderHandle> {
        if self.place_transient_failures.load(Ordering::SeqCst) > 0 {
            self.place_transient_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(TradingError::ExchangeTransient("mock timeout".to_string()));
        }
        if self.reject_orders.load(Ordering::SeqCst) {
            return Err(TradingError::ExchangeRejected("mock reject".to_string()));
        }
        let id = format!("ord-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.statuses
            .lock()
            .unwrap()
            .insert(id.clone(), OrderStatus::Live);
        Ok(OrderHandle {
            order_id: id,
            client_order_id: req.client_order_id.clone(),
            submitted_at: Utc::now(),
        })
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    fn supports_bracket(&self) -> bool {
        self.bracket_supported
    }

    async fn set_leverage(&self, symbol: &str, leverage: f64) -> TradingResult<()> {
        self.record(Call::SetLeverage(symbol.to_string(), leverage));
        Ok(())
    }

    async fn place_bracket(&self, req: &BracketRequest) -> TradingResult<OrderHandle> {
        self.record(Call::PlaceBracket(req.symbol.clone()));
        self.place(req)
    }

    async fn place_entry(&self, req: &BracketRequest) -> TradingResult<OrderHandle> {
        self.record(Call::PlaceEntry(req.symbol.clone()));
        self.place(req)
    }

    async fn place_protection(
        &self,
        symbol: &str,
        _direction: Direction,
        _size: f64,
        _stop_price: f64,
        _target_price: f64,
    ) -> TradingResult<String> {
        self.record(Call::PlaceProtection(symbol.to_string()));
        if self.fail_protection.load(Ordering::SeqCst) {
            return Err(TradingError::ExchangeRejected(
                "mock protection reject".to_string(),
            ));
        }
        Ok(format!("algo-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn amend_protection(
        &self,
        symbol: &str,
        new_stop: Option<f64>,
        new_target: Option<f64>,
    ) -> TradingResult<()> {
        self.record(Call::Amend {
            symbol: symbol.to_string(),
            stop: new_stop,
            target: new_target,
        });
        if self.amend_transient_failures.load(Ordering::SeqCst) > 0 {
            self.amend_transient_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(TradingError::ExchangeTransient("mock timeout".to_string()));
        }
        Ok(())
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> TradingResult<()> {
        self.record(Call::Cancel(order_id.to_string()));
        self.statuses
            .lock()
            .unwrap()
            .insert(order_id.to_string(), OrderStatus::Cancelled);
        let _ = symbol;
        Ok(())
    }

    async fn order_status(&self, _symbol: &str, order_id: &str) -> TradingResult<OrderStatus> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(order_id)
            .cloned()
            .unwrap_or(OrderStatus::Live))
    }

    async fn account_balance(&self) -> TradingResult<AccountBalance> {
        Ok(*self.balance.lock().unwrap())
    }

    async fn positions(&self) -> TradingResult<Vec<ExchangePosition>> {
        Ok(self.positions.lock().unwrap().clone())
    }

    async fn close_position(&self, symbol: &str) -> TradingResult<()> {
        self.record(Call::Close(symbol.to_string()));
        self.positions
            .lock()
            .unwrap()
            .retain(|p| p.symbol != symbol);
        Ok(())
    }

    async fn ticker(&self, _symbol: &str) -> TradingResult<f64> {
        Ok(*self.last_price.lock().unwrap())
    }

    async fn candles(
        &self,
        _symbol: &str,
        _interval: &str,
        _limit: usize,
    ) -> TradingResult<Vec<Bar>> {
        Ok(self.candles.lock().unwrap().clone())
    }
}

pub fn flat_bars(n: usize, price: f64) -> Vec<Bar> {
    (0..n)
        .map(|i| Bar {
            ts: i as i64 * 60_000,
            open: price,
            high: price + 0.2,
            low: price - 0.2,
            close: price,
            volume: 100.0,
        })
        .collect()
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.trading.symbol = SYMBOL.to_string();
    config.notify.webhook_url = None;
    config
}

pub fn test_account(equity: f64) -> AccountState {
    AccountState {
        equity,
        margin_used: 0.0,
        daily_starting_equity: equity,
        peak_equity: equity,
    }
}

pub fn long_signal(size: f64, leverage: f64) -> Signal {
    Signal::new(
        "test",
        SYMBOL,
        Direction::Long,
        100.0,
        99.0,
        105.0,
        size,
        leverage,
        0.8,
        Utc::now(),
    )
    .unwrap()
}
