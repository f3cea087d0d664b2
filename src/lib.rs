// Perp trading bot library
//
// A rule-based trading controller for a single USDT-margined
// perpetual-swap instrument: indicator pipeline, five strategy
// evaluators behind a resolution manager, a pre-trade risk engine,
// bracketed order management, staged trailing protection, and an
// account-level kill switch.

pub mod config;
pub mod core;
pub mod error;
pub mod exchange;
pub mod journal;
pub mod notify;

pub use config::{Config, ConfigError, ResolutionPolicy};
pub use core::{
    AccountState, Action, Bar, Direction, Position, RejectReason, RiskEngine, Signal,
    StrategyManager, TradingEngine, TrailingEngine, TrailingStage,
};
pub use error::{TradingError, TradingResult};
pub use exchange::{ExchangeClient, OkxClient};
pub use journal::Journal;
pub use notify::Notifier;
