// Core trading logic modules

pub mod engine;
pub mod indicators;
pub mod kill_switch;
pub mod orders;
pub mod risk;
pub mod snapshot;
pub mod strategy;
pub mod trailing;
pub mod types;

// Re-export commonly used types
pub use engine::TradingEngine;
pub use kill_switch::{Action, KillSwitch};
pub use orders::{ModifyError, OrderManager, PendingResolution, SubmitError};
pub use risk::{RejectReason, RiskEngine};
pub use snapshot::{BarWindow, MarketSnapshot};
pub use strategy::{Evaluator, StrategyManager};
pub use trailing::{TrailingEngine, TrailingUpdate};
pub use types::{AccountState, Bar, Direction, Position, Signal, TrailingStage};
