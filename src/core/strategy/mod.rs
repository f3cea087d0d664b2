// Strategy evaluators and the signal-resolution manager

pub mod breakout;
pub mod manager;
pub mod mean_reversion;
pub mod scalping;
pub mod swing;
pub mod volume_spike;

use chrono::{DateTime, Utc};

use crate::config::StrategyToggle;
use crate::core::snapshot::MarketSnapshot;
use crate::core::types::{AccountState, Direction, Signal};
use crate::error::TradingResult;

pub use manager::{StrategyManager, StrategyOutcome};

/// A signal-generating strategy. Evaluators are pure with respect to
/// market data: the same snapshot always yields the same decision.
/// Mutable state is limited to internal bookkeeping such as the last
/// evaluated candle.
pub trait Evaluator: Send {
    fn id(&self) -> &'static str;

    /// Inspect the snapshot and either propose a trade or stay quiet.
    /// An error here is isolated by the manager and never aborts the
    /// cycle.
    fn evaluate(
        &mut self,
        snapshot: &MarketSnapshot,
        account: &AccountState,
        now: DateTime<Utc>,
    ) -> TradingResult<Option<Signal>>;
}

/// Position size in base units from the account equity and the
/// strategy's sizing settings.
pub(crate) fn position_size(toggle: &StrategyToggle, account: &AccountState, price: f64) -> f64 {
    if price <= 0.0 {
        return 0.0;
    }
    account.equity * (toggle.position_size_pct / 100.0) * toggle.leverage / price
}

/// Stop and target prices from leveraged-PnL percentages. A 2% PnL
/// target at 5x leverage is a 0.4% price move.
pub(crate) fn bracket_from_pnl(
    entry: f64,
    direction: Direction,
    leverage: f64,
    sl_pnl_pct: f64,
    tp_pnl_pct: f64,
) -> (f64, f64) {
    let s = direction.sign();
    let stop = entry * (1.0 - s * sl_pnl_pct / leverage / 100.0);
    let target = entry * (1.0 + s * tp_pnl_pct / leverage / 100.0);
    (stop, target)
}
