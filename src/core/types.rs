// Common domain types shared across the trading core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{TradingError, TradingResult};

/// Trade direction on a perpetual swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1.0 for long, -1.0 for short. Lets PnL and price-offset math
    /// stay branch-free.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    /// Order side that opens a position in this direction.
    pub fn open_side(&self) -> &'static str {
        match self {
            Direction::Long => "buy",
            Direction::Short => "sell",
        }
    }

    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

/// One OHLCV candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Candle open time, unix millis.
    pub ts: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A fully-specified trade proposal emitted by a strategy.
///
/// Construction goes through [`Signal::new`] so that a signal with an
/// inverted protective bracket can never exist.
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub strategy_id: &'static str,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    /// Position size in base units (contracts/tokens).
    pub size: f64,
    pub leverage: f64,
    /// Strategy-reported conviction in [0, 1].
    pub confidence: f64,
    pub generated_at: DateTime<Utc>,
}

impl Signal {
    /// Builds a signal, rejecting incoherent brackets: for a long the
    /// stop must sit below entry and the target above, mirrored for a
    /// short.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        strategy_id: &'static str,
        symbol: &str,
        direction: Direction,
        entry_price: f64,
        stop_price: f64,
        target_price: f64,
        size: f64,
        leverage: f64,
        confidence: f64,
        generated_at: DateTime<Utc>,
    ) -> TradingResult<Self> {
        if entry_price <= 0.0 || size <= 0.0 || leverage <= 0.0 {
            return Err(TradingError::InvariantViolation(format!(
                "non-positive signal fields: entry={} size={} leverage={}",
                entry_price, size, leverage
            )));
        }
        let s = direction.sign();
        if s * (entry_price - stop_price) <= 0.0 || s * (target_price - entry_price) <= 0.0 {
            return Err(TradingError::InvariantViolation(format!(
                "inverted bracket for {} signal: entry={} stop={} target={}",
                direction, entry_price, stop_price, target_price
            )));
        }
        Ok(Self {
            strategy_id,
            symbol: symbol.to_string(),
            direction,
            entry_price,
            stop_price,
            target_price,
            size,
            leverage,
            confidence: confidence.clamp(0.0, 1.0),
            generated_at,
        })
    }

    /// Notional exposure the signal would open: entry * size * leverage.
    pub fn notional(&self) -> f64 {
        self.entry_price * self.size * self.leverage
    }
}

/// Profit-protection stage of an open position. Stages only ever move
/// forward; the ordering of the variants is load-bearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingStage {
    None,
    BreakevenLocked,
    TpTightened,
    AggressiveTrail,
}

impl TrailingStage {
    /// The next stage forward, or None at the terminal stage.
    pub fn next(&self) -> Option<TrailingStage> {
        match self {
            TrailingStage::None => Some(TrailingStage::BreakevenLocked),
            TrailingStage::BreakevenLocked => Some(TrailingStage::TpTightened),
            TrailingStage::TpTightened => Some(TrailingStage::AggressiveTrail),
            TrailingStage::AggressiveTrail => None,
        }
    }
}

impl std::fmt::Display for TrailingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TrailingStage::None => "none",
            TrailingStage::BreakevenLocked => "breakeven_locked",
            TrailingStage::TpTightened => "tp_tightened",
            TrailingStage::AggressiveTrail => "aggressive_trail",
        };
        write!(f, "{}", s)
    }
}

/// An open position tracked by the bot.
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub size: f64,
    pub leverage: f64,
    /// Current protective stop on the exchange.
    pub stop_price: f64,
    /// Current take-profit on the exchange.
    pub target_price: f64,
    pub trailing_stage: TrailingStage,
    pub strategy_id: &'static str,
    pub opened_at: DateTime<Utc>,
    /// Set when the position was found on the exchange without local
    /// state (e.g. after a restart); such positions are monitored but
    /// flagged for operator review.
    pub needs_review: bool,
}

impl Position {
    /// Leveraged unrealized PnL in percent: a +0.5% price move with 5x
    /// leverage reports +2.5%.
    pub fn unrealized_pnl_pct(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        self.direction.sign() * (price - self.entry_price) / self.entry_price
            * self.leverage
            * 100.0
    }

    /// Notional exposure of the position.
    pub fn notional(&self) -> f64 {
        self.entry_price * self.size * self.leverage
    }
}

/// Account-level view maintained by the engine from exchange data.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AccountState {
    /// Marked equity including unrealized PnL.
    pub equity: f64,
    pub margin_used: f64,
    /// Equity at the most recent UTC midnight; baseline for the daily
    /// loss limit.
    pub daily_starting_equity: f64,
    /// Highest equity seen since startup; baseline for the drawdown
    /// limit.
    pub peak_equity: f64,
}

impl AccountState {
    pub fn free_margin(&self) -> f64 {
        (self.equity - self.margin_used).max(0.0)
    }

    /// Fraction of daily starting equity lost today; 0.0 while flat or
    /// in profit.
    pub fn daily_loss_fraction(&self) -> f64 {
        if self.daily_starting_equity <= 0.0 {
            return 0.0;
        }
        ((self.daily_starting_equity - self.equity) / self.daily_starting_equity).max(0.0)
    }

    /// Fraction drawn down from the equity peak.
    pub fn drawdown_fraction(&self) -> f64 {
        if self.peak_equity <= 0.0 {
            return 0.0;
        }
        ((self.peak_equity - self.equity) / self.peak_equity).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(direction: Direction, entry: f64, stop: f64, target: f64) -> TradingResult<Signal> {
        Signal::new(
            "test",
            "SOL-USDT-SWAP",
            direction,
            entry,
            stop,
            target,
            1.0,
            5.0,
            0.8,
            Utc::now(),
        )
    }

    #[test]
    fn test_signal_rejects_inverted_bracket() {
        // Long with stop above entry
        assert!(signal(Direction::Long, 100.0, 101.0, 105.0).is_err());
        // Long with target below entry
        assert!(signal(Direction::Long, 100.0, 99.0, 99.5).is_err());
        // Short with stop below entry
        assert!(signal(Direction::Short, 100.0, 99.0, 95.0).is_err());
        // Coherent brackets pass
        assert!(signal(Direction::Long, 100.0, 99.0, 102.0).is_ok());
        assert!(signal(Direction::Short, 100.0, 101.0, 98.0).is_ok());
    }

    #[test]
    fn test_leveraged_pnl() {
        let pos = Position {
            symbol: "SOL-USDT-SWAP".to_string(),
            direction: Direction::Long,
            entry_price: 100.0,
            size: 2.0,
            leverage: 5.0,
            stop_price: 99.0,
            target_price: 103.0,
            trailing_stage: TrailingStage::None,
            strategy_id: "test",
            opened_at: Utc::now(),
            needs_review: false,
        };
        // +0.5% price move at 5x = +2.5% PnL
        assert!((pos.unrealized_pnl_pct(100.5) - 2.5).abs() < 1e-9);
        assert!((pos.unrealized_pnl_pct(99.0) + 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_stage_ordering() {
        assert!(TrailingStage::None < TrailingStage::BreakevenLocked);
        assert!(TrailingStage::BreakevenLocked < TrailingStage::TpTightened);
        assert!(TrailingStage::TpTightened < TrailingStage::AggressiveTrail);
        assert_eq!(TrailingStage::AggressiveTrail.next(), None);
    }

    #[test]
    fn test_account_fractions() {
        let acct = AccountState {
            equity: 900.0,
            margin_used: 100.0,
            daily_starting_equity: 1000.0,
            peak_equity: 1200.0,
        };
        assert!((acct.daily_loss_fraction() - 0.1).abs() < 1e-9);
        assert!((acct.drawdown_fraction() - 0.25).abs() < 1e-9);
        assert!((acct.free_margin() - 800.0).abs() < 1e-9);
    }
}
