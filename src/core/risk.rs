// Pre-trade risk validation

use serde::Serialize;
use tracing::debug;

use crate::config::RiskConfig;
use crate::core::types::{AccountState, Signal};

/// Why a signal was refused. Ordering of the checks is fixed, so a
/// signal that violates several limits always reports the same reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    TooManyPositions,
    PositionTooLarge,
    LeverageExceeded,
    DailyLossLimit,
    DrawdownLimit,
    InsufficientMargin,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectReason::TooManyPositions => "too many open positions",
            RejectReason::PositionTooLarge => "position notional exceeds limit",
            RejectReason::LeverageExceeded => "leverage exceeds limit",
            RejectReason::DailyLossLimit => "daily loss limit reached",
            RejectReason::DrawdownLimit => "drawdown limit reached",
            RejectReason::InsufficientMargin => "insufficient free margin",
        };
        write!(f, "{}", s)
    }
}

/// Pure pre-trade gatekeeper. Holds the configured limits; every
/// validation decision is a function of the signal and account state
/// passed in.
#[derive(Debug, Clone, Copy)]
pub struct RiskEngine {
    limits: RiskConfig,
}

impl RiskEngine {
    pub fn new(limits: RiskConfig) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &RiskConfig {
        &self.limits
    }

    /// Validate a signal against every limit, in fixed order. The
    /// first violated limit is reported.
    pub fn validate(
        &self,
        signal: &Signal,
        account: &AccountState,
        open_positions: usize,
    ) -> Result<(), RejectReason> {
        if open_positions >= self.limits.max_concurrent_positions {
            return Err(RejectReason::TooManyPositions);
        }

        let max_notional = account.equity * self.limits.max_position_pct / 100.0;
        if signal.notional() > max_notional {
            return Err(RejectReason::PositionTooLarge);
        }

        if signal.leverage > self.limits.max_leverage {
            return Err(RejectReason::LeverageExceeded);
        }

        if account.daily_loss_fraction() >= self.limits.max_daily_loss_pct / 100.0 {
            return Err(RejectReason::DailyLossLimit);
        }

        if account.drawdown_fraction() >= self.limits.max_drawdown_pct / 100.0 {
            return Err(RejectReason::DrawdownLimit);
        }

        // Isolated margin consumed by the entry is notional / leverage
        let required_margin = signal.entry_price * signal.size;
        if required_margin > account.free_margin() {
            return Err(RejectReason::InsufficientMargin);
        }

        debug!(
            strategy = signal.strategy_id,
            notional = signal.notional(),
            "signal passed risk validation"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Direction;
    use chrono::Utc;

    fn limits() -> RiskConfig {
        RiskConfig {
            max_leverage: 10.0,
            max_position_pct: 20.0,
            max_concurrent_positions: 1,
            max_daily_loss_pct: 5.0,
            max_drawdown_pct: 15.0,
            warning_fraction: 0.8,
        }
    }

    fn account() -> AccountState {
        AccountState {
            equity: 1000.0,
            margin_used: 0.0,
            daily_starting_equity: 1000.0,
            peak_equity: 1000.0,
        }
    }

    fn signal(size: f64, leverage: f64) -> Signal {
        Signal::new(
            "test",
            "SOL-USDT-SWAP",
            Direction::Long,
            100.0,
            99.0,
            102.0,
            size,
            leverage,
            0.8,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_oversized_position_rejected() {
        let engine = RiskEngine::new(limits());
        // Equity 1000, 20% cap = 200 notional. 0.5 * 100 * 5x = 250.
        let sig = signal(0.5, 5.0);
        assert_eq!(
            engine.validate(&sig, &account(), 0),
            Err(RejectReason::PositionTooLarge)
        );
        // 0.3 * 100 * 5x = 150, inside the cap
        let sig = signal(0.3, 5.0);
        assert_eq!(engine.validate(&sig, &account(), 0), Ok(()));
    }

    #[test]
    fn test_open_position_blocks_entry() {
        let engine = RiskEngine::new(limits());
        let sig = signal(0.3, 5.0);
        assert_eq!(
            engine.validate(&sig, &account(), 1),
            Err(RejectReason::TooManyPositions)
        );
    }

    #[test]
    fn test_leverage_cap() {
        let engine = RiskEngine::new(limits());
        // 0.1 * 100 * 11x = 110 notional, inside the size cap, but
        // leverage itself is over the limit
        let sig = signal(0.1, 11.0);
        assert_eq!(
            engine.validate(&sig, &account(), 0),
            Err(RejectReason::LeverageExceeded)
        );
    }

    #[test]
    fn test_daily_loss_limit() {
        let engine = RiskEngine::new(limits());
        let mut acct = account();
        acct.equity = 949.0; // 5.1% down on the day
        acct.peak_equity = 1000.0;
        let sig = signal(0.3, 5.0);
        assert_eq!(
            engine.validate(&sig, &acct, 0),
            Err(RejectReason::DailyLossLimit)
        );
    }

    #[test]
    fn test_drawdown_limit() {
        let engine = RiskEngine::new(limits());
        let mut acct = account();
        acct.equity = 840.0;
        acct.daily_starting_equity = 850.0; // only ~1.2% down today
        acct.peak_equity = 1000.0; // but 16% off the peak
        let sig = signal(0.3, 5.0);
        assert_eq!(
            engine.validate(&sig, &acct, 0),
            Err(RejectReason::DrawdownLimit)
        );
    }

    #[test]
    fn test_insufficient_margin() {
        let engine = RiskEngine::new(limits());
        let mut acct = account();
        acct.margin_used = 990.0;
        // Margin for 0.3 @ 100 = 30, free margin is 10
        let sig = signal(0.3, 5.0);
        assert_eq!(
            engine.validate(&sig, &acct, 0),
            Err(RejectReason::InsufficientMargin)
        );
    }

    #[test]
    fn test_check_order_is_fixed() {
        let engine = RiskEngine::new(limits());
        // Violates both the size cap and the leverage cap; size is
        // checked first
        let sig = signal(1.0, 11.0);
        assert_eq!(
            engine.validate(&sig, &account(), 0),
            Err(RejectReason::PositionTooLarge)
        );
    }

    #[test]
    fn test_validation_is_pure() {
        let engine = RiskEngine::new(limits());
        let sig = signal(0.3, 5.0);
        let acct = account();
        for _ in 0..3 {
            assert_eq!(engine.validate(&sig, &acct, 0), Ok(()));
        }
    }
}
