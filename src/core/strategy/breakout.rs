// Range breakout: trade closes beyond the recent consolidation range

use chrono::{DateTime, Utc};

use crate::config::StrategyToggle;
use crate::core::snapshot::MarketSnapshot;
use crate::core::strategy::{bracket_from_pnl, position_size, Evaluator};
use crate::core::types::{AccountState, Direction, Signal};
use crate::error::TradingResult;

const RANGE_LOOKBACK: usize = 20;
/// Close must clear the range edge by this much (percent of the edge).
const BREAK_MARGIN_PCT: f64 = 0.05;
const SL_PNL_PCT: f64 = 0.75;
const TP_PNL_PCT: f64 = 1.5;

pub struct BreakoutStrategy {
    toggle: StrategyToggle,
}

impl BreakoutStrategy {
    pub fn new(toggle: StrategyToggle) -> Self {
        Self { toggle }
    }
}

impl Evaluator for BreakoutStrategy {
    fn id(&self) -> &'static str {
        "breakout"
    }

    fn evaluate(
        &mut self,
        snapshot: &MarketSnapshot,
        account: &AccountState,
        now: DateTime<Utc>,
    ) -> TradingResult<Option<Signal>> {
        let Some((range_high, range_low)) = snapshot.prior_range(RANGE_LOOKBACK) else {
            return Ok(None);
        };
        let close = snapshot.last_bar().close;

        let direction = if close > range_high * (1.0 + BREAK_MARGIN_PCT / 100.0) {
            Direction::Long
        } else if close < range_low * (1.0 - BREAK_MARGIN_PCT / 100.0) {
            Direction::Short
        } else {
            return Ok(None);
        };

        let entry = snapshot.price;
        let (stop, target) = bracket_from_pnl(
            entry,
            direction,
            self.toggle.leverage,
            SL_PNL_PCT,
            TP_PNL_PCT,
        );
        let size = position_size(&self.toggle, account, entry);

        // Conviction scales with how decisively the edge broke
        let edge = match direction {
            Direction::Long => range_high,
            Direction::Short => range_low,
        };
        let break_pct = ((close - edge) / edge * 100.0).abs();
        let confidence = (break_pct / (4.0 * BREAK_MARGIN_PCT)).min(1.0);

        Signal::new(
            self.id(),
            &snapshot.symbol,
            direction,
            entry,
            stop,
            target,
            size,
            self.toggle.leverage,
            confidence,
            now,
        )
        .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::indicators::IndicatorParams;
    use crate::core::snapshot::BarWindow;
    use crate::core::types::Bar;

    fn toggle() -> StrategyToggle {
        StrategyToggle {
            enabled: true,
            priority: 3,
            cooldown_secs: 30,
            position_size_pct: 10.0,
            leverage: 5.0,
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

    /// Flat range around 100, with the final close set by the caller.
    fn snapshot_with_last_close(last_close: f64) -> MarketSnapshot {
        let params = IndicatorParams::default();
        let n = params.min_bars();
        let mut w = BarWindow::new(n + 10, params);
        for i in 0..n - 1 {
            w.push(Bar {
                ts: i as i64 * 60_000,
                open: 100.0,
                high: 100.5,
                low: 99.5,
                close: 100.0,
                volume: 100.0,
            });
        }
        w.push(Bar {
            ts: (n as i64 - 1) * 60_000,
            open: 100.0,
            high: last_close.max(100.5) + 0.1,
            low: last_close.min(99.5) - 0.1,
            close: last_close,
            volume: 100.0,
        });
        w.snapshot("SOL-USDT-SWAP", last_close).unwrap()
    }

    #[test]
    fn test_long_on_upside_break() {
        // Range high is 100.5; close well beyond the margin
        let snap = snapshot_with_last_close(101.5);
        let mut s = BreakoutStrategy::new(toggle());
        let sig = s.evaluate(&snap, &account(), Utc::now()).unwrap().unwrap();
        assert_eq!(sig.direction, Direction::Long);
    }

    #[test]
    fn test_short_on_downside_break() {
        let snap = snapshot_with_last_close(98.5);
        let mut s = BreakoutStrategy::new(toggle());
        let sig = s.evaluate(&snap, &account(), Utc::now()).unwrap().unwrap();
        assert_eq!(sig.direction, Direction::Short);
    }

    #[test]
    fn test_quiet_inside_range() {
        let snap = snapshot_with_last_close(100.2);
        let mut s = BreakoutStrategy::new(toggle());
        assert!(s.evaluate(&snap, &account(), Utc::now()).unwrap().is_none());
    }
}
