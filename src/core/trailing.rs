// Profit-protection state machine for open positions

use tracing::debug;

use crate::config::TrailingConfig;
use crate::core::types::{Position, TrailingStage};

/// A planned protective-order change. The caller applies it to the
/// exchange first and commits `stage` to the position only if that
/// call succeeds, so local state can never run ahead of the venue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailingUpdate {
    pub stage: TrailingStage,
    pub new_stop: Option<f64>,
    pub new_target: Option<f64>,
}

/// Plans stage transitions from leveraged PnL. Pure: no clock, no
/// exchange, no mutation.
#[derive(Debug, Clone, Copy)]
pub struct TrailingEngine {
    cfg: TrailingConfig,
}

impl TrailingEngine {
    pub fn new(cfg: TrailingConfig) -> Self {
        Self { cfg }
    }

    fn threshold(&self, stage: TrailingStage) -> f64 {
        match stage {
            TrailingStage::None => f64::NEG_INFINITY,
            TrailingStage::BreakevenLocked => self.cfg.t1_pnl_pct,
            TrailingStage::TpTightened => self.cfg.t2_pnl_pct,
            TrailingStage::AggressiveTrail => self.cfg.t3_pnl_pct,
        }
    }

    /// Plan at most one forward transition for this position at this
    /// price. At the terminal stage the take-profit keeps ratcheting
    /// in the profit direction as price advances.
    ///
    /// Proposed prices are clamped so a stop can only ever tighten and
    /// a target can only move the way the stage intends; a PnL
    /// retracement therefore never produces a plan that loosens
    /// protection.
    pub fn plan(&self, position: &Position, price: f64) -> Option<TrailingUpdate> {
        let pnl = position.unrealized_pnl_pct(price);
        let s = position.direction.sign();

        let Some(next) = position.trailing_stage.next() else {
            // Terminal stage: trail the target behind price
            return self.ratchet_target(position, price);
        };

        if pnl < self.threshold(next) {
            return None;
        }

        let update = match next {
            TrailingStage::BreakevenLocked => {
                let proposed = position.entry_price
                    * (1.0 + s * self.cfg.breakeven_buffer_pct / 100.0);
                // Never loosen an already-tighter stop
                let stop = if s * (proposed - position.stop_price) > 0.0 {
                    proposed
                } else {
                    position.stop_price
                };
                TrailingUpdate {
                    stage: next,
                    new_stop: Some(stop),
                    new_target: None,
                }
            }
            TrailingStage::TpTightened => {
                let proposed =
                    position.entry_price * (1.0 + s * self.cfg.tp_tighten_pct / 100.0);
                // Only ever pull the target closer
                let target = if s * (position.target_price - proposed) > 0.0 {
                    proposed
                } else {
                    position.target_price
                };
                TrailingUpdate {
                    stage: next,
                    new_stop: None,
                    new_target: Some(target),
                }
            }
            TrailingStage::AggressiveTrail => {
                let proposed = price * (1.0 + s * self.cfg.trail_offset_pct / 100.0);
                TrailingUpdate {
                    stage: next,
                    new_stop: None,
                    new_target: Some(proposed),
                }
            }
            TrailingStage::None => unreachable!("next() never returns the initial stage"),
        };

        debug!(
            symbol = %position.symbol,
            pnl_pct = pnl,
            from = %position.trailing_stage,
            to = %update.stage,
            "trailing transition planned"
        );
        Some(update)
    }

    /// At the terminal stage the target follows price, moving only in
    /// the profit direction.
    fn ratchet_target(&self, position: &Position, price: f64) -> Option<TrailingUpdate> {
        let s = position.direction.sign();
        let proposed = price * (1.0 + s * self.cfg.trail_offset_pct / 100.0);
        if s * (proposed - position.target_price) > 0.0 {
            Some(TrailingUpdate {
                stage: TrailingStage::AggressiveTrail,
                new_stop: None,
                new_target: Some(proposed),
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Direction;
    use chrono::Utc;

    fn cfg() -> TrailingConfig {
        TrailingConfig {
            t1_pnl_pct: 7.0,
            t2_pnl_pct: 10.0,
            t3_pnl_pct: 12.0,
            breakeven_buffer_pct: 0.5,
            tp_tighten_pct: 2.4,
            trail_offset_pct: 0.4,
        }
    }

    fn position(direction: Direction, stage: TrailingStage) -> Position {
        let s = direction.sign();
        Position {
            symbol: "SOL-USDT-SWAP".to_string(),
            direction,
            entry_price: 100.0,
            size: 1.0,
            leverage: 5.0,
            stop_price: 100.0 * (1.0 - s * 0.01),
            target_price: 100.0 * (1.0 + s * 0.05),
            trailing_stage: stage,
            strategy_id: "test",
            opened_at: Utc::now(),
            needs_review: false,
        }
    }

    /// Price that produces the given leveraged PnL for a 5x long.
    fn price_for_pnl(entry: f64, s: f64, pnl_pct: f64) -> f64 {
        entry * (1.0 + s * pnl_pct / 5.0 / 100.0)
    }

    #[test]
    fn test_no_plan_below_first_threshold() {
        let eng = TrailingEngine::new(cfg());
        let pos = position(Direction::Long, TrailingStage::None);
        // 6% PnL, below the 7% trigger
        assert!(eng.plan(&pos, price_for_pnl(100.0, 1.0, 6.0)).is_none());
    }

    #[test]
    fn test_breakeven_lock_long() {
        let eng = TrailingEngine::new(cfg());
        let pos = position(Direction::Long, TrailingStage::None);
        let up = eng.plan(&pos, price_for_pnl(100.0, 1.0, 7.5)).unwrap();
        assert_eq!(up.stage, TrailingStage::BreakevenLocked);
        assert!((up.new_stop.unwrap() - 100.5).abs() < 1e-9);
        assert!(up.new_target.is_none());
    }

    #[test]
    fn test_breakeven_lock_short() {
        let eng = TrailingEngine::new(cfg());
        let pos = position(Direction::Short, TrailingStage::None);
        let up = eng.plan(&pos, price_for_pnl(100.0, -1.0, 7.5)).unwrap();
        assert_eq!(up.stage, TrailingStage::BreakevenLocked);
        assert!((up.new_stop.unwrap() - 99.5).abs() < 1e-9);
    }

    #[test]
    fn test_tp_tighten_only_moves_closer() {
        let eng = TrailingEngine::new(cfg());
        let mut pos = position(Direction::Long, TrailingStage::BreakevenLocked);
        let up = eng.plan(&pos, price_for_pnl(100.0, 1.0, 10.5)).unwrap();
        assert_eq!(up.stage, TrailingStage::TpTightened);
        // 2.4% from entry is closer than the original 5% target
        assert!((up.new_target.unwrap() - 102.4).abs() < 1e-9);

        // If the target is already tighter than 2.4%, it stays put
        pos.target_price = 101.5;
        let up = eng.plan(&pos, price_for_pnl(100.0, 1.0, 10.5)).unwrap();
        assert!((up.new_target.unwrap() - 101.5).abs() < 1e-9);
    }

    #[test]
    fn test_one_transition_per_call() {
        let eng = TrailingEngine::new(cfg());
        let pos = position(Direction::Long, TrailingStage::None);
        // PnL jumps straight past every threshold; only one stage
        // advances per plan
        let price = price_for_pnl(100.0, 1.0, 15.0);
        let up = eng.plan(&pos, price).unwrap();
        assert_eq!(up.stage, TrailingStage::BreakevenLocked);
    }

    #[test]
    fn test_retracement_never_plans_regression() {
        let eng = TrailingEngine::new(cfg());
        let pos = position(Direction::Long, TrailingStage::TpTightened);
        // PnL fell back to 3%; no transition, no loosening
        assert!(eng.plan(&pos, price_for_pnl(100.0, 1.0, 3.0)).is_none());
    }

    #[test]
    fn test_aggressive_trail_ratchets_with_price() {
        let eng = TrailingEngine::new(cfg());
        let mut pos = position(Direction::Long, TrailingStage::TpTightened);
        pos.target_price = 102.4;

        let p3 = price_for_pnl(100.0, 1.0, 12.5);
        let up = eng.plan(&pos, p3).unwrap();
        assert_eq!(up.stage, TrailingStage::AggressiveTrail);
        let t3 = up.new_target.unwrap();
        assert!((t3 - p3 * 1.004).abs() < 1e-9);

        // Terminal stage: target follows price up, never down
        pos.trailing_stage = TrailingStage::AggressiveTrail;
        pos.target_price = t3;
        let higher = p3 * 1.01;
        let up = eng.plan(&pos, higher).unwrap();
        assert!(up.new_target.unwrap() > t3);

        let lower = p3 * 0.999;
        assert!(eng.plan(&pos, lower).is_none());
    }

    #[test]
    fn test_stop_monotonic_over_price_path() {
        let eng = TrailingEngine::new(cfg());
        let mut pos = position(Direction::Long, TrailingStage::None);
        // Oscillating path that crosses thresholds repeatedly
        let pnls = [2.0, 8.0, 4.0, 11.0, 9.0, 13.0, 6.0, 14.0, 12.5];
        let mut last_stop = pos.stop_price;
        let mut last_stage = pos.trailing_stage;
        for pnl in pnls {
            let price = price_for_pnl(100.0, 1.0, pnl);
            if let Some(up) = eng.plan(&pos, price) {
                // Commit, as the monitor loop would after a successful
                // exchange modify
                assert!(up.stage >= last_stage, "stage regressed");
                if let Some(stop) = up.new_stop {
                    assert!(stop >= last_stop, "stop loosened");
                    pos.stop_price = stop;
                    last_stop = stop;
                }
                if let Some(target) = up.new_target {
                    pos.target_price = target;
                }
                pos.trailing_stage = up.stage;
                last_stage = up.stage;
            }
        }
        assert_eq!(pos.trailing_stage, TrailingStage::AggressiveTrail);
    }
}
