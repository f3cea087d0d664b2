// Momentum scalping: short bursts aligned with the local trend

use chrono::{DateTime, Utc};

use crate::config::StrategyToggle;
use crate::core::snapshot::MarketSnapshot;
use crate::core::strategy::{bracket_from_pnl, position_size, Evaluator};
use crate::core::types::{AccountState, Direction, Signal};
use crate::error::TradingResult;

const TREND_LOOKBACK: usize = 50;
const MOMENTUM_LOOKBACK: usize = 10;
const CONFIRM_LOOKBACK: usize = 5;
const MIN_TREND_PCT: f64 = 0.5;
const MIN_MOMENTUM_PCT: f64 = 0.3;
const VOLUME_FACTOR: f64 = 1.5;
const SL_PNL_PCT: f64 = 1.0;
const TP_PNL_PCT: f64 = 2.0;

pub struct ScalpingStrategy {
    toggle: StrategyToggle,
}

impl ScalpingStrategy {
    pub fn new(toggle: StrategyToggle) -> Self {
        Self { toggle }
    }
}

impl Evaluator for ScalpingStrategy {
    fn id(&self) -> &'static str {
        "scalping"
    }

    fn evaluate(
        &mut self,
        snapshot: &MarketSnapshot,
        account: &AccountState,
        now: DateTime<Utc>,
    ) -> TradingResult<Option<Signal>> {
        let trend = snapshot.momentum_pct(TREND_LOOKBACK);
        let momentum = snapshot.momentum_pct(MOMENTUM_LOOKBACK);
        let confirm = snapshot.momentum_pct(CONFIRM_LOOKBACK);

        if trend.abs() < MIN_TREND_PCT || momentum.abs() < MIN_MOMENTUM_PCT {
            return Ok(None);
        }
        // Burst must point the same way as the trend, and the last few
        // bars must not be fading
        if trend.signum() != momentum.signum() || confirm.signum() != momentum.signum() {
            return Ok(None);
        }
        if snapshot.last_bar().volume < VOLUME_FACTOR * snapshot.indicators.avg_volume {
            return Ok(None);
        }

        let direction = if momentum > 0.0 {
            Direction::Long
        } else {
            Direction::Short
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
        let confidence = (momentum.abs() / (2.0 * MIN_MOMENTUM_PCT)).min(1.0);

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
