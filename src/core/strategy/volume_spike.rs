// Volume spike: join the move when participation suddenly jumps

use chrono::{DateTime, Utc};

use crate::config::StrategyToggle;
use crate::core::snapshot::MarketSnapshot;
use crate::core::strategy::{bracket_from_pnl, position_size, Evaluator};
use crate::core::types::{AccountState, Direction, Signal};
use crate::error::TradingResult;

const SPIKE_FACTOR: f64 = 2.0;
const MOMENTUM_LOOKBACK: usize = 5;
const SL_PNL_PCT: f64 = 1.0;
const TP_PNL_PCT: f64 = 2.0;

pub struct VolumeSpikeStrategy {
    toggle: StrategyToggle,
}

impl VolumeSpikeStrategy {
    pub fn new(toggle: StrategyToggle) -> Self {
        Self { toggle }
    }
}

impl Evaluator for VolumeSpikeStrategy {
    fn id(&self) -> &'static str {
        "volume_spike"
    }

    fn evaluate(
        &mut self,
        snapshot: &MarketSnapshot,
        account: &AccountState,
        now: DateTime<Utc>,
    ) -> TradingResult<Option<Signal>> {
        let avg = snapshot.indicators.avg_volume;
        if avg <= 0.0 {
            return Ok(None);
        }
        let last = snapshot.last_bar();
        if last.volume < SPIKE_FACTOR * avg {
            return Ok(None);
        }

        // Spike with no price displacement carries no direction
        let momentum = snapshot.momentum_pct(MOMENTUM_LOOKBACK);
        if momentum == 0.0 {
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
        let confidence = (last.volume / (2.0 * SPIKE_FACTOR * avg)).min(1.0);

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
