// Mean reversion: fade stretched deviations from the rolling mean

use chrono::{DateTime, Utc};

use crate::config::StrategyToggle;
use crate::core::snapshot::MarketSnapshot;
use crate::core::strategy::{bracket_from_pnl, position_size, Evaluator};
use crate::core::types::{AccountState, Direction, Signal};
use crate::error::TradingResult;

const MIN_DEVIATION_PCT: f64 = 0.3;
const SL_PNL_PCT: f64 = 0.15;
const TP_PNL_PCT: f64 = 0.3;

pub struct MeanReversionStrategy {
    toggle: StrategyToggle,
}

impl MeanReversionStrategy {
    pub fn new(toggle: StrategyToggle) -> Self {
        Self { toggle }
    }
}

impl Evaluator for MeanReversionStrategy {
    fn id(&self) -> &'static str {
        "mean_reversion"
    }

    fn evaluate(
        &mut self,
        snapshot: &MarketSnapshot,
        account: &AccountState,
        now: DateTime<Utc>,
    ) -> TradingResult<Option<Signal>> {
        let sma = snapshot.indicators.sma;
        if sma <= 0.0 {
            return Ok(None);
        }
        let deviation_pct = (snapshot.price - sma) / sma * 100.0;
        if deviation_pct.abs() < MIN_DEVIATION_PCT {
            return Ok(None);
        }

        // Stretched above the mean: fade it short; below: fade it long
        let direction = if deviation_pct > 0.0 {
            Direction::Short
        } else {
            Direction::Long
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
        let confidence = (deviation_pct.abs() / (2.0 * MIN_DEVIATION_PCT)).min(1.0);

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
