// Swing strategy: multi-indicator confluence scoring with ATR stops

use chrono::{DateTime, Utc};

use crate::config::StrategyToggle;
use crate::core::indicators::IndicatorSet;
use crate::core::snapshot::MarketSnapshot;
use crate::core::strategy::{position_size, Evaluator};
use crate::core::types::{AccountState, Direction, Signal};
use crate::error::TradingResult;

const MIN_SCORE: u32 = 5;
const MAX_SCORE: u32 = 8;
const MIN_ADX: f64 = 20.0;
const ATR_STOP_MULT: f64 = 1.5;
const ATR_TARGET_MULT: f64 = 2.5;

pub struct SwingStrategy {
    toggle: StrategyToggle,
}

impl SwingStrategy {
    pub fn new(toggle: StrategyToggle) -> Self {
        Self { toggle }
    }

    fn long_score(ind: &IndicatorSet, close: f64) -> u32 {
        let mut score = 0;
        if ind.rsi < 40.0 {
            score += 2;
        } else if ind.rsi < 50.0 {
            score += 1;
        }
        if ind.ema_fast > ind.ema_slow {
            score += 2;
        }
        if ind.adx > MIN_ADX {
            score += 1;
        }
        if ind.macd_histogram > 0.0 {
            score += 2;
        } else if ind.macd > ind.macd_signal {
            score += 1;
        }
        if close > ind.bb_middle {
            score += 1;
        }
        score
    }

    fn short_score(ind: &IndicatorSet, close: f64) -> u32 {
        let mut score = 0;
        if ind.rsi > 60.0 {
            score += 2;
        } else if ind.rsi > 50.0 {
            score += 1;
        }
        if ind.ema_fast < ind.ema_slow {
            score += 2;
        }
        if ind.adx > MIN_ADX {
            score += 1;
        }
        if ind.macd_histogram < 0.0 {
            score += 2;
        } else if ind.macd < ind.macd_signal {
            score += 1;
        }
        if close < ind.bb_middle {
            score += 1;
        }
        score
    }
}

impl Evaluator for SwingStrategy {
    fn id(&self) -> &'static str {
        "swing"
    }

    fn evaluate(
        &mut self,
        snapshot: &MarketSnapshot,
        account: &AccountState,
        now: DateTime<Utc>,
    ) -> TradingResult<Option<Signal>> {
        let ind = &snapshot.indicators;
        if ind.atr <= 0.0 {
            return Ok(None);
        }
        let close = snapshot.last_bar().close;

        let long = Self::long_score(ind, close);
        let short = Self::short_score(ind, close);

        let (direction, score) = if long >= MIN_SCORE && long > short {
            (Direction::Long, long)
        } else if short >= MIN_SCORE && short > long {
            (Direction::Short, short)
        } else {
            return Ok(None);
        };

        let entry = snapshot.price;
        let s = direction.sign();
        let stop = entry - s * ATR_STOP_MULT * ind.atr;
        let target = entry + s * ATR_TARGET_MULT * ind.atr;
        let size = position_size(&self.toggle, account, entry);
        let confidence = score as f64 / MAX_SCORE as f64;

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
