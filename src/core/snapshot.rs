// Rolling candle window and the per-cycle market snapshot

use std::collections::VecDeque;

use crate::core::indicators::{IndicatorParams, IndicatorSet};
use crate::core::types::Bar;
use crate::error::TradingResult;

/// Everything a strategy evaluator may look at for one cycle. Built
/// once per signal cycle and shared read-only, so every evaluator sees
/// identical data regardless of evaluation order.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub symbol: String,
    /// Latest traded price, which may be fresher than the last closed
    /// candle.
    pub price: f64,
    /// Closed candles, oldest first.
    pub bars: Vec<Bar>,
    pub indicators: IndicatorSet,
}

impl MarketSnapshot {
    pub fn last_bar(&self) -> &Bar {
        // BarWindow::snapshot never builds an empty snapshot
        &self.bars[self.bars.len() - 1]
    }

    /// Percent change of close over the last `n` bars.
    pub fn momentum_pct(&self, n: usize) -> f64 {
        if self.bars.len() <= n {
            return 0.0;
        }
        let old = self.bars[self.bars.len() - 1 - n].close;
        if old <= 0.0 {
            return 0.0;
        }
        (self.last_bar().close - old) / old * 100.0
    }

    /// High/low of the `n` bars preceding the latest one.
    pub fn prior_range(&self, n: usize) -> Option<(f64, f64)> {
        if self.bars.len() < n + 1 {
            return None;
        }
        let slice = &self.bars[self.bars.len() - 1 - n..self.bars.len() - 1];
        let high = slice.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let low = slice.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        Some((high, low))
    }
}

/// Bounded rolling window of closed candles keyed by open time.
#[derive(Debug)]
pub struct BarWindow {
    bars: VecDeque<Bar>,
    capacity: usize,
    params: IndicatorParams,
}

impl BarWindow {
    pub fn new(capacity: usize, params: IndicatorParams) -> Self {
        Self {
            bars: VecDeque::with_capacity(capacity),
            capacity,
            params,
        }
    }

    /// Insert or update a candle. A bar with the timestamp of the
    /// newest entry replaces it (exchanges re-send the current candle
    /// as it builds); older timestamps are ignored.
    pub fn push(&mut self, bar: Bar) {
        match self.bars.back_mut() {
            Some(last) if bar.ts == last.ts => *last = bar,
            Some(last) if bar.ts < last.ts => {}
            _ => {
                if self.bars.len() == self.capacity {
                    self.bars.pop_front();
                }
                self.bars.push_back(bar);
            }
        }
    }

    /// Replace the window contents with a freshly fetched history.
    pub fn replace(&mut self, mut bars: Vec<Bar>) {
        bars.sort_by_key(|b| b.ts);
        self.bars.clear();
        for bar in bars.into_iter().rev().take(self.capacity).rev() {
            self.bars.push_back(bar);
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Enough bars for every indicator to be warm.
    pub fn is_warm(&self) -> bool {
        self.bars.len() >= self.params.min_bars()
    }

    /// Build the immutable per-cycle snapshot. Fails while the window
    /// is still warming up.
    pub fn snapshot(&self, symbol: &str, price: f64) -> TradingResult<MarketSnapshot> {
        let bars: Vec<Bar> = self.bars.iter().copied().collect();
        let indicators = IndicatorSet::compute(&bars, &self.params)?;
        Ok(MarketSnapshot {
            symbol: symbol.to_string(),
            price,
            bars,
            indicators,
        })
    }
}
