// Indicator calculation over a closed-candle window

use ta::indicators::{
    AverageTrueRange, BollingerBands, ExponentialMovingAverage,
    MovingAverageConvergenceDivergence, RelativeStrengthIndex, SimpleMovingAverage,
};
use ta::{DataItem, Next};

use crate::core::types::Bar;
use crate::error::{TradingError, TradingResult};

/// Indicator periods. Fixed across strategies so one pass over the
/// window serves every evaluator.
#[derive(Debug, Clone, Copy)]
pub struct IndicatorParams {
    pub rsi_period: usize,
    pub ema_fast_period: usize,
    pub ema_slow_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub adx_period: usize,
    pub atr_period: usize,
    pub bb_period: usize,
    pub bb_multiplier: f64,
    pub volume_lookback: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            ema_fast_period: 21,
            ema_slow_period: 50,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            adx_period: 14,
            atr_period: 14,
            bb_period: 20,
            bb_multiplier: 2.0,
            volume_lookback: 20,
        }
    }
}

impl IndicatorParams {
    /// Bars needed before every indicator in the set has warmed up.
    pub fn min_bars(&self) -> usize {
        let slowest = self
            .ema_slow_period
            .max(self.macd_slow + self.macd_signal)
            .max(2 * self.adx_period + 1)
            .max(self.bb_period)
            .max(self.volume_lookback + 1);
        slowest + 10
    }
}

/// Snapshot of every indicator value at the latest closed candle.
#[derive(Debug, Clone, Copy)]
pub struct IndicatorSet {
    pub rsi: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    pub adx: f64,
    pub atr: f64,
    pub bb_upper: f64,
    pub bb_middle: f64,
    pub bb_lower: f64,
    /// Simple moving average of close over the Bollinger period.
    pub sma: f64,
    /// Mean volume over the lookback window, excluding the latest bar.
    pub avg_volume: f64,
}

impl IndicatorSet {
    /// Compute the full set from a window of closed candles, oldest
    /// first. Errors if the window is too short or a candle is
    /// malformed (e.g. low above high).
    pub fn compute(bars: &[Bar], params: &IndicatorParams) -> TradingResult<IndicatorSet> {
        if bars.len() < params.min_bars() {
            return Err(TradingError::Indicator(format!(
                "insufficient bars: {} < {}",
                bars.len(),
                params.min_bars()
            )));
        }

        let mut rsi = RelativeStrengthIndex::new(params.rsi_period)
            .map_err(|e| TradingError::Indicator(e.to_string()))?;
        let mut ema_fast = ExponentialMovingAverage::new(params.ema_fast_period)
            .map_err(|e| TradingError::Indicator(e.to_string()))?;
        let mut ema_slow = ExponentialMovingAverage::new(params.ema_slow_period)
            .map_err(|e| TradingError::Indicator(e.to_string()))?;
        let mut macd = MovingAverageConvergenceDivergence::new(
            params.macd_fast,
            params.macd_slow,
            params.macd_signal,
        )
        .map_err(|e| TradingError::Indicator(e.to_string()))?;
        let mut atr = AverageTrueRange::new(params.atr_period)
            .map_err(|e| TradingError::Indicator(e.to_string()))?;
        let mut bb = BollingerBands::new(params.bb_period, params.bb_multiplier)
            .map_err(|e| TradingError::Indicator(e.to_string()))?;
        let mut sma = SimpleMovingAverage::new(params.bb_period)
            .map_err(|e| TradingError::Indicator(e.to_string()))?;

        let mut rsi_v = 50.0;
        let mut ema_fast_v = 0.0;
        let mut ema_slow_v = 0.0;
        let mut macd_v = (0.0, 0.0);
        let mut atr_v = 0.0;
        let mut bb_v = (0.0, 0.0, 0.0);
        let mut sma_v = 0.0;

        for bar in bars {
            let item = DataItem::builder()
                .open(bar.open)
                .high(bar.high)
                .low(bar.low)
                .close(bar.close)
                .volume(bar.volume)
                .build()
                .map_err(|e| TradingError::Indicator(format!("bad candle at {}: {}", bar.ts, e)))?;

            rsi_v = rsi.next(bar.close);
            ema_fast_v = ema_fast.next(bar.close);
            ema_slow_v = ema_slow.next(bar.close);
            let m = macd.next(bar.close);
            macd_v = (m.macd, m.signal);
            atr_v = atr.next(&item);
            let b = bb.next(bar.close);
            bb_v = (b.upper, b.average, b.lower);
            sma_v = sma.next(bar.close);
        }

        let adx = wilder_adx(bars, params.adx_period);

        // Latest bar excluded so a spike compares against its own baseline
        let vol_slice = &bars[bars.len() - 1 - params.volume_lookback..bars.len() - 1];
        let avg_volume = vol_slice.iter().map(|b| b.volume).sum::<f64>() / vol_slice.len() as f64;

        Ok(IndicatorSet {
            rsi: rsi_v,
            ema_fast: ema_fast_v,
            ema_slow: ema_slow_v,
            macd: macd_v.0,
            macd_signal: macd_v.1,
            macd_histogram: macd_v.0 - macd_v.1,
            adx,
            atr: atr_v,
            bb_upper: bb_v.0,
            bb_middle: bb_v.1,
            bb_lower: bb_v.2,
            sma: sma_v,
            avg_volume,
        })
    }
}

/// Wilder's ADX. Not provided by the indicator crate, so computed
/// directly from the window.
fn wilder_adx(bars: &[Bar], period: usize) -> f64 {
    if bars.len() < 2 * period + 1 {
        return 0.0;
    }

    let mut plus_dm = Vec::with_capacity(bars.len() - 1);
    let mut minus_dm = Vec::with_capacity(bars.len() - 1);
    let mut tr = Vec::with_capacity(bars.len() - 1);

    for w in bars.windows(2) {
        let (prev, cur) = (&w[0], &w[1]);
        let up = cur.high - prev.high;
        let down = prev.low - cur.low;
        plus_dm.push(if up > down && up > 0.0 { up } else { 0.0 });
        minus_dm.push(if down > up && down > 0.0 { down } else { 0.0 });
        let range = (cur.high - cur.low)
            .max((cur.high - prev.close).abs())
            .max((cur.low - prev.close).abs());
        tr.push(range);
    }

    // Wilder smoothing: seed with the first `period` sum, then
    // s = s - s/period + x
    let smooth = |xs: &[f64]| -> Vec<f64> {
        let mut out = Vec::with_capacity(xs.len() - period + 1);
        let mut s: f64 = xs[..period].iter().sum();
        out.push(s);
        for &x in &xs[period..] {
            s = s - s / period as f64 + x;
            out.push(s);
        }
        out
    };

    let s_plus = smooth(&plus_dm);
    let s_minus = smooth(&minus_dm);
    let s_tr = smooth(&tr);

    let mut dx = Vec::with_capacity(s_tr.len());
    for i in 0..s_tr.len() {
        if s_tr[i] <= 0.0 {
            dx.push(0.0);
            continue;
        }
        let p_di = 100.0 * s_plus[i] / s_tr[i];
        let m_di = 100.0 * s_minus[i] / s_tr[i];
        let sum = p_di + m_di;
        dx.push(if sum > 0.0 {
            100.0 * (p_di - m_di).abs() / sum
        } else {
            0.0
        });
    }

    if dx.len() < period {
        return 0.0;
    }
    let mut adx: f64 = dx[..period].iter().sum::<f64>() / period as f64;
    for &x in &dx[period..] {
        adx = (adx * (period as f64 - 1.0) + x) / period as f64;
    }
    adx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_bars(n: usize, price: f64) -> Vec<Bar> {
        (0..n)
            .map(|i| Bar {
                ts: i as i64 * 60_000,
                open: price,
                high: price + 0.1,
                low: price - 0.1,
                close: price,
                volume: 100.0,
            })
            .collect()
    }

    fn trending_bars(n: usize, start: f64, step: f64) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let close = start + step * i as f64;
                Bar {
                    ts: i as i64 * 60_000,
                    open: close - step,
                    high: close + step.abs(),
                    low: close - step.abs() * 1.5,
                    close,
                    volume: 100.0,
                }
            })
            .collect()
    }

    #[test]
    fn test_insufficient_bars_rejected() {
        let params = IndicatorParams::default();
        let bars = flat_bars(10, 100.0);
        assert!(IndicatorSet::compute(&bars, &params).is_err());
    }

    #[test]
    fn test_flat_market_values() {
        let params = IndicatorParams::default();
        let bars = flat_bars(params.min_bars(), 100.0);
        let ind = IndicatorSet::compute(&bars, &params).unwrap();

        assert!((ind.sma - 100.0).abs() < 1e-6);
        assert!((ind.ema_fast - 100.0).abs() < 1e-3);
        assert!((ind.macd_histogram).abs() < 1e-6);
        assert!(ind.bb_upper >= ind.bb_middle && ind.bb_middle >= ind.bb_lower);
        assert!((ind.avg_volume - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_uptrend_indicator_alignment() {
        let params = IndicatorParams::default();
        let bars = trending_bars(params.min_bars(), 100.0, 0.5);
        let ind = IndicatorSet::compute(&bars, &params).unwrap();

        assert!(ind.rsi > 50.0);
        assert!(ind.ema_fast > ind.ema_slow);
        assert!(ind.macd_histogram >= 0.0 || ind.macd > ind.macd_signal);
        // A persistent one-direction move produces a strong ADX reading
        assert!(ind.adx > 20.0, "adx = {}", ind.adx);
        assert!(ind.atr > 0.0);
    }

    #[test]
    fn test_rsi_bounded() {
        let params = IndicatorParams::default();
        for step in [-1.0, -0.1, 0.1, 1.0] {
            let bars = trending_bars(params.min_bars(), 500.0, step);
            let ind = IndicatorSet::compute(&bars, &params).unwrap();
            assert!((0.0..=100.0).contains(&ind.rsi));
        }
    }

    #[test]
    fn test_malformed_candle_rejected() {
        let params = IndicatorParams::default();
        let mut bars = flat_bars(params.min_bars(), 100.0);
        let last = bars.len() - 1;
        bars[last].low = bars[last].high + 5.0;
        assert!(IndicatorSet::compute(&bars, &params).is_err());
    }
}
