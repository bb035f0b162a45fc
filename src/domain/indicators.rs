//! Indicator series computation for signal evaluation.
//!
//! Every function returns a series aligned with its input; positions inside
//! the warm-up window hold `f64::NAN`, which the signal evaluator treats as
//! "not yet decidable". Values at index `i` depend only on bars `0..=i`, so
//! computing a full series up front introduces no look-ahead.

use crate::domain::theory::{IndicatorKind, IndicatorSpec};
use crate::domain::types::Candle;
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;

/// Simple moving average.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let period = period.max(1);
    let mut out = vec![f64::NAN; values.len()];
    if values.len() < period {
        return out;
    }
    let mut sum: f64 = values[..period].iter().sum();
    out[period - 1] = sum / period as f64;
    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out[i] = sum / period as f64;
    }
    out
}

/// Exponential moving average, seeded with the SMA of the first window.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let period = period.max(1);
    let mut out = vec![f64::NAN; values.len()];
    if values.len() < period {
        return out;
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut prev: f64 = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = prev;
    for i in period..values.len() {
        prev = values[i] * k + prev * (1.0 - k);
        out[i] = prev;
    }
    out
}

/// Relative strength index with Wilder smoothing, 0..100.
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    let period = period.max(1);
    let mut out = vec![f64::NAN; values.len()];
    if values.len() <= period {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let delta = values[i] - values[i - 1];
        if delta > 0.0 {
            avg_gain += delta;
        } else {
            avg_loss -= delta;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    out[period] = rsi_value(avg_gain, avg_loss);

    for i in (period + 1)..values.len() {
        let delta = values[i] - values[i - 1];
        let (gain, loss) = if delta > 0.0 { (delta, 0.0) } else { (0.0, -delta) };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        out[i] = rsi_value(avg_gain, avg_loss);
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
}

/// MACD line: fast EMA minus slow EMA.
pub fn macd_line(values: &[f64], fast: usize, slow: usize) -> Vec<f64> {
    let fast_series = ema(values, fast);
    let slow_series = ema(values, slow);
    fast_series
        .iter()
        .zip(slow_series.iter())
        .map(|(f, s)| f - s)
        .collect()
}

/// Lower Bollinger band: SMA minus `multiplier` standard deviations.
pub fn bollinger_lower(values: &[f64], period: usize, multiplier: f64) -> Vec<f64> {
    let period = period.max(2);
    let middle = sma(values, period);
    let mut out = vec![f64::NAN; values.len()];
    for i in (period - 1)..values.len() {
        let window = &values[i + 1 - period..=i];
        let mean = middle[i];
        let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
        out[i] = mean - multiplier * variance.sqrt();
    }
    out
}

/// Average true range with Wilder smoothing.
pub fn atr(bars: &[Candle], period: usize) -> Vec<f64> {
    let period = period.max(1);
    let mut out = vec![f64::NAN; bars.len()];
    if bars.len() <= period {
        return out;
    }

    let true_range = |i: usize| -> f64 {
        let high = bars[i].high.to_f64().unwrap_or(0.0);
        let low = bars[i].low.to_f64().unwrap_or(0.0);
        let prev_close = bars[i - 1].close.to_f64().unwrap_or(0.0);
        (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs())
    };

    let mut prev = (1..=period).map(true_range).sum::<f64>() / period as f64;
    out[period] = prev;
    for i in (period + 1)..bars.len() {
        prev = (prev * (period as f64 - 1.0) + true_range(i)) / period as f64;
        out[i] = prev;
    }
    out
}

/// Computes each theory indicator's series once per backtest window and
/// serves point lookups to the signal evaluator.
#[derive(Debug, Default)]
pub struct IndicatorCache {
    series: HashMap<String, Vec<f64>>,
    bar_count: usize,
}

impl IndicatorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute all series if the window changed since the last call.
    pub fn ensure(&mut self, specs: &[IndicatorSpec], bars: &[Candle]) {
        if self.bar_count == bars.len() && !self.series.is_empty() {
            return;
        }
        self.series.clear();
        self.bar_count = bars.len();
        let closes: Vec<f64> = bars
            .iter()
            .map(|b| b.close.to_f64().unwrap_or(0.0))
            .collect();
        for spec in specs {
            let series = compute_series(spec, &closes, bars);
            self.series.insert(spec.name.clone(), series);
        }
    }

    /// Value of a named indicator at a bar index; NaN when unknown or warming up.
    pub fn value_at(&self, name: &str, idx: usize) -> f64 {
        self.series
            .get(name)
            .and_then(|s| s.get(idx))
            .copied()
            .unwrap_or(f64::NAN)
    }
}

fn compute_series(spec: &IndicatorSpec, closes: &[f64], bars: &[Candle]) -> Vec<f64> {
    match spec.kind {
        IndicatorKind::Sma => sma(closes, spec.period("period", 20.0)),
        IndicatorKind::Ema => ema(closes, spec.period("period", 20.0)),
        IndicatorKind::Rsi => rsi(closes, spec.period("period", 14.0)),
        IndicatorKind::Macd => macd_line(
            closes,
            spec.period("fast_period", 12.0),
            spec.period("slow_period", 26.0),
        ),
        IndicatorKind::Bollinger => bollinger_lower(
            closes,
            spec.period("period", 20.0),
            spec.param("multiplier", 2.0),
        ),
        IndicatorKind::Atr => atr(bars, spec.period("period", 14.0)),
    }
}
