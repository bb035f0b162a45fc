//! Condition and signal evaluation over a historical bar window.
//!
//! Conditions are evaluated by tagged-variant dispatch on `ConditionKind`;
//! there is no string parsing. Operands whose indicator value is still inside
//! its warm-up window (NaN) make the condition false rather than erroring.

use crate::domain::indicators::IndicatorCache;
use crate::domain::theory::{Condition, ConditionKind, Operand, PriceField, Signal};
use crate::domain::types::Candle;
use rust_decimal::prelude::ToPrimitive;

const EQUALS_EPSILON: f64 = 1e-9;

fn price_at(bars: &[Candle], idx: usize, field: PriceField) -> f64 {
    let bar = &bars[idx];
    let value = match field {
        PriceField::Open => bar.open,
        PriceField::High => bar.high,
        PriceField::Low => bar.low,
        PriceField::Close => bar.close,
    };
    value.to_f64().unwrap_or(f64::NAN)
}

fn resolve(operand: &Operand, bars: &[Candle], idx: usize, cache: &IndicatorCache) -> f64 {
    match operand {
        Operand::Indicator(name) => cache.value_at(name, idx),
        Operand::Price(field) => price_at(bars, idx, *field),
    }
}

/// Evaluate one condition at bar `idx`.
///
/// Cross comparisons need a previous bar; at `idx == 0` they are false.
pub fn evaluate_condition(
    condition: &Condition,
    bars: &[Candle],
    idx: usize,
    cache: &IndicatorCache,
) -> bool {
    let left = resolve(&condition.left, bars, idx, cache);
    let right = resolve(&condition.right, bars, idx, cache);
    if left.is_nan() || right.is_nan() {
        return false;
    }

    match condition.kind {
        ConditionKind::GreaterThan => left > right,
        ConditionKind::LessThan => left < right,
        ConditionKind::Equals => {
            let scale = left.abs().max(right.abs()).max(1.0);
            (left - right).abs() <= EQUALS_EPSILON * scale
        }
        ConditionKind::CrossOver | ConditionKind::CrossUnder => {
            if idx == 0 {
                return false;
            }
            let prev_left = resolve(&condition.left, bars, idx - 1, cache);
            let prev_right = resolve(&condition.right, bars, idx - 1, cache);
            if prev_left.is_nan() || prev_right.is_nan() {
                return false;
            }
            match condition.kind {
                ConditionKind::CrossOver => prev_left <= prev_right && left > right,
                _ => prev_left >= prev_right && left < right,
            }
        }
    }
}

/// Evaluate a signal: the conjunction of its conditions.
pub fn evaluate_signal(signal: &Signal, bars: &[Candle], idx: usize, cache: &IndicatorCache) -> bool {
    !signal.conditions.is_empty()
        && signal
            .conditions
            .iter()
            .all(|c| evaluate_condition(c, bars, idx, cache))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::theory::{IndicatorKind, IndicatorSpec};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn candles(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle {
                symbol: "TEST".to_string(),
                open: Decimal::from_f64_retain(c).unwrap_or_default(),
                high: Decimal::from_f64_retain(c + 0.5).unwrap_or_default(),
                low: Decimal::from_f64_retain(c - 0.5).unwrap_or_default(),
                close: Decimal::from_f64_retain(c).unwrap_or_default(),
                volume: dec!(100),
                timestamp: i as i64 * 86400,
            })
            .collect()
    }

    fn sma3_cache(bars: &[Candle]) -> (Vec<IndicatorSpec>, IndicatorCache) {
        let specs = vec![IndicatorSpec::new("sma_3", IndicatorKind::Sma).with_param("period", 3.0)];
        let mut cache = IndicatorCache::new();
        cache.ensure(&specs, bars);
        (specs, cache)
    }

    #[test]
    fn cross_over_detected_once() {
        // close: below SMA then jumping above it.
        let bars = candles(&[10.0, 10.0, 10.0, 9.0, 14.0, 14.0]);
        let (_, cache) = sma3_cache(&bars);
        let cond = Condition {
            left: Operand::Price(PriceField::Close),
            right: Operand::Indicator("sma_3".to_string()),
            kind: ConditionKind::CrossOver,
        };
        // idx 3: close 9 < sma; idx 4: close 14 > sma(11) with prev close 9 <= prev sma.
        assert!(!evaluate_condition(&cond, &bars, 3, &cache));
        assert!(evaluate_condition(&cond, &bars, 4, &cache));
        // Already above on the next bar: no new cross.
        assert!(!evaluate_condition(&cond, &bars, 5, &cache));
    }

    #[test]
    fn cross_under_mirrors_cross_over() {
        let bars = candles(&[10.0, 10.0, 10.0, 11.0, 6.0, 6.0]);
        let (_, cache) = sma3_cache(&bars);
        let cond = Condition {
            left: Operand::Price(PriceField::Close),
            right: Operand::Indicator("sma_3".to_string()),
            kind: ConditionKind::CrossUnder,
        };
        assert!(evaluate_condition(&cond, &bars, 4, &cache));
        assert!(!evaluate_condition(&cond, &bars, 5, &cache));
    }

    #[test]
    fn warmup_values_are_false_not_errors() {
        let bars = candles(&[10.0, 11.0]);
        let (_, cache) = sma3_cache(&bars);
        let cond = Condition {
            left: Operand::Price(PriceField::Close),
            right: Operand::Indicator("sma_3".to_string()),
            kind: ConditionKind::GreaterThan,
        };
        assert!(!evaluate_condition(&cond, &bars, 1, &cache));
    }

    #[test]
    fn signal_is_conjunction() {
        let bars = candles(&[10.0, 10.0, 10.0, 9.0, 14.0]);
        let (_, cache) = sma3_cache(&bars);
        let cross = Condition {
            left: Operand::Price(PriceField::Close),
            right: Operand::Indicator("sma_3".to_string()),
            kind: ConditionKind::CrossOver,
        };
        let impossible = Condition {
            left: Operand::Price(PriceField::Low),
            right: Operand::Price(PriceField::High),
            kind: ConditionKind::GreaterThan,
        };

        let both = Signal {
            name: "entry".to_string(),
            conditions: vec![cross.clone(), impossible],
        };
        let single = Signal {
            name: "entry".to_string(),
            conditions: vec![cross],
        };
        assert!(evaluate_signal(&single, &bars, 4, &cache));
        assert!(!evaluate_signal(&both, &bars, 4, &cache));
    }

    #[test]
    fn price_vs_price_comparison() {
        let bars = candles(&[10.0]);
        let cache = IndicatorCache::new();
        let cond = Condition {
            left: Operand::Price(PriceField::High),
            right: Operand::Price(PriceField::Low),
            kind: ConditionKind::GreaterThan,
        };
        assert!(evaluate_condition(&cond, &bars, 0, &cache));
    }
}
