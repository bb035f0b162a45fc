//! Randomized theory construction, mutation and crossover.

use crate::domain::theory::{
    Condition, ConditionKind, IndicatorKind, IndicatorSpec, Operand, PriceField, Signal, Theory,
};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use tracing::debug;

/// Comparison kinds the generator draws from; `Equals` is representable but
/// never generated (it is useless against continuous series).
const GENERATED_CONDITIONS: [ConditionKind; 4] = [
    ConditionKind::GreaterThan,
    ConditionKind::LessThan,
    ConditionKind::CrossOver,
    ConditionKind::CrossUnder,
];

/// Produces candidate theories for the search loop.
///
/// Owns its RNG so a seeded generator yields a reproducible stream of
/// theories.
pub struct TheoryGenerator {
    rng: StdRng,
    counter: u64,
}

impl TheoryGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            counter: 0,
        }
    }

    /// Generate one randomized theory over the given symbols.
    pub fn generate_theory(&mut self, symbols: &[String]) -> Theory {
        self.counter += 1;
        let indicators = self.random_indicators();
        let entry_signal = self.random_signal("entry", &indicators);
        let exit_signal = self.random_signal("exit", &indicators);
        let parameters = self.random_parameters();

        let theory = Theory {
            name: format!("theory-{}", self.counter),
            symbols: symbols.to_vec(),
            indicators,
            entry_signal,
            exit_signal,
            parameters,
        };
        debug!(
            "Generated {}: entry [{}], exit [{}]",
            theory.name,
            theory.entry_signal.expression(),
            theory.exit_signal.expression()
        );
        theory
    }

    pub fn generate_theories(&mut self, symbols: &[String], count: usize) -> Vec<Theory> {
        (0..count).map(|_| self.generate_theory(symbols)).collect()
    }

    /// Replace exactly one aspect of the theory, chosen uniformly: the
    /// indicator set, the scalar parameters, or both signals.
    pub fn mutate_theory(&mut self, theory: &Theory) -> Theory {
        self.counter += 1;
        let mut mutated = theory.clone();
        mutated.name = format!("{}-m{}", theory.name, self.counter);

        match self.rng.random_range(0..3) {
            0 => {
                // Signals are kept as-is; conditions referencing a dropped
                // indicator resolve to NaN and evaluate false.
                mutated.indicators = self.random_indicators();
            }
            1 => {
                mutated.parameters = self.random_parameters();
            }
            _ => {
                mutated.entry_signal = self.random_signal("entry", &mutated.indicators);
                mutated.exit_signal = self.random_signal("exit", &mutated.indicators);
            }
        }
        mutated
    }

    /// Recombine two theories: 50% inclusion per parent indicator, 50% per
    /// scalar key (later key wins on collision), each signal from either
    /// parent with equal probability.
    pub fn crossover_theories(&mut self, a: &Theory, b: &Theory) -> Theory {
        self.counter += 1;

        let mut indicators = Vec::new();
        for spec in a.indicators.iter().chain(b.indicators.iter()) {
            if self.rng.random_bool(0.5) {
                indicators.push(spec.clone());
            }
        }
        // The union may come out empty; fall back to one parent's set so the
        // child stays structurally valid.
        if indicators.is_empty() {
            indicators = if self.rng.random_bool(0.5) {
                a.indicators.clone()
            } else {
                b.indicators.clone()
            };
        }

        let mut parameters = BTreeMap::new();
        for (key, value) in a.parameters.iter().chain(b.parameters.iter()) {
            if self.rng.random_bool(0.5) {
                parameters.insert(key.clone(), *value);
            }
        }

        let entry_signal = if self.rng.random_bool(0.5) {
            a.entry_signal.clone()
        } else {
            b.entry_signal.clone()
        };
        let exit_signal = if self.rng.random_bool(0.5) {
            a.exit_signal.clone()
        } else {
            b.exit_signal.clone()
        };

        let mut symbols = a.symbols.clone();
        if symbols.is_empty() {
            symbols = b.symbols.clone();
        }

        Theory {
            name: format!("cross-{}", self.counter),
            symbols,
            indicators,
            entry_signal,
            exit_signal,
            parameters,
        }
    }

    fn random_indicators(&mut self) -> Vec<IndicatorSpec> {
        let count = self.rng.random_range(2..=4);
        (0..count).map(|i| self.random_indicator(i)).collect()
    }

    fn random_indicator(&mut self, ordinal: usize) -> IndicatorSpec {
        let kind = *IndicatorKind::ALL
            .choose(&mut self.rng)
            .unwrap_or(&IndicatorKind::Sma);
        let name = format!("{}_{}", kind.to_string().to_lowercase(), ordinal);
        let spec = IndicatorSpec::new(name, kind);

        match kind {
            IndicatorKind::Sma | IndicatorKind::Ema | IndicatorKind::Rsi => {
                spec.with_param("period", self.rng.random_range(5.0..50.0))
            }
            IndicatorKind::Macd => spec
                .with_param("fast_period", self.rng.random_range(8.0..15.0))
                .with_param("slow_period", self.rng.random_range(20.0..30.0))
                .with_param("signal_period", self.rng.random_range(5.0..10.0)),
            IndicatorKind::Bollinger => spec
                .with_param("period", self.rng.random_range(10.0..30.0))
                .with_param("multiplier", self.rng.random_range(1.5..=2.5)),
            IndicatorKind::Atr => spec.with_param("period", self.rng.random_range(10.0..20.0)),
        }
    }

    fn random_signal(&mut self, name: &str, indicators: &[IndicatorSpec]) -> Signal {
        let count = self.rng.random_range(1..=2);
        let conditions = (0..count).map(|_| self.random_condition(indicators)).collect();
        Signal {
            name: name.to_string(),
            conditions,
        }
    }

    fn random_condition(&mut self, indicators: &[IndicatorSpec]) -> Condition {
        Condition {
            left: self.random_operand(indicators),
            right: self.random_operand(indicators),
            kind: *GENERATED_CONDITIONS
                .choose(&mut self.rng)
                .unwrap_or(&ConditionKind::GreaterThan),
        }
    }

    fn random_operand(&mut self, indicators: &[IndicatorSpec]) -> Operand {
        if !indicators.is_empty() && self.rng.random_bool(0.5) {
            let spec = indicators
                .choose(&mut self.rng)
                .expect("non-empty indicator list");
            Operand::Indicator(spec.name.clone())
        } else {
            Operand::Price(
                *PriceField::ALL
                    .choose(&mut self.rng)
                    .unwrap_or(&PriceField::Close),
            )
        }
    }

    fn random_parameters(&mut self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("risk_per_trade".to_string(), self.rng.random_range(0.01..0.05)),
            ("stop_loss_pct".to_string(), self.rng.random_range(0.02..0.10)),
            ("take_profit_pct".to_string(), self.rng.random_range(0.04..0.20)),
        ])
    }
}
