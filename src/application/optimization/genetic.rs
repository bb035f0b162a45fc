//! Genetic-algorithm optimization of theory parameters.
//!
//! The generation loop is strictly sequential (each generation depends on
//! the previous); fitness evaluation within a generation fans out through
//! the backtester.

use crate::application::backtest::result::BacktestResult;
use crate::application::backtester::Backtester;
use crate::application::optimization::grid::ParameterRange;
use crate::domain::errors::SearchError;
use crate::domain::theory::Theory;
use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Relative perturbation applied when seeding variants from the base theory.
const SEED_VARIATION: f64 = 0.20;
/// Relative perturbation applied by mutation without explicit ranges.
const MUTATION_VARIATION: f64 = 0.10;

/// Fitness function selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitnessMode {
    /// `return - 2*drawdown + sharpe/2 + min(profit_factor, 3)/3`
    Standard,
    /// Standard plus `win_rate - 0.5` (used by the search service).
    WithWinRate,
}

impl FitnessMode {
    pub fn score(&self, result: &BacktestResult) -> f64 {
        let m = &result.metrics;
        let mut fitness = result.normalized_return() - 2.0 * m.max_drawdown
            + m.sharpe_ratio / 2.0
            + m.profit_factor.min(3.0) / 3.0;
        if *self == FitnessMode::WithWinRate {
            fitness += m.win_rate - 0.5;
        }
        fitness
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneticSettings {
    pub population_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub tournament_size: usize,
    /// Explicit bounds keyed `indicator.param` (or a bare scalar key). When
    /// present, seeding and mutation re-randomize within the range instead
    /// of perturbing.
    pub parameter_ranges: Option<BTreeMap<String, ParameterRange>>,
    /// Optional wall-clock deadline; the loop ends early with the best
    /// theory found so far.
    #[serde(skip)]
    pub max_duration: Option<Duration>,
    pub seed: u64,
}

impl Default for GeneticSettings {
    fn default() -> Self {
        Self {
            population_size: 20,
            generations: 10,
            mutation_rate: 0.1,
            tournament_size: 3,
            parameter_ranges: None,
            max_duration: None,
            seed: 0,
        }
    }
}

/// Best/average/worst fitness of one generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub generation: usize,
    pub best_fitness: f64,
    pub average_fitness: f64,
    pub worst_fitness: f64,
}

/// Output of one genetic-optimization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub best_theory: Theory,
    pub best_result: BacktestResult,
    pub best_fitness: f64,
    /// Fitness of the unmodified base theory in the first generation.
    pub initial_fitness: f64,
    pub generations: Vec<GenerationResult>,
    pub duration_secs: f64,
}

impl OptimizationResult {
    /// Before/after fitness delta of the run.
    pub fn improvement(&self) -> f64 {
        self.best_fitness - self.initial_fitness
    }
}

pub struct GeneticOptimizer {
    backtester: Arc<Backtester>,
    settings: GeneticSettings,
    fitness_mode: FitnessMode,
    rng: StdRng,
}

impl GeneticOptimizer {
    pub fn new(backtester: Arc<Backtester>, settings: GeneticSettings) -> Self {
        let rng = StdRng::seed_from_u64(settings.seed);
        Self {
            backtester,
            settings,
            fitness_mode: FitnessMode::Standard,
            rng,
        }
    }

    pub fn with_fitness_mode(mut self, mode: FitnessMode) -> Self {
        self.fitness_mode = mode;
        self
    }

    /// Evolve the base theory's parameters over the configured generation
    /// count, backtesting each member over the theory's first symbol only.
    pub async fn optimize(
        &mut self,
        base_theory: &Theory,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<OptimizationResult> {
        if self.settings.population_size == 0 {
            return Err(SearchError::EmptyPopulation.into());
        }
        let symbol = base_theory
            .symbols
            .first()
            .ok_or(SearchError::NoSymbols)?
            .clone();

        let started = Instant::now();
        let mut population = self.seed_population(base_theory);
        let mut generations = Vec::with_capacity(self.settings.generations);
        let mut best: Option<(Theory, BacktestResult, f64)> = None;
        let mut initial_fitness = 0.0;

        for generation in 0..self.settings.generations {
            let scored = self.evaluate(&population, &symbol, start, end).await;

            // Population index 0 of the first generation is the unmodified
            // base theory. A failed screen gives no usable baseline; report
            // zero instead of negative infinity so deltas stay finite.
            if generation == 0 {
                initial_fitness = if scored[0].1.is_finite() {
                    scored[0].1
                } else {
                    0.0
                };
            }

            let stats = Self::generation_stats(generation, &scored);
            info!(
                "Genetic [{}] gen {}/{}: best {:.4}, avg {:.4}, worst {:.4}",
                base_theory.name,
                generation + 1,
                self.settings.generations,
                stats.best_fitness,
                stats.average_fitness,
                stats.worst_fitness
            );
            generations.push(stats);

            for (idx, (result, fitness)) in scored.iter().enumerate() {
                if let Some(result) = result {
                    if best.as_ref().map(|(_, _, f)| fitness > f).unwrap_or(true) {
                        best = Some((population[idx].clone(), result.clone(), *fitness));
                    }
                }
            }

            if let Some(max) = self.settings.max_duration {
                if started.elapsed() > max {
                    warn!(
                        "Genetic [{}]: deadline reached after generation {}, stopping early",
                        base_theory.name,
                        generation + 1
                    );
                    break;
                }
            }

            // No breeding after the final evaluated generation.
            if generation + 1 < self.settings.generations {
                population = self.breed(&population, &scored)?;
            }
        }

        let (best_theory, best_result, best_fitness) = best.ok_or_else(|| {
            anyhow::anyhow!("genetic optimization produced no evaluable member")
        })?;

        Ok(OptimizationResult {
            best_theory,
            best_result,
            best_fitness,
            initial_fitness,
            generations,
            duration_secs: started.elapsed().as_secs_f64(),
        })
    }

    /// Run with explicit settings (ranges, deadline) instead of the
    /// constructor-supplied ones.
    pub async fn optimize_parameters(
        &mut self,
        theory: &Theory,
        settings: GeneticSettings,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<OptimizationResult> {
        self.settings = settings;
        self.rng = StdRng::seed_from_u64(self.settings.seed);
        self.optimize(theory, start, end).await
    }

    /// Base theory plus N-1 perturbed variants.
    fn seed_population(&mut self, base: &Theory) -> Vec<Theory> {
        let mut population = Vec::with_capacity(self.settings.population_size);
        population.push(base.clone());
        for i in 1..self.settings.population_size {
            let mut variant = self.perturb_all(base, SEED_VARIATION);
            variant.name = format!("{}-v{}", base.name, i);
            population.push(variant);
        }
        population
    }

    async fn evaluate(
        &self,
        population: &[Theory],
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<(Option<BacktestResult>, f64)> {
        let runs = population
            .iter()
            .map(|theory| self.backtester.run_backtest(theory, symbol, start, end));
        join_all(runs)
            .await
            .into_iter()
            .map(|outcome| match outcome {
                Ok(result) => {
                    let fitness = self.fitness_mode.score(&result);
                    (Some(result), fitness)
                }
                Err(e) => {
                    warn!("Genetic: member backtest failed, excluded: {:#}", e);
                    (None, f64::NEG_INFINITY)
                }
            })
            .collect()
    }

    fn generation_stats(
        generation: usize,
        scored: &[(Option<BacktestResult>, f64)],
    ) -> GenerationResult {
        let finite: Vec<f64> = scored
            .iter()
            .map(|(_, f)| *f)
            .filter(|f| f.is_finite())
            .collect();
        let (best, avg, worst) = if finite.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            (
                finite.iter().cloned().fold(f64::MIN, f64::max),
                finite.iter().sum::<f64>() / finite.len() as f64,
                finite.iter().cloned().fold(f64::MAX, f64::min),
            )
        };
        GenerationResult {
            generation,
            best_fitness: best,
            average_fitness: avg,
            worst_fitness: worst,
        }
    }

    fn breed(
        &mut self,
        population: &[Theory],
        scored: &[(Option<BacktestResult>, f64)],
    ) -> Result<Vec<Theory>, SearchError> {
        let fitness: Vec<f64> = scored.iter().map(|(_, f)| *f).collect();
        let mut next = Vec::with_capacity(population.len());

        while next.len() < population.len() {
            let p1 = self.tournament_select(population, &fitness);
            let p2 = self.tournament_select(population, &fitness);
            let (mut c1, mut c2) = self.blend_crossover(p1, p2)?;
            self.mutate(&mut c1);
            self.mutate(&mut c2);
            next.push(c1);
            if next.len() < population.len() {
                next.push(c2);
            }
        }
        Ok(next)
    }

    /// Uniform sample of `tournament_size` members; fittest wins.
    fn tournament_select<'a>(&mut self, population: &'a [Theory], fitness: &[f64]) -> &'a Theory {
        let mut best_idx = self.rng.random_range(0..population.len());
        for _ in 1..self.settings.tournament_size.max(1) {
            let idx = self.rng.random_range(0..population.len());
            if fitness[idx] > fitness[best_idx] {
                best_idx = idx;
            }
        }
        &population[best_idx]
    }

    /// Per-parameter linear blend of two aligned parents.
    ///
    /// Precondition: parents' indicator lists are positionally aligned (same
    /// length, same kinds). Populations seeded from a single base theory are
    /// aligned by construction; everything else is checked explicitly.
    fn blend_crossover(&mut self, a: &Theory, b: &Theory) -> Result<(Theory, Theory), SearchError> {
        if a.indicators.len() != b.indicators.len()
            || a.indicators
                .iter()
                .zip(b.indicators.iter())
                .any(|(x, y)| x.kind != y.kind)
        {
            return Err(SearchError::MisalignedParents {
                left: a.indicators.len(),
                right: b.indicators.len(),
            });
        }

        let mut child1 = a.clone();
        let mut child2 = b.clone();

        for (pos, (spec_a, spec_b)) in a.indicators.iter().zip(b.indicators.iter()).enumerate() {
            for (key, &v1) in &spec_a.parameters {
                let v2 = spec_b.parameters.get(key).copied().unwrap_or(v1);
                let w: f64 = self.rng.random_range(0.0..=1.0);
                child1.indicators[pos]
                    .parameters
                    .insert(key.clone(), w * v1 + (1.0 - w) * v2);
                child2.indicators[pos]
                    .parameters
                    .insert(key.clone(), (1.0 - w) * v1 + w * v2);
            }
        }

        for (key, &v1) in &a.parameters {
            let v2 = b.parameters.get(key).copied().unwrap_or(v1);
            let w: f64 = self.rng.random_range(0.0..=1.0);
            child1.parameters.insert(key.clone(), w * v1 + (1.0 - w) * v2);
            child2.parameters.insert(key.clone(), (1.0 - w) * v1 + w * v2);
        }

        Ok((child1, child2))
    }

    /// Perturb each parameter with probability `mutation_rate`.
    fn mutate(&mut self, theory: &mut Theory) {
        let rate = self.settings.mutation_rate;
        let ranges = self.settings.parameter_ranges.clone();

        for pos in 0..theory.indicators.len() {
            let keys: Vec<String> = theory.indicators[pos].parameters.keys().cloned().collect();
            for key in keys {
                if self.rng.random_range(0.0..1.0) >= rate {
                    continue;
                }
                let range_key = format!("{}.{}", theory.indicators[pos].name, key);
                let current = theory.indicators[pos].parameters[&key];
                let value = self.mutated_value(current, ranges.as_ref(), &range_key);
                theory.indicators[pos].parameters.insert(key, value);
            }
        }

        let keys: Vec<String> = theory.parameters.keys().cloned().collect();
        for key in keys {
            if self.rng.random_range(0.0..1.0) >= rate {
                continue;
            }
            let current = theory.parameters[&key];
            let value = self.mutated_value(current, ranges.as_ref(), &key);
            theory.parameters.insert(key, value);
        }
    }

    fn mutated_value(
        &mut self,
        current: f64,
        ranges: Option<&BTreeMap<String, ParameterRange>>,
        key: &str,
    ) -> f64 {
        if let Some(range) = ranges.and_then(|r| r.get(key)) {
            if range.max > range.min {
                return self.rng.random_range(range.min..=range.max);
            }
            return range.min;
        }
        current * (1.0 + self.rng.random_range(-MUTATION_VARIATION..=MUTATION_VARIATION))
    }

    /// Perturb every parameter of a theory by up to +/-`variation`, or
    /// redraw within the explicit range when one is supplied.
    fn perturb_all(&mut self, base: &Theory, variation: f64) -> Theory {
        let ranges = self.settings.parameter_ranges.clone();
        let mut out = base.clone();

        for pos in 0..out.indicators.len() {
            let keys: Vec<String> = out.indicators[pos].parameters.keys().cloned().collect();
            for key in keys {
                let range_key = format!("{}.{}", out.indicators[pos].name, key);
                let current = out.indicators[pos].parameters[&key];
                let value = match ranges.as_ref().and_then(|r| r.get(&range_key)) {
                    Some(range) => {
                        let spread = (range.max - range.min) * range.variation;
                        (current + self.rng.random_range(-spread..=spread.max(f64::MIN_POSITIVE)))
                            .clamp(range.min, range.max)
                    }
                    None => current * (1.0 + self.rng.random_range(-variation..=variation)),
                };
                out.indicators[pos].parameters.insert(key, value);
            }
        }
        out
    }
}
