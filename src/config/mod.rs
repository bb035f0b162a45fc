//! Environment-driven configuration for the search engine.

use crate::application::optimization::genetic::GeneticSettings;
use crate::application::search::SearchSettings;
use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    pub symbols: Vec<String>,
    pub initial_equity: Decimal,
    pub max_concurrency: usize,
    pub theory_count: usize,
    pub population_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTC/USD".to_string(), "ETH/USD".to_string()],
            initial_equity: dec!(10000),
            max_concurrency: 8,
            theory_count: 10,
            population_size: 20,
            generations: 10,
            mutation_rate: 0.1,
            seed: 0,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let symbols = env::var("SEARCH_SYMBOLS")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.symbols);

        let initial_equity = env::var("SEARCH_INITIAL_EQUITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.initial_equity);

        let max_concurrency = env::var("SEARCH_MAX_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_concurrency);

        let theory_count = env::var("SEARCH_THEORY_COUNT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.theory_count);

        let population_size = env::var("SEARCH_POPULATION_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.population_size);

        let generations = env::var("SEARCH_GENERATIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.generations);

        let mutation_rate = env::var("SEARCH_MUTATION_RATE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.mutation_rate);

        let seed = env::var("SEARCH_SEED")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.seed);

        Self {
            symbols,
            initial_equity,
            max_concurrency,
            theory_count,
            population_size,
            generations,
            mutation_rate,
            seed,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            anyhow::bail!("at least one symbol is required");
        }
        if self.initial_equity <= Decimal::ZERO {
            anyhow::bail!("initial equity must be positive");
        }
        if self.population_size == 0 {
            anyhow::bail!("population size must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            anyhow::bail!(
                "mutation rate must be within [0, 1], got {}",
                self.mutation_rate
            );
        }
        if self.max_concurrency == 0 {
            anyhow::bail!("max concurrency must be at least 1");
        }
        Ok(())
    }

    pub fn genetic_settings(&self) -> GeneticSettings {
        GeneticSettings {
            population_size: self.population_size,
            generations: self.generations,
            mutation_rate: self.mutation_rate,
            seed: self.seed,
            ..Default::default()
        }
    }

    pub fn search_settings(&self) -> SearchSettings {
        SearchSettings {
            symbols: self.symbols.clone(),
            genetic: self.genetic_settings(),
            ..Default::default()
        }
    }
}
