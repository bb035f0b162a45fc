//! End-to-end strategy discovery: generate candidate theories, screen them
//! with a quick backtest, genetically optimize the promising ones, and
//! persist whatever survives.

use crate::application::backtest::result::BacktestResult;
use crate::application::backtester::Backtester;
use crate::application::generator::TheoryGenerator;
use crate::application::optimization::genetic::{
    FitnessMode, GeneticOptimizer, GeneticSettings, OptimizationResult,
};
use crate::domain::errors::SearchError;
use crate::domain::ports::{ResultSink, RiskManagerService};
use crate::domain::theory::Theory;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Screening thresholds and optimization knobs for one search run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    pub symbols: Vec<String>,
    /// Screening gates; all strict comparisons, so a theory sitting exactly
    /// on a threshold is not promising.
    pub min_sharpe: f64,
    pub max_drawdown: f64,
    pub min_profit_factor: f64,
    pub min_win_rate: f64,
    pub genetic: GeneticSettings,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            symbols: vec!["BTC/USD".to_string()],
            min_sharpe: 0.5,
            max_drawdown: 0.2,
            min_profit_factor: 1.2,
            min_win_rate: 0.4,
            genetic: GeneticSettings::default(),
        }
    }
}

/// One surviving strategy with its optimization history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub theory: Theory,
    pub fitness: f64,
    pub result: BacktestResult,
    pub optimization: OptimizationResult,
}

pub struct StrategySearchService {
    generator: TheoryGenerator,
    backtester: Arc<Backtester>,
    risk_manager: Arc<dyn RiskManagerService>,
    sink: Arc<dyn ResultSink>,
    settings: SearchSettings,
}

impl StrategySearchService {
    pub fn new(
        generator: TheoryGenerator,
        backtester: Arc<Backtester>,
        risk_manager: Arc<dyn RiskManagerService>,
        sink: Arc<dyn ResultSink>,
        settings: SearchSettings,
    ) -> Self {
        Self {
            generator,
            backtester,
            risk_manager,
            sink,
            settings,
        }
    }

    /// Generate `count` theories and run the full pipeline over each.
    /// Returns the survivors sorted by fitness, best first. A data-provider
    /// outage aborts the search; any other per-theory failure is logged and
    /// the search moves on.
    pub async fn search_strategies(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        count: usize,
    ) -> Result<Vec<SearchOutcome>> {
        if self.settings.symbols.is_empty() {
            return Err(SearchError::NoSymbols.into());
        }

        let theories = self.generator.generate_theories(&self.settings.symbols, count);
        info!(
            "Search: screening {} theories over {:?}",
            theories.len(),
            self.settings.symbols
        );

        let mut outcomes = Vec::new();
        for (idx, theory) in theories.iter().enumerate() {
            match self.evaluate_theory(theory, idx, start, end).await {
                Ok(Some(outcome)) => outcomes.push(outcome),
                Ok(None) => {}
                Err(e) => {
                    if e.downcast_ref::<SearchError>()
                        .map(|s| matches!(s, SearchError::DataUnavailable { .. }))
                        .unwrap_or(false)
                    {
                        return Err(e);
                    }
                    warn!("Search [{}]: failed, skipping: {:#}", theory.name, e);
                }
            }
        }

        outcomes.sort_by(|a, b| {
            b.fitness
                .partial_cmp(&a.fitness)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        info!("Search: {} of {} theories survived", outcomes.len(), count);
        Ok(outcomes)
    }

    async fn evaluate_theory(
        &mut self,
        theory: &Theory,
        idx: usize,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<SearchOutcome>> {
        let symbol = theory.symbols.first().ok_or(SearchError::NoSymbols)?.clone();
        let screen = self.backtester.run_backtest(theory, &symbol, start, end).await?;

        if !self.is_promising(&screen) {
            info!(
                "Search [{}]: not promising (sharpe {:.2}, dd {:.2}, pf {:.2}, wr {:.2})",
                theory.name,
                screen.metrics.sharpe_ratio,
                screen.metrics.max_drawdown,
                screen.metrics.profit_factor,
                screen.metrics.win_rate
            );
            return Ok(None);
        }

        // Each theory gets its own deterministic optimizer stream.
        let mut genetic = self.settings.genetic.clone();
        genetic.seed = genetic.seed.wrapping_add(idx as u64);
        let mut optimizer = GeneticOptimizer::new(Arc::clone(&self.backtester), genetic)
            .with_fitness_mode(FitnessMode::WithWinRate);
        let optimization = optimizer.optimize(theory, start, end).await?;

        info!(
            "Search [{}]: optimized, fitness {:.4} (from {:.4})",
            theory.name, optimization.best_fitness, optimization.initial_fitness
        );

        // Feed the winning risk scalars back so later sizing reflects them.
        if !optimization.best_theory.parameters.is_empty() {
            self.risk_manager
                .update_risk_parameters(&symbol, &optimization.best_theory.parameters)
                .await?;
        }

        self.sink.save_backtest(&optimization.best_result).await?;
        self.sink.save_optimization(&optimization).await?;

        Ok(Some(SearchOutcome {
            theory: optimization.best_theory.clone(),
            fitness: optimization.best_fitness,
            result: optimization.best_result.clone(),
            optimization,
        }))
    }

    fn is_promising(&self, screen: &BacktestResult) -> bool {
        let m = &screen.metrics;
        m.sharpe_ratio > self.settings.min_sharpe
            && m.max_drawdown < self.settings.max_drawdown
            && m.profit_factor > self.settings.min_profit_factor
            && m.win_rate > self.settings.min_win_rate
    }
}
