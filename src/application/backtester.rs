//! Backtest orchestration: data fetch, execution, metrics, validation,
//! parallel parameter sweeps.

use crate::application::backtest::executor::{TradeExecutor, WARMUP_BARS};
use crate::application::backtest::result::BacktestResult;
use crate::application::backtest::strategy::TheoryStrategy;
use crate::application::optimization::grid::{generate_parameter_sets, ParameterRange, ParameterSet};
use crate::domain::errors::SearchError;
use crate::domain::performance::BacktestValidator;
use crate::domain::ports::{MarketDataService, RiskManagerService};
use crate::domain::theory::Theory;
use crate::domain::types::Candle;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

const TIMEFRAME: &str = "1Day";

pub struct Backtester {
    market_data: Arc<dyn MarketDataService>,
    risk_manager: Arc<dyn RiskManagerService>,
    initial_equity: Decimal,
    /// Cap on simultaneously running sweep backtests.
    max_concurrency: usize,
}

impl Backtester {
    pub fn new(
        market_data: Arc<dyn MarketDataService>,
        risk_manager: Arc<dyn RiskManagerService>,
        initial_equity: Decimal,
    ) -> Self {
        Self {
            market_data,
            risk_manager,
            initial_equity,
            max_concurrency: 8,
        }
    }

    pub fn with_default_equity(
        market_data: Arc<dyn MarketDataService>,
        risk_manager: Arc<dyn RiskManagerService>,
    ) -> Self {
        Self::new(market_data, risk_manager, dec!(10000))
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn initial_equity(&self) -> Decimal {
        self.initial_equity
    }

    /// Backtest one theory over one symbol and date range.
    pub async fn run_backtest(
        &self,
        theory: &Theory,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BacktestResult> {
        let bars = self.fetch_bars(symbol, start, end).await?;
        self.run_with_bars(theory, symbol, &bars, start, end).await
    }

    /// Backtest with a parameter overlay applied on top of the theory.
    pub async fn run_backtest_with_parameters(
        &self,
        theory: &Theory,
        parameters: &ParameterSet,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BacktestResult> {
        let adjusted = theory.with_parameters(parameters);
        self.run_backtest(&adjusted, symbol, start, end).await
    }

    /// Backtest over prefetched bars. Used by the sweep so the data is only
    /// fetched once per symbol.
    pub async fn run_with_bars(
        &self,
        theory: &Theory,
        symbol: &str,
        bars: &[Candle],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BacktestResult> {
        Self::execute_run(
            self.risk_manager.clone(),
            self.initial_equity,
            theory,
            symbol,
            bars,
            start,
            end,
        )
        .await
    }

    async fn execute_run(
        risk_manager: Arc<dyn RiskManagerService>,
        initial_equity: Decimal,
        theory: &Theory,
        symbol: &str,
        bars: &[Candle],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BacktestResult> {
        let mut result = BacktestResult::new(&theory.name, start, end, initial_equity);
        let mut strategy = TheoryStrategy::new(theory.clone());
        let executor = TradeExecutor::new(risk_manager);
        executor
            .execute(&mut result, symbol, bars, &mut strategy, initial_equity)
            .await
            .with_context(|| format!("backtest of '{}' on {} failed", theory.name, symbol))?;

        result.finalize();
        result.validation = Some(BacktestValidator::default().validate(&result.metrics));
        Ok(result)
    }

    /// Run one backtest per parameter set, bounded by `max_concurrency`.
    /// Individual failures are returned alongside the successes so one bad
    /// parameterization does not sink the sweep.
    pub async fn run_parallel_backtests(
        &self,
        theory: &Theory,
        symbol: &str,
        parameter_sets: Vec<ParameterSet>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(ParameterSet, Result<BacktestResult>)>> {
        let bars = Arc::new(self.fetch_bars(symbol, start, end).await?);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut handles = Vec::with_capacity(parameter_sets.len());

        for parameters in parameter_sets {
            let risk_manager = self.risk_manager.clone();
            let initial_equity = self.initial_equity;
            let bars = Arc::clone(&bars);
            let semaphore = Arc::clone(&semaphore);
            let theory = theory.with_parameters(&parameters);
            let symbol = symbol.to_string();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore never closed");
                let outcome = Self::execute_run(
                    risk_manager,
                    initial_equity,
                    &theory,
                    &symbol,
                    &bars,
                    start,
                    end,
                )
                .await;
                (parameters, outcome)
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.await.context("sweep backtest task panicked")?);
        }
        Ok(results)
    }

    /// Exhaustive grid sweep; the set with the highest Sharpe ratio wins.
    pub async fn optimize_parameters(
        &self,
        theory: &Theory,
        symbol: &str,
        ranges: &BTreeMap<String, ParameterRange>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(ParameterSet, BacktestResult)> {
        let sets = generate_parameter_sets(ranges)?;
        info!(
            "Backtester [{}]: sweeping {} parameter sets on {}",
            theory.name,
            sets.len(),
            symbol
        );

        let outcomes = self
            .run_parallel_backtests(theory, symbol, sets, start, end)
            .await?;

        let mut best: Option<(ParameterSet, BacktestResult)> = None;
        for (parameters, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    let better = best
                        .as_ref()
                        .map(|(_, b)| result.metrics.sharpe_ratio > b.metrics.sharpe_ratio)
                        .unwrap_or(true);
                    if better {
                        best = Some((parameters, result));
                    }
                }
                Err(e) => {
                    warn!("Backtester: sweep member failed, excluded: {:#}", e);
                }
            }
        }
        best.ok_or_else(|| anyhow::anyhow!("parameter sweep produced no successful backtest"))
    }

    /// Backtest across all of the theory's symbols sequentially, carrying
    /// equity from one symbol to the next. Symbols that fail are skipped.
    pub async fn run_multi_symbol(
        &self,
        theory: &Theory,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BacktestResult> {
        if theory.symbols.is_empty() {
            return Err(SearchError::NoSymbols.into());
        }

        let mut result = BacktestResult::new(&theory.name, start, end, self.initial_equity);
        let mut equity = self.initial_equity;
        let mut any_succeeded = false;

        for symbol in &theory.symbols {
            let bars = match self.fetch_bars(symbol, start, end).await {
                Ok(bars) => bars,
                Err(e) => {
                    warn!("Backtester [{}]: skipping {}: {:#}", theory.name, symbol, e);
                    continue;
                }
            };
            let mut strategy = TheoryStrategy::new(theory.clone());
            let executor = TradeExecutor::new(self.risk_manager.clone());
            match executor
                .execute(&mut result, symbol, &bars, &mut strategy, equity)
                .await
            {
                Ok(next_equity) => {
                    equity = next_equity;
                    any_succeeded = true;
                }
                Err(e) => {
                    warn!("Backtester [{}]: {} failed: {:#}", theory.name, symbol, e);
                }
            }
        }

        if !any_succeeded {
            anyhow::bail!("no symbol of '{}' produced a backtest", theory.name);
        }

        result.final_equity = equity;
        result.finalize();
        result.validation = Some(BacktestValidator::default().validate(&result.metrics));
        Ok(result)
    }

    async fn fetch_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let bars = self
            .market_data
            .get_historical_bars(symbol, start, end, TIMEFRAME)
            .await
            .map_err(|e| SearchError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: format!("{e:#}"),
            })?;
        if bars.is_empty() {
            return Err(SearchError::InsufficientHistory {
                symbol: symbol.to_string(),
                got: 0,
                need: WARMUP_BARS,
            }
            .into());
        }
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::generator::TheoryGenerator;
    use crate::infrastructure::mock::SimulatedMarketDataService;
    use crate::infrastructure::risk::StandardRiskManager;
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct EmptyMarket;

    #[async_trait]
    impl MarketDataService for EmptyMarket {
        async fn get_historical_bars(
            &self,
            _symbol: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _timeframe: &str,
        ) -> Result<Vec<Candle>> {
            Ok(Vec::new())
        }
    }

    struct FailingMarket;

    #[async_trait]
    impl MarketDataService for FailingMarket {
        async fn get_historical_bars(
            &self,
            _symbol: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _timeframe: &str,
        ) -> Result<Vec<Candle>> {
            anyhow::bail!("connection refused")
        }
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap(),
        )
    }

    fn theory() -> Theory {
        TheoryGenerator::new(7).generate_theory(&["ETH/USD".to_string()])
    }

    fn simulated_backtester() -> Arc<Backtester> {
        let market = Arc::new(SimulatedMarketDataService::new(5));
        let risk = Arc::new(StandardRiskManager::new(dec!(10000)));
        Arc::new(Backtester::new(market, risk, dec!(10000)))
    }

    #[tokio::test]
    async fn run_backtest_produces_finalized_result() {
        let backtester = simulated_backtester();
        let (start, end) = window();

        let result = backtester
            .run_backtest(&theory(), "ETH/USD", start, end)
            .await
            .unwrap();

        assert_eq!(result.initial_equity, dec!(10000));
        assert!(result.validation.is_some());
        assert_eq!(result.metrics.total_trades, result.trades.len());
    }

    #[tokio::test]
    async fn parameter_overlay_matches_a_pre_adjusted_theory() {
        let backtester = simulated_backtester();
        let (start, end) = window();
        let theory = theory();
        let overlay = ParameterSet::from([("stop_loss_pct".to_string(), 0.07)]);

        let overlaid = backtester
            .run_backtest_with_parameters(&theory, &overlay, "ETH/USD", start, end)
            .await
            .unwrap();
        let adjusted = backtester
            .run_backtest(&theory.with_parameters(&overlay), "ETH/USD", start, end)
            .await
            .unwrap();

        assert_eq!(overlaid.trades.len(), adjusted.trades.len());
        assert_eq!(overlaid.final_equity, adjusted.final_equity);
    }

    #[tokio::test]
    async fn empty_history_is_an_error() {
        let risk = Arc::new(StandardRiskManager::new(dec!(10000)));
        let backtester = Backtester::new(Arc::new(EmptyMarket), risk, dec!(10000));
        let (start, end) = window();

        let err = backtester
            .run_backtest(&theory(), "ETH/USD", start, end)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SearchError>(),
            Some(SearchError::InsufficientHistory { got: 0, .. })
        ));
    }

    #[tokio::test]
    async fn provider_failure_maps_to_data_unavailable() {
        let risk = Arc::new(StandardRiskManager::new(dec!(10000)));
        let backtester = Backtester::new(Arc::new(FailingMarket), risk, dec!(10000));
        let (start, end) = window();

        let err = backtester
            .run_backtest(&theory(), "ETH/USD", start, end)
            .await
            .unwrap_err();
        match err.downcast_ref::<SearchError>() {
            Some(SearchError::DataUnavailable { symbol, reason }) => {
                assert_eq!(symbol, "ETH/USD");
                assert!(reason.contains("connection refused"));
            }
            other => panic!("expected DataUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sweep_returns_one_outcome_per_parameter_set() {
        let backtester = simulated_backtester();
        let (start, end) = window();
        let theory = theory();
        let sets = vec![
            ParameterSet::from([("risk_per_trade".to_string(), 0.01)]),
            ParameterSet::from([("risk_per_trade".to_string(), 0.02)]),
            ParameterSet::from([("risk_per_trade".to_string(), 0.03)]),
        ];

        let outcomes = backtester
            .run_parallel_backtests(&theory, "ETH/USD", sets.clone(), start, end)
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        for (parameters, outcome) in &outcomes {
            assert!(sets.contains(parameters));
            assert!(outcome.is_ok());
        }
    }

    #[tokio::test]
    async fn grid_optimization_picks_highest_sharpe() {
        let backtester = simulated_backtester();
        let (start, end) = window();
        let theory = theory();
        let ranges = BTreeMap::from([(
            "stop_loss_pct".to_string(),
            ParameterRange::new(0.03, 0.09, 0.03),
        )]);

        let (best_set, best_result) = backtester
            .optimize_parameters(&theory, "ETH/USD", &ranges, start, end)
            .await
            .unwrap();

        let all = backtester
            .run_parallel_backtests(
                &theory,
                "ETH/USD",
                generate_parameter_sets(&ranges).unwrap(),
                start,
                end,
            )
            .await
            .unwrap();
        for (_, outcome) in all {
            let result = outcome.unwrap();
            assert!(best_result.metrics.sharpe_ratio >= result.metrics.sharpe_ratio);
        }
        assert!(ranges["stop_loss_pct"].min <= best_set["stop_loss_pct"]);
        assert!(best_set["stop_loss_pct"] <= ranges["stop_loss_pct"].max);
    }

    #[tokio::test]
    async fn multi_symbol_carries_equity_and_skips_failures() {
        let backtester = simulated_backtester();
        let (start, end) = window();
        let mut theory = theory();
        theory.symbols = vec!["ETH/USD".to_string(), "BTC/USD".to_string()];

        let result = backtester.run_multi_symbol(&theory, start, end).await.unwrap();

        let booked: Decimal = result.symbol_performance.values().sum();
        assert_eq!(result.final_equity - result.initial_equity, booked);
    }
}
