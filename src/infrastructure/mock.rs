//! Simulated market data and in-memory persistence for search runs and
//! tests. No network, fully deterministic per seed.

use crate::application::backtest::result::BacktestResult;
use crate::application::optimization::genetic::OptimizationResult;
use crate::domain::ports::{MarketDataService, ResultSink};
use crate::domain::types::Candle;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tokio::sync::Mutex;
use tracing::debug;

/// Deterministic daily-bar generator: a seeded random walk with a mild
/// sinusoidal cycle layered on top so trend-following signals have
/// something to find.
///
/// The same (seed, symbol, date range) always produces the same series.
pub struct SimulatedMarketDataService {
    seed: u64,
}

impl SimulatedMarketDataService {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    fn symbol_seed(&self, symbol: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        symbol.hash(&mut hasher);
        self.seed.wrapping_add(hasher.finish())
    }
}

#[async_trait]
impl MarketDataService for SimulatedMarketDataService {
    async fn get_historical_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _timeframe: &str,
    ) -> Result<Vec<Candle>> {
        let days = (end - start).num_days().max(0) as usize;
        let mut rng = StdRng::seed_from_u64(self.symbol_seed(symbol));
        let mut bars = Vec::with_capacity(days);
        let mut price: f64 = rng.random_range(50.0..500.0);

        for day in 0..days {
            let drift: f64 = rng.random_range(-0.02..0.02);
            let cycle = (day as f64 / 20.0).sin() * 0.005;
            price = (price * (1.0 + drift + cycle)).max(1.0);

            let open = price * (1.0 + rng.random_range(-0.005..0.005));
            let spread = price * rng.random_range(0.0..0.01);
            let high = price.max(open) + spread;
            let low = (price.min(open) - spread).max(0.5);

            bars.push(Candle {
                symbol: symbol.to_string(),
                open: Decimal::from_f64_retain(open).unwrap_or_default(),
                high: Decimal::from_f64_retain(high).unwrap_or_default(),
                low: Decimal::from_f64_retain(low).unwrap_or_default(),
                close: Decimal::from_f64_retain(price).unwrap_or_default(),
                volume: dec!(1000) + Decimal::from(rng.random_range(0..9000u32)),
                timestamp: (start + Duration::days(day as i64)).timestamp(),
            });
        }

        debug!("Simulated [{}]: {} daily bars", symbol, bars.len());
        Ok(bars)
    }
}

/// Keeps saved results in memory. Used by the search tests and the CLI's
/// dry-run mode.
#[derive(Default)]
pub struct InMemoryResultSink {
    backtests: Mutex<Vec<BacktestResult>>,
    optimizations: Mutex<Vec<OptimizationResult>>,
}

impl InMemoryResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn backtests(&self) -> Vec<BacktestResult> {
        self.backtests.lock().await.clone()
    }

    pub async fn optimizations(&self) -> Vec<OptimizationResult> {
        self.optimizations.lock().await.clone()
    }
}

#[async_trait]
impl ResultSink for InMemoryResultSink {
    async fn save_backtest(&self, result: &BacktestResult) -> Result<()> {
        self.backtests.lock().await.push(result.clone());
        Ok(())
    }

    async fn save_optimization(&self, result: &OptimizationResult) -> Result<()> {
        self.optimizations.lock().await.push(result.clone());
        Ok(())
    }
}
