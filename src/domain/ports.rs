use crate::application::backtest::result::BacktestResult;
use crate::application::optimization::genetic::OptimizationResult;
use crate::domain::types::Candle;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Historical market data provider.
///
/// Implementations must return bars ordered ascending by timestamp. Gap
/// handling is the caller's responsibility.
#[async_trait]
pub trait MarketDataService: Send + Sync {
    async fn get_historical_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        timeframe: &str,
    ) -> Result<Vec<Candle>>;
}

/// Position sizing and stop/target calculation.
///
/// The sizing calculators are pure queries; implementations must tolerate
/// concurrent calls from parallel backtests.
#[async_trait]
pub trait RiskManagerService: Send + Sync {
    async fn calculate_position_size(&self, symbol: &str, price: Decimal) -> Result<Decimal>;
    async fn calculate_stop_loss(
        &self,
        symbol: &str,
        entry_price: Decimal,
        current_price: Decimal,
    ) -> Result<Decimal>;
    async fn calculate_take_profit(
        &self,
        symbol: &str,
        entry_price: Decimal,
        current_price: Decimal,
    ) -> Result<Decimal>;
    async fn update_risk_parameters(
        &self,
        symbol: &str,
        parameters: &BTreeMap<String, f64>,
    ) -> Result<()>;
}

/// Persistence for completed runs. The engine does not depend on any schema.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn save_backtest(&self, result: &BacktestResult) -> Result<()>;
    async fn save_optimization(&self, result: &OptimizationResult) -> Result<()>;
}
