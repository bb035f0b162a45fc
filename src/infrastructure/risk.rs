//! Fixed-fractional position sizing with per-symbol overrides.

use crate::domain::ports::RiskManagerService;
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Per-symbol risk knobs. Fractions of equity/price, not percent points.
#[derive(Debug, Clone, Copy)]
pub struct RiskParameters {
    pub risk_per_trade: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub max_position_pct: f64,
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            risk_per_trade: 0.02,
            stop_loss_pct: 0.05,
            take_profit_pct: 0.10,
            max_position_pct: 0.25,
        }
    }
}

/// Sizes positions so that a stop-out loses `risk_per_trade` of equity,
/// capped at `max_position_pct` of equity per position.
pub struct StandardRiskManager {
    equity: Decimal,
    parameters: RwLock<HashMap<String, RiskParameters>>,
}

impl StandardRiskManager {
    pub fn new(equity: Decimal) -> Self {
        Self {
            equity,
            parameters: RwLock::new(HashMap::new()),
        }
    }

    async fn parameters_for(&self, symbol: &str) -> RiskParameters {
        self.parameters
            .read()
            .await
            .get(symbol)
            .copied()
            .unwrap_or_default()
    }

    fn to_decimal(value: f64) -> Decimal {
        Decimal::from_f64_retain(value).unwrap_or_default()
    }
}

#[async_trait]
impl RiskManagerService for StandardRiskManager {
    async fn calculate_position_size(&self, symbol: &str, price: Decimal) -> Result<Decimal> {
        if price <= Decimal::ZERO {
            anyhow::bail!("cannot size a position at non-positive price {price}");
        }
        let params = self.parameters_for(symbol).await;
        let stop_distance = price * Self::to_decimal(params.stop_loss_pct);
        if stop_distance.is_zero() {
            return Ok(Decimal::ZERO);
        }

        let risk_amount = self.equity * Self::to_decimal(params.risk_per_trade);
        let quantity = risk_amount / stop_distance;
        let max_quantity = self.equity * Self::to_decimal(params.max_position_pct) / price;
        Ok(quantity.min(max_quantity))
    }

    async fn calculate_stop_loss(
        &self,
        symbol: &str,
        entry_price: Decimal,
        _current_price: Decimal,
    ) -> Result<Decimal> {
        let params = self.parameters_for(symbol).await;
        Ok(entry_price * (Decimal::ONE - Self::to_decimal(params.stop_loss_pct)))
    }

    async fn calculate_take_profit(
        &self,
        symbol: &str,
        entry_price: Decimal,
        _current_price: Decimal,
    ) -> Result<Decimal> {
        let params = self.parameters_for(symbol).await;
        Ok(entry_price * (Decimal::ONE + Self::to_decimal(params.take_profit_pct)))
    }

    /// Merge recognized keys into the symbol's parameters; unknown keys are
    /// ignored with a warning so theory scalars can be passed through as-is.
    async fn update_risk_parameters(
        &self,
        symbol: &str,
        parameters: &BTreeMap<String, f64>,
    ) -> Result<()> {
        let mut guard = self.parameters.write().await;
        let entry = guard.entry(symbol.to_string()).or_default();

        for (key, &value) in parameters {
            if !value.is_finite() || value < 0.0 {
                warn!("RiskManager [{}]: ignoring {} = {}", symbol, key, value);
                continue;
            }
            match key.as_str() {
                "risk_per_trade" => entry.risk_per_trade = value,
                "stop_loss_pct" => entry.stop_loss_pct = value,
                "take_profit_pct" => entry.take_profit_pct = value,
                "max_position_pct" => entry.max_position_pct = value,
                other => debug!("RiskManager [{}]: no such parameter '{}'", symbol, other),
            }
        }
        Ok(())
    }
}
