use crate::domain::performance::{BacktestMetrics, ValidationReport};
use crate::domain::types::Trade;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Output of one backtest run over one symbol/date range/parameter set.
///
/// Trades accumulate while the executor runs; metrics are computed once all
/// trades are known and the result is not modified afterwards, apart from the
/// validator's report being attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub theory_name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub initial_equity: Decimal,
    pub final_equity: Decimal,
    pub trades: Vec<Trade>,
    /// Realized P&L per symbol.
    pub symbol_performance: BTreeMap<String, Decimal>,
    pub metrics: BacktestMetrics,
    pub validation: Option<ValidationReport>,
}

impl BacktestResult {
    pub fn new(
        theory_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        initial_equity: Decimal,
    ) -> Self {
        Self {
            theory_name: theory_name.to_string(),
            start,
            end,
            initial_equity,
            final_equity: initial_equity,
            trades: Vec::new(),
            symbol_performance: BTreeMap::new(),
            metrics: BacktestMetrics::default(),
            validation: None,
        }
    }

    /// Recompute metrics from the accumulated trade list.
    pub fn finalize(&mut self) {
        self.metrics = BacktestMetrics::calculate(&self.trades);
    }

    /// Fractional return over the run, as f64 for fitness scoring.
    pub fn normalized_return(&self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        if self.initial_equity.is_zero() {
            return 0.0;
        }
        ((self.final_equity - self.initial_equity) / self.initial_equity)
            .to_f64()
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn normalized_return_handles_zero_equity() {
        let mut result = BacktestResult::new("t", Utc::now(), Utc::now(), Decimal::ZERO);
        assert_eq!(result.normalized_return(), 0.0);

        result.initial_equity = dec!(10000);
        result.final_equity = dec!(11000);
        assert!((result.normalized_return() - 0.1).abs() < 1e-10);
    }
}
