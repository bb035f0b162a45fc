use crate::domain::performance::metrics::BacktestMetrics;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Minimum-quality gates applied to a completed backtest.
///
/// Boundary values pass: a gate fails only strictly below its minimum (or
/// strictly above the drawdown maximum).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationThresholds {
    pub min_trades: usize,
    pub min_win_rate: f64,
    pub min_sharpe_ratio: f64,
    pub max_drawdown: f64,
}

impl Default for ValidationThresholds {
    fn default() -> Self {
        Self {
            min_trades: 30,
            min_win_rate: 0.40,
            min_sharpe_ratio: 1.0,
            max_drawdown: 0.20,
        }
    }
}

/// Outcome of one gate: a 0/1 flag plus a message on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateCheck {
    pub name: String,
    pub passed: bool,
    pub message: Option<String>,
}

/// Structured pass/fail report. Validation never errors and never aborts a
/// run; failing strategies are simply reported as invalid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub gates: Vec<GateCheck>,
}

impl ValidationReport {
    pub fn messages(&self) -> Vec<&str> {
        self.gates
            .iter()
            .filter_map(|g| g.message.as_deref())
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BacktestValidator {
    thresholds: ValidationThresholds,
}

impl BacktestValidator {
    pub fn new(thresholds: ValidationThresholds) -> Self {
        Self { thresholds }
    }

    /// Apply the four quality gates; `is_valid` is their logical AND.
    pub fn validate(&self, metrics: &BacktestMetrics) -> ValidationReport {
        let t = &self.thresholds;
        let mut gates = Vec::with_capacity(4);

        gates.push(gate(
            "min_trades",
            metrics.total_trades >= t.min_trades,
            || {
                format!(
                    "Insufficient trades: {} < {} required",
                    metrics.total_trades, t.min_trades
                )
            },
        ));
        gates.push(gate("min_win_rate", metrics.win_rate >= t.min_win_rate, || {
            format!(
                "Win rate too low: {:.1}% < {:.1}%",
                metrics.win_rate * 100.0,
                t.min_win_rate * 100.0
            )
        }));
        gates.push(gate(
            "min_sharpe_ratio",
            metrics.sharpe_ratio >= t.min_sharpe_ratio,
            || {
                format!(
                    "Sharpe ratio too low: {:.2} < {:.2}",
                    metrics.sharpe_ratio, t.min_sharpe_ratio
                )
            },
        ));
        gates.push(gate(
            "max_drawdown",
            metrics.max_drawdown <= t.max_drawdown,
            || {
                format!(
                    "Drawdown too high: {:.1}% > {:.1}%",
                    metrics.max_drawdown * 100.0,
                    t.max_drawdown * 100.0
                )
            },
        ));

        let is_valid = gates.iter().all(|g| g.passed);
        if is_valid {
            debug!("Validation passed ({} gates)", gates.len());
        } else {
            warn!(
                "Validation failed: {:?}",
                gates
                    .iter()
                    .filter_map(|g| g.message.as_deref())
                    .collect::<Vec<_>>()
            );
        }

        ValidationReport { is_valid, gates }
    }
}

fn gate(name: &str, passed: bool, message: impl FnOnce() -> String) -> GateCheck {
    GateCheck {
        name: name.to_string(),
        passed,
        message: if passed { None } else { Some(message()) },
    }
}
