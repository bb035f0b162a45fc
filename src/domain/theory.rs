use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Indicator families a theory may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndicatorKind {
    Sma,
    Ema,
    Rsi,
    Macd,
    Bollinger,
    Atr,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 6] = [
        IndicatorKind::Sma,
        IndicatorKind::Ema,
        IndicatorKind::Rsi,
        IndicatorKind::Macd,
        IndicatorKind::Bollinger,
        IndicatorKind::Atr,
    ];
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndicatorKind::Sma => "SMA",
            IndicatorKind::Ema => "EMA",
            IndicatorKind::Rsi => "RSI",
            IndicatorKind::Macd => "MACD",
            IndicatorKind::Bollinger => "BB",
            IndicatorKind::Atr => "ATR",
        };
        write!(f, "{}", s)
    }
}

/// A named, parameterized indicator instance owned by a theory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSpec {
    pub name: String,
    pub kind: IndicatorKind,
    pub parameters: BTreeMap<String, f64>,
}

impl IndicatorSpec {
    pub fn new(name: impl Into<String>, kind: IndicatorKind) -> Self {
        Self {
            name: name.into(),
            kind,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: f64) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }

    /// Read a parameter with a fallback default.
    pub fn param(&self, key: &str, default: f64) -> f64 {
        self.parameters.get(key).copied().unwrap_or(default)
    }

    /// Read a parameter as a period, rounded and clamped to at least 2.
    pub fn period(&self, key: &str, default: f64) -> usize {
        (self.param(key, default).round().max(2.0)) as usize
    }
}

/// Raw price fields usable as condition operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
}

impl PriceField {
    pub const ALL: [PriceField; 4] = [
        PriceField::Open,
        PriceField::High,
        PriceField::Low,
        PriceField::Close,
    ];
}

impl fmt::Display for PriceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PriceField::Open => "open",
            PriceField::High => "high",
            PriceField::Low => "low",
            PriceField::Close => "close",
        };
        write!(f, "{}", s)
    }
}

/// Either side of a condition: an indicator by name or a raw price field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Indicator(String),
    Price(PriceField),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Indicator(name) => write!(f, "{}", name),
            Operand::Price(field) => write!(f, "{}", field),
        }
    }
}

/// Comparison applied between the two operands of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionKind {
    CrossOver,
    CrossUnder,
    GreaterThan,
    LessThan,
    Equals,
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConditionKind::CrossOver => "crosses_over",
            ConditionKind::CrossUnder => "crosses_under",
            ConditionKind::GreaterThan => ">",
            ConditionKind::LessThan => "<",
            ConditionKind::Equals => "==",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub left: Operand,
    pub right: Operand,
    pub kind: ConditionKind,
}

impl Condition {
    pub fn expression(&self) -> String {
        format!("{} {} {}", self.left, self.kind, self.right)
    }
}

/// A named boolean expression over a set of conditions.
///
/// The textual expression is always the conjunction of the condition
/// expressions joined with " AND ".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    pub conditions: Vec<Condition>,
}

impl Signal {
    pub fn expression(&self) -> String {
        self.conditions
            .iter()
            .map(|c| c.expression())
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

/// A candidate strategy: symbols, indicators, entry/exit signals and scalar
/// search/risk hyperparameters.
///
/// Theories are value-like. The optimizer never mutates a theory in place;
/// mutation and crossover always produce fresh instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theory {
    pub name: String,
    pub symbols: Vec<String>,
    pub indicators: Vec<IndicatorSpec>,
    pub entry_signal: Signal,
    pub exit_signal: Signal,
    pub parameters: BTreeMap<String, f64>,
}

impl Theory {
    /// True when the theory can be evaluated at all: at least one indicator
    /// and both signals carry at least one condition.
    pub fn is_structurally_valid(&self) -> bool {
        !self.indicators.is_empty()
            && !self.entry_signal.conditions.is_empty()
            && !self.exit_signal.conditions.is_empty()
    }

    /// Apply a flat parameter set to a copy of this theory.
    ///
    /// Keys of the form `indicator.param` address a named indicator's
    /// parameter; bare keys address the scalar parameter map.
    pub fn with_parameters(&self, parameters: &BTreeMap<String, f64>) -> Theory {
        let mut out = self.clone();
        for (key, value) in parameters {
            if let Some((ind_name, param)) = key.split_once('.') {
                if let Some(spec) = out.indicators.iter_mut().find(|i| i.name == ind_name) {
                    spec.parameters.insert(param.to_string(), *value);
                }
            } else {
                out.parameters.insert(key.clone(), *value);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_theory() -> Theory {
        Theory {
            name: "t".to_string(),
            symbols: vec!["BTC/USD".to_string()],
            indicators: vec![
                IndicatorSpec::new("sma_1", IndicatorKind::Sma).with_param("period", 20.0),
            ],
            entry_signal: Signal {
                name: "entry".to_string(),
                conditions: vec![Condition {
                    left: Operand::Price(PriceField::Close),
                    right: Operand::Indicator("sma_1".to_string()),
                    kind: ConditionKind::CrossOver,
                }],
            },
            exit_signal: Signal {
                name: "exit".to_string(),
                conditions: vec![
                    Condition {
                        left: Operand::Price(PriceField::Close),
                        right: Operand::Indicator("sma_1".to_string()),
                        kind: ConditionKind::CrossUnder,
                    },
                    Condition {
                        left: Operand::Indicator("sma_1".to_string()),
                        right: Operand::Price(PriceField::High),
                        kind: ConditionKind::GreaterThan,
                    },
                ],
            },
            parameters: BTreeMap::from([("risk_per_trade".to_string(), 0.02)]),
        }
    }

    #[test]
    fn signal_expression_joins_conditions_with_and() {
        let theory = sample_theory();
        assert_eq!(
            theory.exit_signal.expression(),
            "close crosses_under sma_1 AND sma_1 > high"
        );
    }

    #[test]
    fn with_parameters_addresses_indicators_and_scalars() {
        let theory = sample_theory();
        let params = BTreeMap::from([
            ("sma_1.period".to_string(), 33.0),
            ("risk_per_trade".to_string(), 0.05),
        ]);
        let applied = theory.with_parameters(&params);

        assert_eq!(applied.indicators[0].param("period", 0.0), 33.0);
        assert_eq!(applied.parameters["risk_per_trade"], 0.05);
        // The original theory is untouched.
        assert_eq!(theory.indicators[0].param("period", 0.0), 20.0);
    }

    #[test]
    fn period_is_rounded_and_clamped() {
        let spec = IndicatorSpec::new("x", IndicatorKind::Rsi).with_param("period", 0.4);
        assert_eq!(spec.period("period", 14.0), 2);
        let spec = IndicatorSpec::new("x", IndicatorKind::Rsi).with_param("period", 14.6);
        assert_eq!(spec.period("period", 14.0), 15);
    }
}
