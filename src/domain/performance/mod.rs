pub mod metrics;
pub mod validator;

pub use metrics::BacktestMetrics;
pub use validator::{BacktestValidator, GateCheck, ValidationReport, ValidationThresholds};
