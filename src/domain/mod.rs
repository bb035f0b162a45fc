pub mod errors;
pub mod indicators;
pub mod performance;
pub mod ports;
pub mod signal_eval;
pub mod theory;
pub mod types;
