pub mod backtest;
pub mod backtester;
pub mod generator;
pub mod optimization;
pub mod search;
