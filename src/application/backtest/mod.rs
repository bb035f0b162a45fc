pub mod executor;
pub mod result;
pub mod strategy;

pub use executor::TradeExecutor;
pub use result::BacktestResult;
pub use strategy::{Strategy, TheoryStrategy};
