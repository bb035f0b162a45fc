use thiserror::Error;

/// Errors raised by the strategy search and backtesting engine.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Insufficient history for {symbol}: {got} bars < {need} required")]
    InsufficientHistory { symbol: String, got: usize, need: usize },

    #[error("Invalid parameter range for '{name}': {reason}")]
    InvalidParameterRange { name: String, reason: String },

    #[error("Population size must be >= 1")]
    EmptyPopulation,

    #[error("Crossover parents have misaligned indicator lists: {left} vs {right}")]
    MisalignedParents { left: usize, right: usize },

    #[error("Theory has no symbols to backtest")]
    NoSymbols,

    #[error("Market data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },
}
