use crate::domain::indicators::IndicatorCache;
use crate::domain::signal_eval::evaluate_signal;
use crate::domain::theory::Theory;
use crate::domain::types::Candle;
use anyhow::Result;

/// Entry/exit decision interface consumed by the trade executor.
///
/// Implementations see the full bar window and the index of the bar being
/// decided; values past `idx` must not influence the decision.
pub trait Strategy: Send {
    fn name(&self) -> &str;
    fn should_enter(&mut self, bars: &[Candle], idx: usize) -> Result<bool>;
    fn should_exit(&mut self, bars: &[Candle], idx: usize) -> Result<bool>;
}

/// Evaluates a theory's entry and exit signals over historical bars.
///
/// Indicator series are computed once per bar window through the cache and
/// reused for every decision in the run.
pub struct TheoryStrategy {
    theory: Theory,
    cache: IndicatorCache,
}

impl TheoryStrategy {
    pub fn new(theory: Theory) -> Self {
        Self {
            theory,
            cache: IndicatorCache::new(),
        }
    }

    pub fn theory(&self) -> &Theory {
        &self.theory
    }
}

impl Strategy for TheoryStrategy {
    fn name(&self) -> &str {
        &self.theory.name
    }

    fn should_enter(&mut self, bars: &[Candle], idx: usize) -> Result<bool> {
        self.cache.ensure(&self.theory.indicators, bars);
        Ok(evaluate_signal(&self.theory.entry_signal, bars, idx, &self.cache))
    }

    fn should_exit(&mut self, bars: &[Candle], idx: usize) -> Result<bool> {
        self.cache.ensure(&self.theory.indicators, bars);
        Ok(evaluate_signal(&self.theory.exit_signal, bars, idx, &self.cache))
    }
}
