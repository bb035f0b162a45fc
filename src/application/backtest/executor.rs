use crate::application::backtest::result::BacktestResult;
use crate::application::backtest::strategy::Strategy;
use crate::domain::ports::RiskManagerService;
use crate::domain::types::{Candle, Trade, TradeDirection};
use anyhow::Result;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

/// Bars required before the first decision is evaluated. Bars inside the
/// warm-up window are never traded.
pub const WARMUP_BARS: usize = 50;

/// Bar-by-bar trade simulation over one symbol's historical series.
///
/// Per-symbol state machine: Flat until the strategy signals entry, then
/// InPosition until an exit signal or a stop/target hit. Trades accumulate
/// into the shared `BacktestResult`; strategy and risk-manager errors
/// propagate and abort the run for this symbol.
pub struct TradeExecutor {
    risk_manager: Arc<dyn RiskManagerService>,
}

impl TradeExecutor {
    pub fn new(risk_manager: Arc<dyn RiskManagerService>) -> Self {
        Self { risk_manager }
    }

    /// Simulate trading over `bars` (ascending by timestamp) and return the
    /// final equity. Equity changes by realized P&L on close only.
    pub async fn execute(
        &self,
        result: &mut BacktestResult,
        symbol: &str,
        bars: &[Candle],
        strategy: &mut dyn Strategy,
        initial_equity: Decimal,
    ) -> Result<Decimal> {
        if bars.len() < WARMUP_BARS {
            warn!(
                "TradeExecutor [{}]: {} bars < {} warm-up, skipping",
                symbol,
                bars.len(),
                WARMUP_BARS
            );
            return Ok(initial_equity);
        }

        let mut equity = initial_equity;
        let mut position: Option<Trade> = None;

        for idx in WARMUP_BARS..bars.len() {
            let bar = &bars[idx];
            let close = bar.close;

            match position.take() {
                None => {
                    if strategy.should_enter(bars, idx)? {
                        // Entry price is the current close; the stop/target
                        // calculators receive it as both entry and reference
                        // price, so there is no look-ahead.
                        let quantity = self
                            .risk_manager
                            .calculate_position_size(symbol, close)
                            .await?;
                        if quantity <= Decimal::ZERO {
                            debug!("TradeExecutor [{}]: zero quantity, entry skipped", symbol);
                            continue;
                        }
                        let stop_loss = self
                            .risk_manager
                            .calculate_stop_loss(symbol, close, close)
                            .await?;
                        let take_profit = self
                            .risk_manager
                            .calculate_take_profit(symbol, close, close)
                            .await?;

                        position = Some(Trade::open(
                            symbol,
                            TradeDirection::Long,
                            close,
                            quantity,
                            Some(stop_loss),
                            Some(take_profit),
                            bar.timestamp,
                        ));
                    }
                }
                Some(mut trade) => {
                    let stop_hit = match (trade.direction, trade.stop_loss) {
                        (TradeDirection::Long, Some(stop)) => close <= stop,
                        (TradeDirection::Short, Some(stop)) => close >= stop,
                        _ => false,
                    };
                    let target_hit = match (trade.direction, trade.take_profit) {
                        (TradeDirection::Long, Some(target)) => close >= target,
                        (TradeDirection::Short, Some(target)) => close <= target,
                        _ => false,
                    };

                    if stop_hit || target_hit || strategy.should_exit(bars, idx)? {
                        trade.close(close, bar.timestamp);
                        equity += trade.pnl;
                        *result
                            .symbol_performance
                            .entry(symbol.to_string())
                            .or_insert(Decimal::ZERO) += trade.pnl;
                        result.trades.push(trade);
                    } else {
                        position = Some(trade);
                    }
                }
            }
        }

        // Position still open at the end of data closes at the final bar.
        if let Some(mut trade) = position {
            let last = bars.last().expect("bars verified non-empty");
            trade.close(last.close, last.timestamp);
            equity += trade.pnl;
            *result
                .symbol_performance
                .entry(symbol.to_string())
                .or_insert(Decimal::ZERO) += trade.pnl;
            result.trades.push(trade);
        }

        result.final_equity = equity;
        Ok(equity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    /// Scripted strategy: enters/exits at fixed bar indices.
    struct Scripted {
        enter_at: Vec<usize>,
        exit_at: Vec<usize>,
    }

    impl Strategy for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        fn should_enter(&mut self, _bars: &[Candle], idx: usize) -> Result<bool> {
            Ok(self.enter_at.contains(&idx))
        }
        fn should_exit(&mut self, _bars: &[Candle], idx: usize) -> Result<bool> {
            Ok(self.exit_at.contains(&idx))
        }
    }

    /// Fixed-quantity risk manager with configurable stop/target offsets.
    struct FixedRisk {
        quantity: Decimal,
        stop_pct: Decimal,
        target_pct: Decimal,
    }

    impl FixedRisk {
        fn new() -> Self {
            Self {
                quantity: dec!(1),
                stop_pct: dec!(0.10),
                target_pct: dec!(0.20),
            }
        }
    }

    #[async_trait]
    impl RiskManagerService for FixedRisk {
        async fn calculate_position_size(&self, _symbol: &str, _price: Decimal) -> Result<Decimal> {
            Ok(self.quantity)
        }
        async fn calculate_stop_loss(
            &self,
            _symbol: &str,
            entry_price: Decimal,
            _current_price: Decimal,
        ) -> Result<Decimal> {
            Ok(entry_price * (Decimal::ONE - self.stop_pct))
        }
        async fn calculate_take_profit(
            &self,
            _symbol: &str,
            entry_price: Decimal,
            _current_price: Decimal,
        ) -> Result<Decimal> {
            Ok(entry_price * (Decimal::ONE + self.target_pct))
        }
        async fn update_risk_parameters(
            &self,
            _symbol: &str,
            _parameters: &BTreeMap<String, f64>,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn flat_bars(count: usize, close: f64) -> Vec<Candle> {
        bars_from(&vec![close; count])
    }

    fn bars_from(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle {
                symbol: "TEST".to_string(),
                open: Decimal::from_f64_retain(c).unwrap_or_default(),
                high: Decimal::from_f64_retain(c + 0.5).unwrap_or_default(),
                low: Decimal::from_f64_retain(c - 0.5).unwrap_or_default(),
                close: Decimal::from_f64_retain(c).unwrap_or_default(),
                volume: dec!(100),
                timestamp: i as i64 * 86400,
            })
            .collect()
    }

    fn empty_result() -> BacktestResult {
        BacktestResult::new("t", Utc::now(), Utc::now(), dec!(10000))
    }

    #[tokio::test]
    async fn fewer_bars_than_warmup_returns_equity_unchanged() {
        let executor = TradeExecutor::new(Arc::new(FixedRisk::new()));
        let mut result = empty_result();
        let mut strategy = Scripted {
            enter_at: (0..49).collect(),
            exit_at: vec![],
        };
        let bars = flat_bars(WARMUP_BARS - 1, 100.0);

        let equity = executor
            .execute(&mut result, "TEST", &bars, &mut strategy, dec!(10000))
            .await
            .unwrap();

        assert_eq!(equity, dec!(10000));
        assert!(result.trades.is_empty());
    }

    #[tokio::test]
    async fn entry_then_exit_signal_books_realized_pnl() {
        let executor = TradeExecutor::new(Arc::new(FixedRisk::new()));
        let mut result = empty_result();
        // Flat 100s, entry at idx 55 (close 100), exit signal at idx 60 (close 105).
        let mut closes = vec![100.0; 70];
        for c in closes.iter_mut().skip(58) {
            *c = 105.0;
        }
        let bars = bars_from(&closes);
        let mut strategy = Scripted {
            enter_at: vec![55],
            exit_at: vec![60],
        };

        let equity = executor
            .execute(&mut result, "TEST", &bars, &mut strategy, dec!(10000))
            .await
            .unwrap();

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.entry_price, dec!(100));
        assert_eq!(trade.exit_price, Some(dec!(105)));
        assert_eq!(trade.pnl, dec!(5));
        assert_eq!(equity, dec!(10005));
        assert_eq!(result.symbol_performance["TEST"], dec!(5));
    }

    #[tokio::test]
    async fn stop_loss_exit_without_exit_signal() {
        let executor = TradeExecutor::new(Arc::new(FixedRisk::new()));
        let mut result = empty_result();
        // Entry at idx 55 at 100; price collapses to 85 (< stop 90) at idx 60.
        let mut closes = vec![100.0; 70];
        for c in closes.iter_mut().skip(60) {
            *c = 85.0;
        }
        let bars = bars_from(&closes);
        let mut strategy = Scripted {
            enter_at: vec![55],
            exit_at: vec![],
        };

        executor
            .execute(&mut result, "TEST", &bars, &mut strategy, dec!(10000))
            .await
            .unwrap();

        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].exit_price, Some(dec!(85)));
        assert_eq!(result.trades[0].pnl, dec!(-15));
    }

    #[tokio::test]
    async fn take_profit_exit_closes_at_current_close() {
        let executor = TradeExecutor::new(Arc::new(FixedRisk::new()));
        let mut result = empty_result();
        // Target = 120; price jumps to 125 at idx 58.
        let mut closes = vec![100.0; 70];
        for c in closes.iter_mut().skip(58) {
            *c = 125.0;
        }
        let bars = bars_from(&closes);
        let mut strategy = Scripted {
            enter_at: vec![55],
            exit_at: vec![],
        };

        executor
            .execute(&mut result, "TEST", &bars, &mut strategy, dec!(10000))
            .await
            .unwrap();

        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].pnl, dec!(25));
    }

    #[tokio::test]
    async fn open_position_closes_at_end_of_data() {
        let executor = TradeExecutor::new(Arc::new(FixedRisk::new()));
        let mut result = empty_result();
        let bars = flat_bars(60, 100.0);
        let mut strategy = Scripted {
            enter_at: vec![55],
            exit_at: vec![],
        };

        executor
            .execute(&mut result, "TEST", &bars, &mut strategy, dec!(10000))
            .await
            .unwrap();

        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].exit_timestamp, Some(59 * 86400));
        assert_eq!(result.trades[0].pnl, Decimal::ZERO);
    }
}
