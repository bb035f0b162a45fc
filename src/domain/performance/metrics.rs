use crate::domain::types::Trade;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Reference equity used for drawdown tracking and per-trade returns.
const EQUITY_BASE: f64 = 10_000.0;

/// Annual risk-free rate used in the Sharpe numerator. Deliberately not
/// period-adjusted; per-trade returns are compared against it as-is.
const RISK_FREE_RATE: f64 = 0.02;

/// Aggregate performance statistics derived from a completed trade list.
///
/// Every ratio resolves to 0 when its denominator is 0; no metric ever
/// divides by zero or panics on an empty trade list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Fraction in [0, 1].
    pub win_rate: f64,

    pub gross_profit: Decimal,
    /// Reported as a negative sum, as accumulated.
    pub gross_loss: Decimal,
    pub total_pnl: Decimal,
    pub profit_factor: f64,

    pub average_win: Decimal,
    /// Absolute value of the mean losing P&L.
    pub average_loss: Decimal,
    pub largest_win: Decimal,
    /// Absolute value of the worst losing P&L.
    pub largest_loss: Decimal,

    /// Peak-to-trough fraction in [0, 1], over trades ordered by open time.
    pub max_drawdown: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,

    pub average_holding_period_days: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
}

impl BacktestMetrics {
    /// Calculate all metrics from a trade list. Pure and idempotent: the same
    /// trades always produce the same metrics.
    pub fn calculate(trades: &[Trade]) -> Self {
        let total_trades = trades.len();
        if total_trades == 0 {
            return Self::default();
        }

        // Drawdown and streaks are defined over the open-time ordering.
        let mut ordered: Vec<&Trade> = trades.iter().collect();
        ordered.sort_by_key(|t| t.entry_timestamp);

        let winning: Vec<&Trade> = trades.iter().filter(|t| t.pnl > Decimal::ZERO).collect();
        let losing: Vec<&Trade> = trades.iter().filter(|t| t.pnl <= Decimal::ZERO).collect();
        let num_wins = winning.len();
        let num_losses = losing.len();

        let win_rate = num_wins as f64 / total_trades as f64;

        let gross_profit: Decimal = winning.iter().map(|t| t.pnl).sum();
        let gross_loss: Decimal = losing.iter().map(|t| t.pnl).sum();
        let total_pnl: Decimal = trades.iter().map(|t| t.pnl).sum();

        let profit_factor = if gross_loss.is_zero() {
            0.0
        } else {
            gross_profit.to_f64().unwrap_or(0.0) / gross_loss.abs().to_f64().unwrap_or(1.0)
        };

        let average_win = if num_wins > 0 {
            gross_profit / Decimal::from(num_wins)
        } else {
            Decimal::ZERO
        };
        let average_loss = if num_losses > 0 {
            (gross_loss / Decimal::from(num_losses)).abs()
        } else {
            Decimal::ZERO
        };
        let largest_win = winning.iter().map(|t| t.pnl).max().unwrap_or(Decimal::ZERO);
        let largest_loss = losing
            .iter()
            .map(|t| t.pnl)
            .min()
            .unwrap_or(Decimal::ZERO)
            .abs();

        let max_drawdown = Self::calculate_max_drawdown(&ordered);
        let (max_consecutive_wins, max_consecutive_losses) =
            Self::calculate_consecutive_streaks(&ordered);
        let average_holding_period_days = Self::calculate_average_holding_days(trades);

        let returns: Vec<f64> = trades
            .iter()
            .map(|t| t.pnl.to_f64().unwrap_or(0.0) / EQUITY_BASE)
            .collect();
        let sharpe_ratio = Self::calculate_sharpe(&returns);
        let sortino_ratio = Self::calculate_sortino(&returns);

        Self {
            total_trades,
            winning_trades: num_wins,
            losing_trades: num_losses,
            win_rate,
            gross_profit,
            gross_loss,
            total_pnl,
            profit_factor,
            average_win,
            average_loss,
            largest_win,
            largest_loss,
            max_drawdown,
            max_consecutive_wins,
            max_consecutive_losses,
            average_holding_period_days,
            sharpe_ratio,
            sortino_ratio,
        }
    }

    fn calculate_max_drawdown(ordered: &[&Trade]) -> f64 {
        let mut equity = EQUITY_BASE;
        let mut peak = EQUITY_BASE;
        let mut max_dd: f64 = 0.0;

        for trade in ordered {
            equity += trade.pnl.to_f64().unwrap_or(0.0);
            if equity > peak {
                peak = equity;
            }
            if peak > 0.0 {
                max_dd = max_dd.max((peak - equity) / peak);
            }
        }
        max_dd
    }

    fn calculate_consecutive_streaks(ordered: &[&Trade]) -> (usize, usize) {
        let mut max_wins = 0;
        let mut max_losses = 0;
        let mut current_wins = 0;
        let mut current_losses = 0;

        for trade in ordered {
            if trade.pnl > Decimal::ZERO {
                current_wins += 1;
                current_losses = 0;
                max_wins = max_wins.max(current_wins);
            } else {
                current_losses += 1;
                current_wins = 0;
                max_losses = max_losses.max(current_losses);
            }
        }
        (max_wins, max_losses)
    }

    /// Mean of (close - open) in days, over trades that actually closed.
    fn calculate_average_holding_days(trades: &[Trade]) -> f64 {
        let closed: Vec<i64> = trades
            .iter()
            .filter_map(|t| t.exit_timestamp.map(|exit| exit - t.entry_timestamp))
            .collect();
        if closed.is_empty() {
            return 0.0;
        }
        let total_secs: i64 = closed.iter().sum();
        total_secs as f64 / 86_400.0 / closed.len() as f64
    }

    fn calculate_sharpe(returns: &[f64]) -> f64 {
        let std_dev = Self::std_dev(returns);
        if std_dev == 0.0 {
            return 0.0;
        }
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        (mean - RISK_FREE_RATE) / std_dev
    }

    fn calculate_sortino(returns: &[f64]) -> f64 {
        let downside: Vec<f64> = returns.iter().filter(|r| **r < 0.0).copied().collect();
        let downside_dev = Self::std_dev(&downside);
        if downside_dev == 0.0 {
            return 0.0;
        }
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        (mean - RISK_FREE_RATE) / downside_dev
    }

    fn std_dev(values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        variance.sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{TradeDirection, TradeStatus};
    use rust_decimal_macros::dec;

    fn trade(pnl: Decimal, entry_ts: i64, exit_ts: i64) -> Trade {
        Trade {
            id: format!("t-{}", entry_ts),
            symbol: "BTC/USD".to_string(),
            direction: TradeDirection::Long,
            status: TradeStatus::Closed,
            entry_price: dec!(100),
            exit_price: Some(dec!(100) + pnl),
            quantity: dec!(1),
            stop_loss: None,
            take_profit: None,
            pnl,
            entry_timestamp: entry_ts,
            exit_timestamp: Some(exit_ts),
        }
    }

    #[test]
    fn empty_trade_list_yields_zeroed_metrics() {
        let metrics = BacktestMetrics::calculate(&[]);
        assert_eq!(metrics.total_trades, 0);
        assert_eq!(metrics.win_rate, 0.0);
        assert_eq!(metrics.profit_factor, 0.0);
        assert_eq!(metrics.sharpe_ratio, 0.0);
        assert_eq!(metrics.sortino_ratio, 0.0);
        assert_eq!(metrics.max_drawdown, 0.0);
    }

    #[test]
    fn totals_identity_and_bounds() {
        let trades = vec![
            trade(dec!(100), 0, 86400),
            trade(dec!(-50), 86400, 172800),
            trade(dec!(0), 172800, 259200),
            trade(dec!(75), 259200, 345600),
        ];
        let metrics = BacktestMetrics::calculate(&trades);

        assert_eq!(
            metrics.total_trades,
            metrics.winning_trades + metrics.losing_trades
        );
        assert!(metrics.win_rate >= 0.0 && metrics.win_rate <= 1.0);
        assert!(metrics.max_drawdown >= 0.0);
        // Zero-P&L trade counts as a loss.
        assert_eq!(metrics.winning_trades, 2);
        assert_eq!(metrics.losing_trades, 2);
    }

    #[test]
    fn profit_factor_and_averages() {
        let trades = vec![
            trade(dec!(100), 0, 86400),
            trade(dec!(200), 86400, 172800),
            trade(dec!(-100), 172800, 259200),
        ];
        let metrics = BacktestMetrics::calculate(&trades);

        assert_eq!(metrics.gross_profit, dec!(300));
        assert_eq!(metrics.gross_loss, dec!(-100));
        assert!((metrics.profit_factor - 3.0).abs() < 1e-10);
        assert_eq!(metrics.average_win, dec!(150));
        assert_eq!(metrics.average_loss, dec!(100));
        assert_eq!(metrics.largest_win, dec!(200));
        assert_eq!(metrics.largest_loss, dec!(100));
    }

    #[test]
    fn profit_factor_is_zero_without_losses() {
        let trades = vec![trade(dec!(100), 0, 86400)];
        let metrics = BacktestMetrics::calculate(&trades);
        assert_eq!(metrics.profit_factor, 0.0);
    }

    #[test]
    fn drawdown_tracks_peak_in_open_time_order() {
        // Delivered out of order on purpose; ordering is by entry timestamp.
        let trades = vec![
            trade(dec!(-1000), 86400, 172800),
            trade(dec!(1000), 0, 86400),
            trade(dec!(500), 172800, 259200),
        ];
        let metrics = BacktestMetrics::calculate(&trades);
        // Equity: 10000 -> 11000 (peak) -> 10000 -> 10500; dd = 1000/11000.
        assert!((metrics.max_drawdown - 1000.0 / 11000.0).abs() < 1e-10);
    }

    #[test]
    fn consecutive_streaks_count_zero_pnl_as_loss() {
        let trades = vec![
            trade(dec!(10), 0, 1),
            trade(dec!(10), 100, 101),
            trade(dec!(0), 200, 201),
            trade(dec!(-10), 300, 301),
            trade(dec!(10), 400, 401),
        ];
        let metrics = BacktestMetrics::calculate(&trades);
        assert_eq!(metrics.max_consecutive_wins, 2);
        assert_eq!(metrics.max_consecutive_losses, 2);
    }

    #[test]
    fn holding_period_skips_open_trades() {
        let mut open_trade = trade(dec!(0), 0, 0);
        open_trade.exit_timestamp = None;
        open_trade.status = TradeStatus::Open;
        let trades = vec![trade(dec!(10), 0, 2 * 86400), open_trade];

        let metrics = BacktestMetrics::calculate(&trades);
        assert!((metrics.average_holding_period_days - 2.0).abs() < 1e-10);
    }

    #[test]
    fn calculate_is_idempotent() {
        let trades = vec![
            trade(dec!(120), 0, 86400),
            trade(dec!(-60), 86400, 172800),
            trade(dec!(90), 172800, 259200),
        ];
        let first = BacktestMetrics::calculate(&trades);
        let second = BacktestMetrics::calculate(&trades);

        assert_eq!(first.total_trades, second.total_trades);
        assert_eq!(first.win_rate, second.win_rate);
        assert_eq!(first.max_drawdown, second.max_drawdown);
        assert_eq!(first.sharpe_ratio, second.sharpe_ratio);
        assert_eq!(first.sortino_ratio, second.sortino_ratio);
        assert_eq!(first.total_pnl, second.total_pnl);
    }

    #[test]
    fn sortino_uses_downside_deviation_only() {
        let trades = vec![
            trade(dec!(500), 0, 1),
            trade(dec!(-100), 100, 101),
            trade(dec!(-300), 200, 201),
            trade(dec!(400), 300, 301),
        ];
        let metrics = BacktestMetrics::calculate(&trades);
        assert!(metrics.sortino_ratio != 0.0);
        assert!(metrics.sharpe_ratio != metrics.sortino_ratio);
    }

    #[test]
    fn identical_returns_give_zero_sharpe() {
        // Zero variance denominator resolves to 0, never an error.
        let trades = vec![trade(dec!(50), 0, 1), trade(dec!(50), 100, 101)];
        let metrics = BacktestMetrics::calculate(&trades);
        assert_eq!(metrics.sharpe_ratio, 0.0);
    }
}
