use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One OHLCV bar of historical market data.
///
/// Bars are immutable once produced by the data provider and ordered
/// ascending by timestamp within a series (one series per symbol/timeframe).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub symbol: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeDirection {
    Long,
    Short,
}

impl fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeDirection::Long => write!(f, "LONG"),
            TradeDirection::Short => write!(f, "SHORT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Open,
    Closed,
    Cancelled,
    Pending,
    PartiallyFilled,
    Error,
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One simulated position, created on entry and closed on exit.
///
/// Trades are never deleted during a backtest run; all of them accumulate
/// into the run's `BacktestResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub symbol: String,
    pub direction: TradeDirection,
    pub status: TradeStatus,
    pub entry_price: Decimal,
    pub exit_price: Option<Decimal>,
    pub quantity: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub pnl: Decimal,
    pub entry_timestamp: i64,
    pub exit_timestamp: Option<i64>,
}

impl Trade {
    /// Open a new trade at the given price.
    pub fn open(
        symbol: &str,
        direction: TradeDirection,
        entry_price: Decimal,
        quantity: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
        entry_timestamp: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            direction,
            status: TradeStatus::Open,
            entry_price,
            exit_price: None,
            quantity,
            stop_loss,
            take_profit,
            pnl: Decimal::ZERO,
            entry_timestamp,
            exit_timestamp: None,
        }
    }

    /// Close the trade and set direction-aware realized P&L.
    pub fn close(&mut self, exit_price: Decimal, exit_timestamp: i64) {
        self.exit_price = Some(exit_price);
        self.exit_timestamp = Some(exit_timestamp);
        self.status = TradeStatus::Closed;
        self.pnl = match self.direction {
            TradeDirection::Long => (exit_price - self.entry_price) * self.quantity,
            TradeDirection::Short => (self.entry_price - exit_price) * self.quantity,
        };
    }

    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn long_trade_pnl_is_exit_minus_entry() {
        let mut trade = Trade::open("BTC/USD", TradeDirection::Long, dec!(100), dec!(2), None, None, 0);
        trade.close(dec!(110), 86400);
        assert_eq!(trade.pnl, dec!(20));
        assert_eq!(trade.status, TradeStatus::Closed);
        assert_eq!(trade.exit_timestamp, Some(86400));
    }

    #[test]
    fn short_trade_pnl_is_entry_minus_exit() {
        let mut trade = Trade::open("BTC/USD", TradeDirection::Short, dec!(100), dec!(2), None, None, 0);
        trade.close(dec!(90), 86400);
        assert_eq!(trade.pnl, dec!(20));
    }
}
