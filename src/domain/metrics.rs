//! Trade statistics over a backtrack run.

use super::backtest::BacktestResult;
use super::ledger::ClosedTrade;

#[derive(Debug, Clone, PartialEq)]
pub struct TradeStats {
    pub total_return: f64,
    pub max_drawdown: f64,
    pub trade_count: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    /// Mean holding time in minutes.
    pub avg_trade_minutes: f64,
}

impl TradeStats {
    pub fn compute(result: &BacktestResult) -> Self {
        let initial = result.initial_balance;
        let total_return = if initial > 0.0 {
            (result.final_balance - initial) / initial
        } else {
            0.0
        };
        let max_drawdown = compute_drawdown(initial, &result.trades);

        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut trades_breakeven = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut total_minutes = 0i64;

        for trade in &result.trades {
            let pnl = trade.pnl;
            if pnl > 0.0 {
                trades_won += 1;
                total_wins += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                trades_lost += 1;
                total_losses += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
            } else {
                trades_breakeven += 1;
            }
            total_minutes += (trade.exit_time - trade.entry_time).num_minutes();
        }

        let trade_count = result.trades.len();
        let win_rate = if trade_count > 0 {
            trades_won as f64 / trade_count as f64
        } else {
            0.0
        };

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_win = if trades_won > 0 {
            total_wins / trades_won as f64
        } else {
            0.0
        };

        let avg_loss = if trades_lost > 0 {
            total_losses / trades_lost as f64
        } else {
            0.0
        };

        let avg_trade_minutes = if trade_count > 0 {
            total_minutes as f64 / trade_count as f64
        } else {
            0.0
        };

        TradeStats {
            total_return,
            max_drawdown,
            trade_count,
            trades_won,
            trades_lost,
            trades_breakeven,
            win_rate,
            profit_factor,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
            avg_trade_minutes,
        }
    }
}

/// Largest peak-to-trough fall of the balance, sampled after each trade.
fn compute_drawdown(initial_balance: f64, trades: &[ClosedTrade]) -> f64 {
    let mut peak = initial_balance;
    let mut max_dd = 0.0_f64;
    for balance in trades.iter().map(|t| t.balance_after) {
        if balance > peak {
            peak = balance;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - balance) / peak);
        }
    }
    max_dd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::Side;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn make_trades(pnls: &[f64]) -> Vec<ClosedTrade> {
        let mut balance = 1000.0;
        pnls.iter()
            .enumerate()
            .map(|(i, &pnl)| {
                balance += pnl;
                ClosedTrade {
                    side: Side::Long,
                    units: 100,
                    entry_price: 1.0,
                    exit_price: 1.0 + pnl / 100.0,
                    entry_time: t0() + Duration::hours(i as i64),
                    exit_time: t0() + Duration::hours(i as i64) + Duration::minutes(30),
                    conversion_rate: 1.0,
                    pnl,
                    balance_after: balance,
                }
            })
            .collect()
    }

    fn make_result(pnls: &[f64]) -> BacktestResult {
        let trades = make_trades(pnls);
        let final_balance = trades.last().map(|t| t.balance_after).unwrap_or(1000.0);
        BacktestResult {
            initial_balance: 1000.0,
            final_balance,
            decisions: Vec::new(),
            history: Vec::new(),
            trades,
            bars_replayed: 0,
            ruined: false,
        }
    }

    #[test]
    fn no_trades() {
        let stats = TradeStats::compute(&make_result(&[]));
        assert_eq!(stats.trade_count, 0);
        assert!((stats.win_rate - 0.0).abs() < f64::EPSILON);
        assert!((stats.profit_factor - 0.0).abs() < f64::EPSILON);
        assert!((stats.total_return - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn wins_and_losses() {
        let stats = TradeStats::compute(&make_result(&[100.0, -50.0, 0.0, 50.0]));
        assert_eq!(stats.trade_count, 4);
        assert_eq!(stats.trades_won, 2);
        assert_eq!(stats.trades_lost, 1);
        assert_eq!(stats.trades_breakeven, 1);
        assert!((stats.win_rate - 0.5).abs() < f64::EPSILON);
        assert!((stats.profit_factor - 3.0).abs() < f64::EPSILON);
        assert!((stats.avg_win - 75.0).abs() < f64::EPSILON);
        assert!((stats.largest_loss - 50.0).abs() < f64::EPSILON);
        assert!((stats.total_return - 0.1).abs() < 1e-12);
        assert!((stats.avg_trade_minutes - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn only_wins_is_infinite_profit_factor() {
        let stats = TradeStats::compute(&make_result(&[10.0]));
        assert!(stats.profit_factor.is_infinite());
    }

    #[test]
    fn drawdown_from_peak() {
        // 1000 -> 1100 -> 880 -> 990
        let stats = TradeStats::compute(&make_result(&[100.0, -220.0, 110.0]));
        assert!((stats.max_drawdown - 0.2).abs() < 1e-12);
    }
}
