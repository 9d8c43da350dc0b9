use crate::models::{BacktestSummary, ClosedTrade, EquityPoint};
use statrs::statistics::Statistics;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const RISK_FREE_RATE: f64 = 0.02;

pub struct PerformanceCalculator;

impl PerformanceCalculator {
    pub fn calculate_summary(
        trades: &[ClosedTrade],
        equity_curve: &[EquityPoint],
    ) -> BacktestSummary {
        let total_trades = trades.len() as i32;
        let winning_trades = trades.iter().filter(|t| t.net_pnl > 0.0).count() as i32;

        let total_pnl: f64 = trades
            .iter()
            .map(|t| t.net_pnl)
            .filter(|pnl| pnl.is_finite())
            .sum();
        let (win_rate, average_pnl) = if total_trades > 0 {
            (
                winning_trades as f64 / total_trades as f64,
                total_pnl / total_trades as f64,
            )
        } else {
            (0.0, 0.0)
        };

        BacktestSummary {
            win_rate,
            total_trades,
            average_pnl,
            total_pnl,
            sharpe_ratio: Self::calculate_sharpe_ratio(equity_curve),
            max_drawdown: Self::calculate_max_drawdown_percent(equity_curve),
        }
    }

    pub fn calculate_sharpe_ratio(equity_curve: &[EquityPoint]) -> f64 {
        if equity_curve.len() < 2 {
            return 0.0;
        }

        let returns: Vec<f64> = equity_curve
            .windows(2)
            .map(|window| {
                let prev_value = window[0].equity;
                let curr_value = window[1].equity;
                if prev_value > 0.0 {
                    (curr_value - prev_value) / prev_value
                } else {
                    0.0
                }
            })
            .collect();

        let mean_return = returns.clone().mean();
        let std_dev = returns.std_dev();
        if std_dev == 0.0 || !std_dev.is_finite() {
            return 0.0;
        }

        // Annualize assuming one bar per trading day
        let annualized_return = mean_return * TRADING_DAYS_PER_YEAR;
        let annualized_volatility = std_dev * TRADING_DAYS_PER_YEAR.sqrt();

        (annualized_return - RISK_FREE_RATE) / annualized_volatility
    }

    /// Largest peak-to-trough equity decline, as a percentage of the peak.
    pub fn calculate_max_drawdown_percent(equity_curve: &[EquityPoint]) -> f64 {
        let mut max_drawdown_percent = 0.0;
        let Some(first) = equity_curve.first() else {
            return max_drawdown_percent;
        };

        let mut peak_value = first.equity;
        for point in equity_curve {
            if point.equity > peak_value {
                peak_value = point.equity;
            } else if peak_value > 0.0 {
                let drawdown_percent = (peak_value - point.equity) / peak_value * 100.0;
                if drawdown_percent > max_drawdown_percent {
                    max_drawdown_percent = drawdown_percent;
                }
            }
        }

        max_drawdown_percent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn equity(values: &[f64]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &equity)| EquityPoint {
                timestamp: base() + Duration::days(i as i64),
                equity,
            })
            .collect()
    }

    fn trade(net_pnl: f64) -> ClosedTrade {
        ClosedTrade {
            direction: Direction::Long,
            strategy: "test".to_string(),
            entry_timestamp: base(),
            exit_timestamp: base() + Duration::days(1),
            entry_price: 100.0,
            exit_price: 100.0 + net_pnl,
            size: 1.0,
            gross_pnl: net_pnl,
            net_pnl,
        }
    }

    #[test]
    fn zero_trades_produce_neutral_summary() {
        let summary = PerformanceCalculator::calculate_summary(&[], &equity(&[1_000.0, 1_000.0]));
        assert_eq!(summary.total_trades, 0);
        assert_eq!(summary.win_rate, 0.0);
        assert_eq!(summary.average_pnl, 0.0);
        assert_eq!(summary.total_pnl, 0.0);
        assert_eq!(summary.sharpe_ratio, 0.0);
        assert_eq!(summary.max_drawdown, 0.0);
    }

    #[test]
    fn win_rate_and_averages_from_ledger() {
        let trades = vec![trade(10.0), trade(-4.0), trade(6.0), trade(-2.0)];
        let summary =
            PerformanceCalculator::calculate_summary(&trades, &equity(&[1_000.0, 1_010.0]));
        assert_eq!(summary.total_trades, 4);
        assert!((summary.win_rate - 0.5).abs() < 1e-9);
        assert!((summary.total_pnl - 10.0).abs() < 1e-9);
        assert!((summary.average_pnl - 2.5).abs() < 1e-9);
    }

    #[test]
    fn max_drawdown_is_peak_to_trough_percent() {
        let curve = equity(&[1_000.0, 1_200.0, 900.0, 1_100.0, 1_050.0]);
        let drawdown = PerformanceCalculator::calculate_max_drawdown_percent(&curve);
        assert!((drawdown - 25.0).abs() < 1e-9);
    }

    #[test]
    fn flat_equity_has_zero_sharpe() {
        assert_eq!(
            PerformanceCalculator::calculate_sharpe_ratio(&equity(&[1_000.0; 5])),
            0.0
        );
    }

    #[test]
    fn rising_equity_has_positive_sharpe() {
        let curve = equity(&[1_000.0, 1_010.0, 1_021.0, 1_030.0, 1_042.0]);
        assert!(PerformanceCalculator::calculate_sharpe_ratio(&curve) > 0.0);
    }
}
