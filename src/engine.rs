use crate::config::{BacktestConfig, StopLossMode, TakeProfitMode};
use crate::indicators::calculate_atr;
use crate::models::{
    generate_run_id, BacktestResult, BacktestSummary, Bar, BarSeries, ClosedTrade, Direction,
    EquityPoint, Position, Signal,
};
use crate::performance::PerformanceCalculator;
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::BTreeMap;

/// An open position plus the strategy tag of the signal that opened it; the
/// tag is inherited by the ClosedTrade on exit.
#[derive(Debug, Clone)]
struct OpenPosition {
    position: Position,
    strategy: String,
}

/// Exclusive position state of a backtest run at one simulated bar.
#[derive(Debug, Clone)]
enum PositionState {
    Flat,
    LongOpen(OpenPosition),
    ShortOpen(OpenPosition),
}

impl PositionState {
    fn open_position(&self) -> Option<&Position> {
        match self {
            PositionState::Flat => None,
            PositionState::LongOpen(open) | PositionState::ShortOpen(open) => {
                Some(&open.position)
            }
        }
    }
}

pub struct BacktestEngine {
    config: BacktestConfig,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig) -> Self {
        Self { config }
    }

    pub fn from_parameters(parameters: &std::collections::HashMap<String, f64>) -> Self {
        Self::new(BacktestConfig::from_parameters(parameters))
    }

    /// Runs the single-position state machine over the series, consuming
    /// signals on their matching bar while flat and dropping the rest.
    pub fn run(&self, symbol: &str, series: &BarSeries, signals: &[Signal]) -> BacktestResult {
        let bars = series.bars();
        let atr = calculate_atr(
            &series.highs(),
            &series.lows(),
            &series.closes(),
            self.config.risk.atr_period,
        );

        let mut pending: BTreeMap<DateTime<Utc>, Vec<&Signal>> = BTreeMap::new();
        for signal in signals {
            pending.entry(signal.timestamp).or_default().push(signal);
        }

        let mut state = PositionState::Flat;
        let mut cash = self.config.initial_cash;
        let mut trades: Vec<ClosedTrade> = Vec::new();
        let mut equity_curve: Vec<EquityPoint> = Vec::with_capacity(bars.len());

        for (index, bar) in bars.iter().enumerate() {
            // Exits are evaluated before entries, so the entry bar itself is
            // never an exit candidate and a freed slot can be refilled on the
            // same bar.
            state = match state {
                PositionState::LongOpen(open)
                    if bar.close <= open.position.stop_price
                        || bar.close >= open.position.take_profit_price =>
                {
                    cash += self.close_position(&open, bar, &mut trades);
                    PositionState::Flat
                }
                PositionState::ShortOpen(open)
                    if bar.close >= open.position.stop_price
                        || bar.close <= open.position.take_profit_price =>
                {
                    cash += self.close_position(&open, bar, &mut trades);
                    PositionState::Flat
                }
                other => other,
            };

            if let Some(bar_signals) = pending.get(&bar.timestamp) {
                match state {
                    PositionState::Flat => {
                        for signal in bar_signals {
                            if let Some(position) =
                                self.open_position(bar, atr.get(index).copied(), signal, cash)
                            {
                                let open = OpenPosition {
                                    position,
                                    strategy: signal.strategy.clone(),
                                };
                                state = match signal.direction {
                                    Direction::Long => PositionState::LongOpen(open),
                                    Direction::Short => PositionState::ShortOpen(open),
                                };
                                break;
                            }
                        }
                    }
                    _ => {
                        debug!(
                            "{}: dropping {} signal(s) at {} while a position is open",
                            symbol,
                            bar_signals.len(),
                            bar.timestamp
                        );
                    }
                }
            }

            let unrealized = state
                .open_position()
                .map(|position| {
                    (bar.close - position.entry_price) * position.direction.signum() * position.size
                })
                .unwrap_or(0.0);
            equity_curve.push(EquityPoint {
                timestamp: bar.timestamp,
                equity: cash + unrealized,
            });
        }

        let final_equity = equity_curve
            .last()
            .map(|point| point.equity)
            .unwrap_or(self.config.initial_cash);
        let summary = if trades.is_empty() && equity_curve.is_empty() {
            BacktestSummary::zero()
        } else {
            PerformanceCalculator::calculate_summary(&trades, &equity_curve)
        };

        BacktestResult {
            id: generate_run_id(),
            symbol: symbol.to_string(),
            timeframe: series.timeframe(),
            start_date: bars.first().map(|b| b.timestamp),
            end_date: bars.last().map(|b| b.timestamp),
            initial_cash: self.config.initial_cash,
            final_equity,
            summary,
            trades,
            equity_curve,
        }
    }

    fn open_position(
        &self,
        bar: &Bar,
        atr_value: Option<f64>,
        signal: &Signal,
        cash: f64,
    ) -> Option<Position> {
        let entry = bar.close;
        if entry <= 0.0 || cash <= 0.0 {
            return None;
        }
        let direction = signal.direction;
        let risk = &self.config.risk;

        let stop_price = match risk.stop_loss_mode {
            StopLossMode::Percent => {
                entry * (1.0 - direction.signum() * risk.stop_loss_ratio)
            }
            StopLossMode::Atr => {
                let Some(atr) = atr_value.filter(|v| v.is_finite() && *v > 0.0) else {
                    debug!(
                        "Skipping {} entry at {}: ATR not warmed up",
                        direction.as_str(),
                        bar.timestamp
                    );
                    return None;
                };
                entry - direction.signum() * risk.atr_multiplier * atr
            }
        };
        let stop_distance = (entry - stop_price).abs();

        let take_profit_price = match risk.take_profit_mode {
            TakeProfitMode::Percent => {
                entry * (1.0 + direction.signum() * risk.take_profit_ratio)
            }
            TakeProfitMode::RewardRisk => {
                entry + direction.signum() * stop_distance * risk.reward_risk_ratio
            }
        };

        let size = (cash * self.config.trade_size_ratio) / entry;
        if size <= 0.0 {
            return None;
        }

        Some(Position {
            direction,
            entry_price: entry,
            entry_timestamp: bar.timestamp,
            stop_price,
            take_profit_price,
            size,
        })
    }

    /// Converts the position into a ClosedTrade filled at the bar close and
    /// returns the realized net pnl.
    fn close_position(&self, open: &OpenPosition, bar: &Bar, trades: &mut Vec<ClosedTrade>) -> f64 {
        let position = &open.position;
        let exit = bar.close;
        let gross_pnl =
            (exit - position.entry_price) * position.direction.signum() * position.size;
        let commission =
            self.config.commission_rate * position.size * (position.entry_price + exit);
        let net_pnl = gross_pnl - commission;

        trades.push(ClosedTrade {
            direction: position.direction,
            strategy: open.strategy.clone(),
            entry_timestamp: position.entry_timestamp,
            exit_timestamp: bar.timestamp,
            entry_price: position.entry_price,
            exit_price: exit,
            size: position.size,
            gross_pnl,
            net_pnl,
        });
        net_pnl
    }
}
