use crate::indicators::ATR_PERIOD;
use crate::key_levels::DEFAULT_LEVEL_TOLERANCE;
use crate::param_utils::{get_param, get_param_usize_rounded_clamped, get_rounded_param};
use std::collections::HashMap;

/// Stop-loss placement for new positions
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopLossMode {
    /// Fixed percentage of the entry price
    Percent,
    /// ATR at the entry bar times a multiplier
    Atr,
}

/// Take-profit placement for new positions
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TakeProfitMode {
    /// Fixed percentage of the entry price
    Percent,
    /// Stop distance times a reward:risk ratio
    RewardRisk,
}

/// Configuration for stop-loss and take-profit placement
#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub stop_loss_mode: StopLossMode,
    pub stop_loss_ratio: f64,
    pub atr_period: usize,
    pub atr_multiplier: f64,
    pub take_profit_mode: TakeProfitMode,
    pub take_profit_ratio: f64,
    pub reward_risk_ratio: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss_mode: StopLossMode::Percent,
            stop_loss_ratio: 0.05,
            atr_period: ATR_PERIOD,
            atr_multiplier: 2.0,
            take_profit_mode: TakeProfitMode::Percent,
            take_profit_ratio: 0.10,
            reward_risk_ratio: 2.0,
        }
    }
}

/// Signal generation parameters
#[derive(Debug, Clone)]
pub struct SignalConfig {
    pub trend_filter_period: usize,
    pub tolerance: f64,
    pub pullback_lookback: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            trend_filter_period: 20,
            tolerance: DEFAULT_LEVEL_TOLERANCE,
            pullback_lookback: 10,
        }
    }
}

/// Analysis parameters shared across timeframes
#[derive(Debug, Clone, Default)]
pub struct AnalysisConfig {
    pub signal: SignalConfig,
}

/// Main backtest configuration struct that groups all parameters
#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub initial_cash: f64,
    pub trade_size_ratio: f64,
    pub commission_rate: f64,
    pub risk: RiskConfig,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_cash: 100_000.0,
            trade_size_ratio: 1.0,
            commission_rate: 0.001,
            risk: RiskConfig::default(),
        }
    }
}

impl BacktestConfig {
    /// Create a new BacktestConfig from a parameter map
    pub fn from_parameters(parameters: &HashMap<String, f64>) -> Self {
        let defaults = Self::default();
        let risk_defaults = RiskConfig::default();

        let stop_loss_mode = match get_rounded_param(parameters, "stopLossMode", 0) {
            1 => StopLossMode::Atr,
            _ => StopLossMode::Percent,
        };
        let take_profit_mode = match get_rounded_param(parameters, "takeProfitMode", 0) {
            1 => TakeProfitMode::RewardRisk,
            _ => TakeProfitMode::Percent,
        };

        Self {
            initial_cash: get_param(parameters, "initialCash", defaults.initial_cash),
            trade_size_ratio: get_param(parameters, "tradeSizeRatio", defaults.trade_size_ratio)
                .clamp(0.0, 1.0),
            commission_rate: get_param(parameters, "commissionRate", defaults.commission_rate)
                .max(0.0),
            risk: RiskConfig {
                stop_loss_mode,
                stop_loss_ratio: get_param(parameters, "stopLossRatio", risk_defaults.stop_loss_ratio),
                atr_period: get_param_usize_rounded_clamped(
                    parameters,
                    "atrPeriod",
                    risk_defaults.atr_period,
                    1,
                    100,
                ),
                atr_multiplier: get_param(parameters, "atrMultiplier", risk_defaults.atr_multiplier),
                take_profit_mode,
                take_profit_ratio: get_param(
                    parameters,
                    "takeProfitRatio",
                    risk_defaults.take_profit_ratio,
                ),
                reward_risk_ratio: get_param(
                    parameters,
                    "rewardRiskRatio",
                    risk_defaults.reward_risk_ratio,
                ),
            },
        }
    }
}

impl AnalysisConfig {
    /// Create a new AnalysisConfig from a parameter map
    pub fn from_parameters(parameters: &HashMap<String, f64>) -> Self {
        let defaults = SignalConfig::default();
        Self {
            signal: SignalConfig {
                trend_filter_period: get_param_usize_rounded_clamped(
                    parameters,
                    "trendFilterPeriod",
                    defaults.trend_filter_period,
                    1,
                    500,
                ),
                tolerance: get_param(parameters, "levelTolerance", defaults.tolerance)
                    .clamp(0.0, 0.5),
                pullback_lookback: get_param_usize_rounded_clamped(
                    parameters,
                    "pullbackLookback",
                    defaults.pullback_lookback,
                    3,
                    100,
                ),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backtest_config_reads_modes_from_parameters() {
        let mut parameters = HashMap::new();
        parameters.insert("stopLossMode".to_string(), 1.0);
        parameters.insert("takeProfitMode".to_string(), 1.0);
        parameters.insert("atrMultiplier".to_string(), 3.0);
        parameters.insert("rewardRiskRatio".to_string(), 1.5);
        parameters.insert("commissionRate".to_string(), 0.002);

        let config = BacktestConfig::from_parameters(&parameters);
        assert_eq!(config.risk.stop_loss_mode, StopLossMode::Atr);
        assert_eq!(config.risk.take_profit_mode, TakeProfitMode::RewardRisk);
        assert!((config.risk.atr_multiplier - 3.0).abs() < 1e-9);
        assert!((config.risk.reward_risk_ratio - 1.5).abs() < 1e-9);
        assert!((config.commission_rate - 0.002).abs() < 1e-9);
    }

    #[test]
    fn defaults_apply_when_parameters_missing() {
        let config = BacktestConfig::from_parameters(&HashMap::new());
        assert_eq!(config.risk.stop_loss_mode, StopLossMode::Percent);
        assert!((config.initial_cash - 100_000.0).abs() < 1e-9);

        let analysis = AnalysisConfig::from_parameters(&HashMap::new());
        assert_eq!(analysis.signal.trend_filter_period, 20);
        assert!((analysis.signal.tolerance - 0.005).abs() < 1e-12);
    }
}
