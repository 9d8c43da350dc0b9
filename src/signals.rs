use crate::config::SignalConfig;
use crate::indicators::AugmentedSeries;
use crate::key_levels::{KeyLevelSet, LevelKind};
use crate::models::{Bar, Direction, Signal};
use crate::patterns::{
    is_bearish_engulfing, is_bearish_pin_bar, is_bullish_engulfing, is_bullish_pin_bar,
};
use log::warn;

pub const STRATEGY_TWO_LEGGED_PULLBACK: &str = "two_legged_pullback";
pub const STRATEGY_PIN_BAR_SUPPORT: &str = "pin_bar_support";
pub const STRATEGY_PIN_BAR_RESISTANCE: &str = "pin_bar_resistance";
pub const STRATEGY_ENGULFING_SUPPORT: &str = "engulfing_support";
pub const STRATEGY_ENGULFING_RESISTANCE: &str = "engulfing_resistance";

fn near_level_of_kind(
    levels: &KeyLevelSet,
    price: f64,
    tolerance: f64,
    wanted: LevelKind,
) -> bool {
    matches!(levels.nearest_level(price, tolerance), Some((kind, _)) if kind == wanted)
}

/// Two-legged pullback to the trend filter, evaluated once over the trailing
/// lookback window: the last two filter-touch bars must step in the trend
/// direction (higher lows in an uptrend, lower highs in a downtrend) and a
/// later bar must break the second touch bar's extreme.
fn detect_two_legged_pullback(bars: &[Bar], filter: &[f64], lookback: usize) -> Option<Signal> {
    if bars.len() < 3 {
        return None;
    }
    let end = bars.len();
    let last_filter = filter[end - 1];
    if !last_filter.is_finite() {
        return None;
    }
    let uptrend = bars[end - 1].close > last_filter;
    let downtrend = bars[end - 1].close < last_filter;
    if !uptrend && !downtrend {
        return None;
    }

    let start = end.saturating_sub(lookback);
    let touches: Vec<usize> = (start..end)
        .filter(|&i| {
            filter[i].is_finite() && bars[i].low <= filter[i] && filter[i] <= bars[i].high
        })
        .collect();
    if touches.len() < 2 {
        return None;
    }

    let first_leg = touches[touches.len() - 2];
    let second_leg = touches[touches.len() - 1];

    if uptrend && bars[second_leg].low > bars[first_leg].low {
        let confirmation =
            (second_leg + 1..end).find(|&i| bars[i].high > bars[second_leg].high)?;
        return Some(Signal {
            timestamp: bars[confirmation].timestamp,
            direction: Direction::Long,
            strategy: STRATEGY_TWO_LEGGED_PULLBACK.to_string(),
        });
    }

    if downtrend && bars[second_leg].high < bars[first_leg].high {
        let confirmation =
            (second_leg + 1..end).find(|&i| bars[i].low < bars[second_leg].low)?;
        return Some(Signal {
            timestamp: bars[confirmation].timestamp,
            direction: Direction::Short,
            strategy: STRATEGY_TWO_LEGGED_PULLBACK.to_string(),
        });
    }

    None
}

/// Generates directional signals from one timeframe's augmented series.
///
/// The pullback family is evaluated once over the trailing window; the
/// candle-pattern family runs per bar with the first matching rule winning
/// that bar. The returned list is ordered by timestamp.
pub fn generate_signals(
    augmented: &AugmentedSeries,
    levels: &KeyLevelSet,
    config: &SignalConfig,
) -> Vec<Signal> {
    let Some(filter) = augmented.trend_filter(config.trend_filter_period) else {
        warn!(
            "No SMA-{} trend filter column available; returning no signals",
            config.trend_filter_period
        );
        return Vec::new();
    };
    let bars = augmented.series().bars();
    let tolerance = config.tolerance;
    let mut signals = Vec::new();

    if let Some(signal) = detect_two_legged_pullback(bars, filter, config.pullback_lookback) {
        signals.push(signal);
    }

    for i in 1..bars.len() {
        let filter_value = filter[i];
        if !filter_value.is_finite() {
            continue;
        }
        let bar = &bars[i];
        let previous = &bars[i - 1];
        let uptrend = bar.close > filter_value;
        let downtrend = bar.close < filter_value;

        let fired = if uptrend
            && is_bullish_pin_bar(bar)
            && near_level_of_kind(levels, bar.low, tolerance, LevelKind::Support)
        {
            Some((Direction::Long, STRATEGY_PIN_BAR_SUPPORT))
        } else if downtrend
            && is_bearish_pin_bar(bar)
            && near_level_of_kind(levels, bar.high, tolerance, LevelKind::Resistance)
        {
            Some((Direction::Short, STRATEGY_PIN_BAR_RESISTANCE))
        } else if uptrend
            && is_bullish_engulfing(previous, bar)
            && near_level_of_kind(levels, bar.low, tolerance, LevelKind::Support)
        {
            Some((Direction::Long, STRATEGY_ENGULFING_SUPPORT))
        } else if downtrend
            && is_bearish_engulfing(previous, bar)
            && near_level_of_kind(levels, bar.high, tolerance, LevelKind::Resistance)
        {
            Some((Direction::Short, STRATEGY_ENGULFING_RESISTANCE))
        } else {
            None
        };

        if let Some((direction, strategy)) = fired {
            signals.push(Signal {
                timestamp: bar.timestamp,
                direction,
                strategy: strategy.to_string(),
            });
        }
    }

    signals.sort_by_key(|signal| signal.timestamp);
    signals
}
