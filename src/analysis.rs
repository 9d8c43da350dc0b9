use crate::config::AnalysisConfig;
use crate::indicators::{compute_indicators, IndicatorSnapshot};
use crate::key_levels::{compute_key_levels, KeyLevelSet};
use crate::models::{BarSeries, Timeframe, TrendLabel};
use crate::patterns::{detect_patterns, PatternResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Indicator snapshot, latest-bar pattern scan, and trend label for one
/// timeframe of one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeframeAnalysis {
    pub timeframe: Timeframe,
    pub trend: TrendLabel,
    pub indicators: IndicatorSnapshot,
    pub patterns: Vec<PatternResult>,
}

/// The nested analysis output handed to reporting and charting consumers.
/// Timeframes with no data are simply absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSnapshot {
    pub symbol: String,
    pub key_levels: KeyLevelSet,
    pub timeframes: BTreeMap<Timeframe, TimeframeAnalysis>,
}

fn trend_label(
    augmented: &crate::indicators::AugmentedSeries,
    trend_filter_period: usize,
) -> TrendLabel {
    let Some(filter) = augmented.trend_filter(trend_filter_period) else {
        return TrendLabel::Unknown;
    };
    let bars = augmented.series().bars();
    let Some(last) = bars.last() else {
        return TrendLabel::Unknown;
    };
    let value = filter[bars.len() - 1];
    if !value.is_finite() {
        TrendLabel::Unknown
    } else if last.close > value {
        TrendLabel::Uptrend
    } else if last.close < value {
        TrendLabel::Downtrend
    } else {
        TrendLabel::Unknown
    }
}

/// Runs the full per-symbol analysis: key levels from the daily series, then
/// indicators, latest-bar patterns, and a trend label per timeframe. Empty
/// series contribute nothing.
pub fn analyze_symbol(
    symbol: &str,
    series_by_timeframe: &BTreeMap<Timeframe, BarSeries>,
    config: &AnalysisConfig,
) -> AnalysisSnapshot {
    let key_levels = series_by_timeframe
        .get(&Timeframe::Daily)
        .map(compute_key_levels)
        .unwrap_or_default();

    let mut timeframes = BTreeMap::new();
    for (&timeframe, series) in series_by_timeframe {
        if series.is_empty() {
            continue;
        }
        let (indicators, augmented) = compute_indicators(series);
        let trend = trend_label(&augmented, config.signal.trend_filter_period);
        let patterns = detect_patterns(
            series.bars(),
            series.len() - 1,
            &key_levels,
            config.signal.tolerance,
        );
        timeframes.insert(
            timeframe,
            TimeframeAnalysis {
                timeframe,
                trend,
                indicators,
                patterns,
            },
        );
    }

    AnalysisSnapshot {
        symbol: symbol.to_string(),
        key_levels,
        timeframes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Bar;
    use chrono::{Duration, TimeZone, Utc};

    fn series(timeframe: Timeframe, closes: &[f64]) -> BarSeries {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let step = match timeframe {
            Timeframe::Daily => Duration::days(1),
            Timeframe::FourHour => Duration::hours(4),
            Timeframe::OneHour => Duration::hours(1),
            Timeframe::FiveMinute => Duration::minutes(5),
        };
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: base + step * i as i32,
                open: close - 0.1,
                high: close + 0.2,
                low: close - 0.3,
                close,
                volume: 1_000.0,
            })
            .collect();
        BarSeries::new(timeframe, bars).unwrap()
    }

    #[test]
    fn missing_daily_series_omits_key_levels() {
        let mut by_timeframe = BTreeMap::new();
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64 * 0.2).collect();
        by_timeframe.insert(Timeframe::OneHour, series(Timeframe::OneHour, &closes));

        let snapshot = analyze_symbol("AAPL", &by_timeframe, &AnalysisConfig::default());
        assert!(snapshot.key_levels.is_empty());
        assert_eq!(snapshot.timeframes.len(), 1);
        assert!(snapshot.timeframes.contains_key(&Timeframe::OneHour));
    }

    #[test]
    fn empty_series_contributes_no_section() {
        let mut by_timeframe = BTreeMap::new();
        by_timeframe.insert(
            Timeframe::FiveMinute,
            BarSeries::new(Timeframe::FiveMinute, Vec::new()).unwrap(),
        );
        let snapshot = analyze_symbol("AAPL", &by_timeframe, &AnalysisConfig::default());
        assert!(snapshot.timeframes.is_empty());
    }

    #[test]
    fn rising_daily_series_labels_uptrend() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let mut by_timeframe = BTreeMap::new();
        by_timeframe.insert(Timeframe::Daily, series(Timeframe::Daily, &closes));

        let snapshot = analyze_symbol("MSFT", &by_timeframe, &AnalysisConfig::default());
        let daily = &snapshot.timeframes[&Timeframe::Daily];
        assert_eq!(daily.trend, TrendLabel::Uptrend);
        assert!(daily.indicators.sma_20.is_some());
        assert!(!snapshot.key_levels.is_empty());
        assert_eq!(daily.patterns.len(), 8);
    }

    #[test]
    fn short_history_has_unknown_trend() {
        let closes: Vec<f64> = (0..5).map(|i| 100.0 + i as f64).collect();
        let mut by_timeframe = BTreeMap::new();
        by_timeframe.insert(Timeframe::Daily, series(Timeframe::Daily, &closes));

        let snapshot = analyze_symbol("MSFT", &by_timeframe, &AnalysisConfig::default());
        assert_eq!(
            snapshot.timeframes[&Timeframe::Daily].trend,
            TrendLabel::Unknown
        );
    }
}
