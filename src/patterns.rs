use crate::key_levels::{KeyLevelSet, LevelKind};
use crate::models::Bar;
use serde::{Deserialize, Serialize};

pub const LONG_BODY_RATIO: f64 = 0.6;
pub const SMALL_BODY_RATIO: f64 = 0.3;
pub const DOJI_BODY_RATIO: f64 = 0.1;
pub const PIN_BAR_SHADOW_MULTIPLE: f64 = 2.0;
pub const SHADOW_TINY_RATIO: f64 = 0.1;
pub const SHADOW_DOMINANT_RATIO: f64 = 0.6;
pub const VOLUME_SPIKE_MULTIPLE: f64 = 1.5;
pub const VOLUME_SPIKE_LOOKBACK: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternKind {
    PinBar,
    Doji,
    Hammer,
    InvertedHammer,
    BullishEngulfing,
    BearishEngulfing,
    MorningStar,
    EveningStar,
}

impl PatternKind {
    pub const ALL: [PatternKind; 8] = [
        PatternKind::PinBar,
        PatternKind::Doji,
        PatternKind::Hammer,
        PatternKind::InvertedHammer,
        PatternKind::BullishEngulfing,
        PatternKind::BearishEngulfing,
        PatternKind::MorningStar,
        PatternKind::EveningStar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::PinBar => "pin_bar",
            PatternKind::Doji => "doji",
            PatternKind::Hammer => "hammer",
            PatternKind::InvertedHammer => "inverted_hammer",
            PatternKind::BullishEngulfing => "bullish_engulfing",
            PatternKind::BearishEngulfing => "bearish_engulfing",
            PatternKind::MorningStar => "morning_star",
            PatternKind::EveningStar => "evening_star",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyLevel {
    pub kind: LevelKind,
    pub label: String,
    pub price: f64,
}

/// Detection outcome for one pattern kind on one bar. Metadata fields are
/// populated only when the pattern was detected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternResult {
    pub kind: PatternKind,
    pub detected: bool,
    pub shadow_to_body_ratio: Option<f64>,
    pub volume_spike: Option<bool>,
    pub nearby_level: Option<NearbyLevel>,
}

impl PatternResult {
    fn missed(kind: PatternKind) -> Self {
        Self {
            kind,
            detected: false,
            shadow_to_body_ratio: None,
            volume_spike: None,
            nearby_level: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Geometry {
    body: f64,
    range: f64,
    upper_shadow: f64,
    lower_shadow: f64,
}

impl Geometry {
    fn of(bar: &Bar) -> Self {
        Self {
            body: (bar.close - bar.open).abs(),
            range: bar.high - bar.low,
            upper_shadow: bar.high - bar.open.max(bar.close),
            lower_shadow: bar.open.min(bar.close) - bar.low,
        }
    }

    fn shadow_to_body_ratio(&self) -> f64 {
        if self.body > 0.0 {
            (self.upper_shadow + self.lower_shadow) / self.body
        } else {
            0.0
        }
    }
}

fn is_bullish(bar: &Bar) -> bool {
    bar.close > bar.open
}

fn is_bearish(bar: &Bar) -> bool {
    bar.close < bar.open
}

fn body_ratio(geometry: &Geometry) -> f64 {
    if geometry.range > 0.0 {
        geometry.body / geometry.range
    } else {
        0.0
    }
}

pub fn is_pin_bar(bar: &Bar) -> bool {
    let g = Geometry::of(bar);
    g.range > 0.0
        && g.body < SMALL_BODY_RATIO * g.range
        && (g.upper_shadow > PIN_BAR_SHADOW_MULTIPLE * g.body
            || g.lower_shadow > PIN_BAR_SHADOW_MULTIPLE * g.body)
}

/// Pin bar rejecting lower prices: the dominant shadow is below the body.
pub fn is_bullish_pin_bar(bar: &Bar) -> bool {
    let g = Geometry::of(bar);
    is_pin_bar(bar)
        && g.lower_shadow > PIN_BAR_SHADOW_MULTIPLE * g.body
        && g.lower_shadow > g.upper_shadow
}

/// Pin bar rejecting higher prices: the dominant shadow is above the body.
pub fn is_bearish_pin_bar(bar: &Bar) -> bool {
    let g = Geometry::of(bar);
    is_pin_bar(bar)
        && g.upper_shadow > PIN_BAR_SHADOW_MULTIPLE * g.body
        && g.upper_shadow > g.lower_shadow
}

pub fn is_doji(bar: &Bar) -> bool {
    let g = Geometry::of(bar);
    g.range > 0.0 && g.body < DOJI_BODY_RATIO * g.range
}

pub fn is_hammer(bar: &Bar) -> bool {
    let g = Geometry::of(bar);
    g.range > 0.0
        && g.upper_shadow < SHADOW_TINY_RATIO * g.range
        && g.lower_shadow > SHADOW_DOMINANT_RATIO * g.range
}

pub fn is_inverted_hammer(bar: &Bar) -> bool {
    let g = Geometry::of(bar);
    g.range > 0.0
        && g.lower_shadow < SHADOW_TINY_RATIO * g.range
        && g.upper_shadow > SHADOW_DOMINANT_RATIO * g.range
}

pub fn is_bullish_engulfing(previous: &Bar, current: &Bar) -> bool {
    is_bearish(previous)
        && is_bullish(current)
        && current.close > previous.open
        && current.open < previous.close
}

pub fn is_bearish_engulfing(previous: &Bar, current: &Bar) -> bool {
    is_bullish(previous)
        && is_bearish(current)
        && current.open > previous.close
        && current.close < previous.open
}

pub fn is_morning_star(first: &Bar, second: &Bar, third: &Bar) -> bool {
    let first_geometry = Geometry::of(first);
    let second_geometry = Geometry::of(second);
    let third_geometry = Geometry::of(third);

    is_bearish(first)
        && body_ratio(&first_geometry) >= LONG_BODY_RATIO
        && body_ratio(&second_geometry) <= SMALL_BODY_RATIO
        && second.open.max(second.close) < first.close
        && is_bullish(third)
        && body_ratio(&third_geometry) >= LONG_BODY_RATIO
        && third.close > (first.open + first.close) / 2.0
}

pub fn is_evening_star(first: &Bar, second: &Bar, third: &Bar) -> bool {
    let first_geometry = Geometry::of(first);
    let second_geometry = Geometry::of(second);
    let third_geometry = Geometry::of(third);

    is_bullish(first)
        && body_ratio(&first_geometry) >= LONG_BODY_RATIO
        && body_ratio(&second_geometry) <= SMALL_BODY_RATIO
        && second.open.min(second.close) > first.close
        && is_bearish(third)
        && body_ratio(&third_geometry) >= LONG_BODY_RATIO
        && third.close < (first.open + first.close) / 2.0
}

/// Volume above `VOLUME_SPIKE_MULTIPLE` times the mean of the preceding
/// bars (up to `VOLUME_SPIKE_LOOKBACK`); false when no prior bars exist.
pub fn is_volume_spike(bars: &[Bar], index: usize) -> bool {
    if index == 0 || index >= bars.len() {
        return false;
    }
    let start = index.saturating_sub(VOLUME_SPIKE_LOOKBACK);
    let window = &bars[start..index];
    let mean = window.iter().map(|b| b.volume).sum::<f64>() / window.len() as f64;
    mean > 0.0 && bars[index].volume > VOLUME_SPIKE_MULTIPLE * mean
}

/// Classifies every pattern kind for the bar at `index`, tagging detections
/// with shadow/body ratio, volume-spike flag, and the nearest key level
/// within `tolerance` of the close.
pub fn detect_patterns(
    bars: &[Bar],
    index: usize,
    levels: &KeyLevelSet,
    tolerance: f64,
) -> Vec<PatternResult> {
    let Some(current) = bars.get(index) else {
        return PatternKind::ALL.iter().map(|&k| PatternResult::missed(k)).collect();
    };
    let previous = index.checked_sub(1).and_then(|i| bars.get(i));
    let two_back = index.checked_sub(2).and_then(|i| bars.get(i));

    let detected_for = |kind: PatternKind| -> bool {
        match kind {
            PatternKind::PinBar => is_pin_bar(current),
            PatternKind::Doji => is_doji(current),
            PatternKind::Hammer => is_hammer(current),
            PatternKind::InvertedHammer => is_inverted_hammer(current),
            PatternKind::BullishEngulfing => previous
                .map(|prev| is_bullish_engulfing(prev, current))
                .unwrap_or(false),
            PatternKind::BearishEngulfing => previous
                .map(|prev| is_bearish_engulfing(prev, current))
                .unwrap_or(false),
            PatternKind::MorningStar => match (two_back, previous) {
                (Some(first), Some(second)) => is_morning_star(first, second, current),
                _ => false,
            },
            PatternKind::EveningStar => match (two_back, previous) {
                (Some(first), Some(second)) => is_evening_star(first, second, current),
                _ => false,
            },
        }
    };

    PatternKind::ALL
        .iter()
        .map(|&kind| {
            if !detected_for(kind) {
                return PatternResult::missed(kind);
            }
            let nearby = levels
                .nearest_level(current.close, tolerance)
                .map(|(level_kind, level)| NearbyLevel {
                    kind: level_kind,
                    label: level.label.clone(),
                    price: level.price,
                });
            PatternResult {
                kind,
                detected: true,
                shadow_to_body_ratio: Some(Geometry::of(current).shadow_to_body_ratio()),
                volume_spike: Some(is_volume_spike(bars, index)),
                nearby_level: nearby,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bar(offset: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(offset),
            open,
            high,
            low,
            close,
            volume: 1_000.0,
        }
    }

    #[test]
    fn pin_bar_reference_geometry() {
        // body=1, range=11, upper=9, lower=1
        let candidate = bar(0, 100.0, 110.0, 99.0, 101.0);
        assert!(is_pin_bar(&candidate));
        assert!(is_bearish_pin_bar(&candidate));
        assert!(!is_bullish_pin_bar(&candidate));

        let results = detect_patterns(&[candidate], 0, &KeyLevelSet::default(), 0.005);
        let pin = results
            .iter()
            .find(|r| r.kind == PatternKind::PinBar)
            .unwrap();
        assert!(pin.detected);
        assert!((pin.shadow_to_body_ratio.unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(pin.volume_spike, Some(false));
    }

    #[test]
    fn zero_body_bar_has_zero_shadow_ratio() {
        let flat = bar(0, 100.0, 104.0, 100.0, 100.0);
        assert!(is_pin_bar(&flat));
        let results = detect_patterns(&[flat], 0, &KeyLevelSet::default(), 0.005);
        let pin = results
            .iter()
            .find(|r| r.kind == PatternKind::PinBar)
            .unwrap();
        assert_eq!(pin.shadow_to_body_ratio, Some(0.0));
    }

    #[test]
    fn zero_range_bar_detects_nothing() {
        let degenerate = bar(0, 100.0, 100.0, 100.0, 100.0);
        let results = detect_patterns(&[degenerate], 0, &KeyLevelSet::default(), 0.005);
        assert!(results.iter().all(|r| !r.detected));
    }

    #[test]
    fn doji_and_hammer_thresholds() {
        assert!(is_doji(&bar(0, 100.0, 105.0, 95.0, 100.5)));
        assert!(!is_doji(&bar(0, 100.0, 105.0, 95.0, 102.0)));

        // lower shadow 9 of range 10, upper 0.5
        assert!(is_hammer(&bar(0, 109.5, 110.0, 100.0, 109.0)));
        assert!(is_inverted_hammer(&bar(0, 101.5, 110.0, 100.0, 100.5)));
        assert!(!is_hammer(&bar(0, 101.5, 110.0, 100.0, 100.5)));
    }

    #[test]
    fn bullish_engulfing_requires_opposite_colors() {
        let previous = bar(0, 105.0, 106.0, 99.0, 100.0);
        let current = bar(1, 99.0, 108.0, 98.0, 107.0);
        assert!(is_bullish_engulfing(&previous, &current));
        // Swapping the colors must not detect
        assert!(!is_bullish_engulfing(&current, &previous));
        assert!(!is_bearish_engulfing(&previous, &current));
    }

    #[test]
    fn bearish_engulfing_mirror() {
        let previous = bar(0, 100.0, 106.0, 99.0, 105.0);
        let current = bar(1, 106.0, 107.0, 98.0, 99.0);
        assert!(is_bearish_engulfing(&previous, &current));
        assert!(!is_bullish_engulfing(&previous, &current));
    }

    #[test]
    fn morning_star_three_bar_shape() {
        let first = bar(0, 110.0, 111.0, 99.5, 100.0);
        let star = bar(1, 98.0, 99.0, 97.0, 98.5);
        let third = bar(2, 99.0, 110.5, 98.5, 110.0);
        assert!(is_morning_star(&first, &star, &third));
        // Third bar failing to reach back into the first body
        let weak_third = bar(2, 99.0, 103.0, 96.0, 102.0);
        assert!(!is_morning_star(&first, &star, &weak_third));
    }

    #[test]
    fn evening_star_three_bar_shape() {
        let first = bar(0, 100.0, 110.5, 99.0, 110.0);
        let star = bar(1, 112.0, 113.0, 111.0, 112.5);
        let third = bar(2, 111.0, 111.5, 99.5, 100.0);
        assert!(is_evening_star(&first, &star, &third));
        assert!(!is_morning_star(&first, &star, &third));
    }

    #[test]
    fn volume_spike_compares_against_prior_mean() {
        let mut bars: Vec<Bar> = (0..10).map(|i| bar(i, 100.0, 101.0, 99.0, 100.5)).collect();
        bars[9].volume = 2_000.0;
        assert!(is_volume_spike(&bars, 9));
        assert!(!is_volume_spike(&bars, 5));
        assert!(!is_volume_spike(&bars, 0));
    }

    #[test]
    fn detection_tags_nearest_level() {
        let mut levels = KeyLevelSet::default();
        levels.push_support("90-day low", 101.0);
        let candidate = bar(0, 100.0, 110.0, 99.0, 101.0);
        let results = detect_patterns(&[candidate], 0, &levels, 0.005);
        let pin = results
            .iter()
            .find(|r| r.kind == PatternKind::PinBar)
            .unwrap();
        let nearby = pin.nearby_level.as_ref().unwrap();
        assert_eq!(nearby.kind, LevelKind::Support);
        assert_eq!(nearby.label, "90-day low");
        assert!((nearby.price - 101.0).abs() < 1e-9);
    }
}
