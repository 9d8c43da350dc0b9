use crate::models::{Bar, BarSeries};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Trailing calendar-day windows scanned for swing highs/lows, broadest first.
pub const SWING_WINDOWS_DAYS: [i64; 4] = [90, 30, 7, 3];

const FIB_RATIOS: [(f64, &str); 3] = [
    (0.382, "38.2% retracement"),
    (0.5, "50% retracement"),
    (0.618, "61.8% retracement"),
];

pub const DEFAULT_LEVEL_TOLERANCE: f64 = 0.005;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelKind {
    Support,
    Resistance,
}

impl LevelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LevelKind::Support => "support",
            LevelKind::Resistance => "resistance",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyLevel {
    pub label: String,
    pub price: f64,
}

/// Labeled support/resistance prices in insertion order. A level that has no
/// underlying data is simply absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyLevelSet {
    pub support: Vec<KeyLevel>,
    pub resistance: Vec<KeyLevel>,
}

impl KeyLevelSet {
    pub fn push_support(&mut self, label: impl Into<String>, price: f64) {
        self.support.push(KeyLevel {
            label: label.into(),
            price,
        });
    }

    pub fn push_resistance(&mut self, label: impl Into<String>, price: f64) {
        self.resistance.push(KeyLevel {
            label: label.into(),
            price,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.support.is_empty() && self.resistance.is_empty()
    }

    /// First level whose relative distance to `price` is within `tolerance`,
    /// scanning support before resistance in insertion order.
    pub fn nearest_level(&self, price: f64, tolerance: f64) -> Option<(LevelKind, &KeyLevel)> {
        let within = |level: &KeyLevel| {
            level.price > 0.0 && ((price - level.price).abs() / level.price) <= tolerance
        };
        self.support
            .iter()
            .find(|level| within(level))
            .map(|level| (LevelKind::Support, level))
            .or_else(|| {
                self.resistance
                    .iter()
                    .find(|level| within(level))
                    .map(|level| (LevelKind::Resistance, level))
            })
    }
}

fn trailing_window(bars: &[Bar], days: i64) -> &[Bar] {
    let Some(last) = bars.last() else {
        return &[];
    };
    let cutoff = last.timestamp - Duration::days(days);
    let start = bars.partition_point(|bar| bar.timestamp < cutoff);
    &bars[start..]
}

fn swing_high_low(bars: &[Bar]) -> Option<(f64, f64)> {
    if bars.is_empty() {
        return None;
    }
    let high = bars.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    let low = bars.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    Some((high, low))
}

/// Extracts swing highs/lows per trailing window, previous-day levels,
/// Fibonacci retracements of the broadest window, and measured-move targets
/// from the daily series.
pub fn compute_key_levels(daily: &BarSeries) -> KeyLevelSet {
    let mut levels = KeyLevelSet::default();
    let bars = daily.bars();
    let Some(latest) = bars.last() else {
        return levels;
    };

    let mut broadest: Option<(f64, f64)> = None;
    for days in SWING_WINDOWS_DAYS {
        let window = trailing_window(bars, days);
        if let Some((high, low)) = swing_high_low(window) {
            levels.push_resistance(format!("{}-day high", days), high);
            levels.push_support(format!("{}-day low", days), low);
            if broadest.is_none() {
                broadest = Some((high, low));
            }
        }
    }

    if bars.len() >= 2 {
        let previous = &bars[bars.len() - 2];
        levels.push_resistance("previous-day high", previous.high);
        levels.push_support("previous-day low", previous.low);
    }

    if let Some((high, low)) = broadest {
        let range = high - low;
        for (ratio, label) in FIB_RATIOS {
            let price = high - ratio * range;
            if price < latest.close {
                levels.push_support(label, price);
            } else {
                levels.push_resistance(label, price);
            }
        }
    }

    if bars.len() >= 2 {
        let previous = &bars[bars.len() - 2];
        let range = previous.high - previous.low;
        levels.push_resistance("measured-move-1x", previous.high + range);
        levels.push_resistance("measured-move-2x", previous.high + 2.0 * range);
    }

    levels
}
