use crate::models::BarSeries;
use serde::{Deserialize, Serialize};

pub const SMA_FAST_PERIOD: usize = 20;
pub const SMA_SLOW_PERIOD: usize = 50;
pub const EMA_FAST_PERIOD: usize = 20;
pub const EMA_SLOW_PERIOD: usize = 50;
pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST_PERIOD: usize = 12;
pub const MACD_SLOW_PERIOD: usize = 26;
pub const MACD_SIGNAL_PERIOD: usize = 9;
pub const BOLLINGER_PERIOD: usize = 20;
pub const BOLLINGER_STD_DEV: f64 = 2.0;
pub const STOCH_K_PERIOD: usize = 14;
pub const STOCH_K_SMOOTHING: usize = 3;
pub const STOCH_D_PERIOD: usize = 3;
pub const ADX_PERIOD: usize = 14;
pub const ATR_PERIOD: usize = 14;

/// Bars with fewer preceding observations than an indicator needs carry
/// `f64::NAN` in its column; the snapshot maps NaN to `None`.
pub fn calculate_sma(prices: &[f64], period: usize) -> Vec<f64> {
    let mut sma_values = vec![f64::NAN; prices.len()];
    if period == 0 || prices.len() < period {
        return sma_values;
    }

    let mut window_sum: f64 = prices[..period].iter().sum();
    sma_values[period - 1] = window_sum / period as f64;
    for i in period..prices.len() {
        window_sum += prices[i] - prices[i - period];
        sma_values[i] = window_sum / period as f64;
    }

    sma_values
}

pub fn calculate_ema(prices: &[f64], period: usize) -> Vec<f64> {
    if prices.is_empty() {
        return Vec::new();
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema_values = Vec::with_capacity(prices.len());
    ema_values.push(prices[0]);

    for i in 1..prices.len() {
        let ema = (prices[i] * multiplier) + (ema_values[i - 1] * (1.0 - multiplier));
        ema_values.push(ema);
    }

    ema_values
}

pub fn calculate_macd(
    prices: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let fast_ema = calculate_ema(prices, fast_period);
    let slow_ema = calculate_ema(prices, slow_period);

    let macd_line: Vec<f64> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(fast, slow)| fast - slow)
        .collect();

    let signal_line = calculate_ema(&macd_line, signal_period);

    let histogram: Vec<f64> = macd_line
        .iter()
        .zip(signal_line.iter())
        .map(|(line, signal)| line - signal)
        .collect();

    (macd_line, signal_line, histogram)
}

fn rsi_from_avgs(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

pub fn calculate_rsi(prices: &[f64], period: usize) -> Vec<f64> {
    let mut rsi_values = vec![f64::NAN; prices.len()];
    if period == 0 || prices.len() < period + 1 {
        return rsi_values;
    }

    let mut sum_gain = 0.0f64;
    let mut sum_loss = 0.0f64;
    for i in 1..=period {
        let delta = prices[i] - prices[i - 1];
        if delta >= 0.0 {
            sum_gain += delta;
        } else {
            sum_loss += -delta;
        }
    }

    let mut avg_gain = sum_gain / period as f64;
    let mut avg_loss = sum_loss / period as f64;
    rsi_values[period] = rsi_from_avgs(avg_gain, avg_loss);

    for i in (period + 1)..prices.len() {
        let delta = prices[i] - prices[i - 1];
        let gain = if delta > 0.0 { delta } else { 0.0 };
        let loss = if delta < 0.0 { -delta } else { 0.0 };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        rsi_values[i] = rsi_from_avgs(avg_gain, avg_loss);
    }

    rsi_values
}

pub fn calculate_bollinger_bands(
    prices: &[f64],
    period: usize,
    std_dev: f64,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let middle = calculate_sma(prices, period);
    let mut upper = vec![f64::NAN; prices.len()];
    let mut lower = vec![f64::NAN; prices.len()];
    if period == 0 || prices.len() < period {
        return (upper, middle, lower);
    }

    for i in (period - 1)..prices.len() {
        let window_start = i + 1 - period;
        let slice = &prices[window_start..=i];
        let mean = middle[i];
        let variance = slice.iter().map(|&val| (val - mean).powi(2)).sum::<f64>() / period as f64;
        let standard_deviation = variance.sqrt();

        upper[i] = mean + (std_dev * standard_deviation);
        lower[i] = mean - (std_dev * standard_deviation);
    }

    (upper, middle, lower)
}

pub fn calculate_stochastic(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    k_period: usize,
    k_smoothing: usize,
    d_period: usize,
) -> (Vec<f64>, Vec<f64>) {
    let n = closes.len();
    let mut raw_k = vec![f64::NAN; n];
    if k_period == 0 || n < k_period {
        return (raw_k.clone(), raw_k);
    }

    for i in (k_period - 1)..n {
        let window_start = i + 1 - k_period;
        let highest = highs[window_start..=i]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let lowest = lows[window_start..=i]
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
        let range = highest - lowest;
        raw_k[i] = if range > 0.0 {
            ((closes[i] - lowest) / range) * 100.0
        } else {
            // Flat window; the oscillator has no direction to report.
            50.0
        };
    }

    let k = sma_over_valid(&raw_k, k_smoothing);
    let d = sma_over_valid(&k, d_period);
    (k, d)
}

/// SMA over a column that starts with a NaN warm-up prefix, keeping NaN until
/// the window is fully inside the valid region.
fn sma_over_valid(values: &[f64], period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; values.len()];
    if period == 0 {
        return result;
    }
    for i in 0..values.len() {
        if i + 1 < period {
            continue;
        }
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        result[i] = window.iter().sum::<f64>() / period as f64;
    }
    result
}

fn true_range(high: f64, low: f64, prev_close: f64) -> f64 {
    (high - low)
        .max((high - prev_close).abs())
        .max((low - prev_close).abs())
}

/// Wilder-smoothed ATR aligned to bar indices, NaN before `period` bars of
/// history are available.
pub fn calculate_atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut atr = vec![f64::NAN; n];
    if period == 0 || n < period + 1 {
        return atr;
    }

    let mut tr_sum = 0.0f64;
    for i in 1..n {
        let tr = true_range(highs[i], lows[i], closes[i - 1]);
        if i <= period {
            tr_sum += tr;
            if i == period {
                atr[i] = tr_sum / period as f64;
            }
        } else {
            atr[i] = ((atr[i - 1] * (period as f64 - 1.0)) + tr) / period as f64;
        }
    }

    atr
}

pub fn calculate_adx(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut adx = vec![f64::NAN; n];
    if period == 0 || n < 2 * period + 1 {
        return adx;
    }

    let mut dx = vec![f64::NAN; n];
    let mut smoothed_tr = 0.0f64;
    let mut smoothed_dm_plus = 0.0f64;
    let mut smoothed_dm_minus = 0.0f64;

    for i in 1..n {
        let tr = true_range(highs[i], lows[i], closes[i - 1]);
        let up_move = highs[i] - highs[i - 1];
        let down_move = lows[i - 1] - lows[i];
        let dm_plus = if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        };
        let dm_minus = if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        };

        if i <= period {
            smoothed_tr += tr;
            smoothed_dm_plus += dm_plus;
            smoothed_dm_minus += dm_minus;
        } else {
            smoothed_tr = smoothed_tr - smoothed_tr / period as f64 + tr;
            smoothed_dm_plus = smoothed_dm_plus - smoothed_dm_plus / period as f64 + dm_plus;
            smoothed_dm_minus = smoothed_dm_minus - smoothed_dm_minus / period as f64 + dm_minus;
        }

        if i >= period {
            let di_plus = if smoothed_tr > 0.0 {
                (smoothed_dm_plus / smoothed_tr) * 100.0
            } else {
                0.0
            };
            let di_minus = if smoothed_tr > 0.0 {
                (smoothed_dm_minus / smoothed_tr) * 100.0
            } else {
                0.0
            };
            let di_sum = di_plus + di_minus;
            dx[i] = if di_sum > 0.0 {
                ((di_plus - di_minus).abs() / di_sum) * 100.0
            } else {
                0.0
            };
        }
    }

    // ADX = Wilder smoothing of DX, seeded with its first full window
    let first = 2 * period;
    let seed: f64 = dx[period..first].iter().sum::<f64>() / period as f64;
    adx[first] = ((seed * (period as f64 - 1.0)) + dx[first]) / period as f64;
    for i in (first + 1)..n {
        adx[i] = ((adx[i - 1] * (period as f64 - 1.0)) + dx[i]) / period as f64;
    }

    adx
}

pub fn calculate_obv(closes: &[f64], volumes: &[f64]) -> Vec<f64> {
    let mut obv_values = vec![0.0; closes.len()];
    for i in 1..closes.len() {
        if closes[i] > closes[i - 1] {
            obv_values[i] = obv_values[i - 1] + volumes[i];
        } else if closes[i] < closes[i - 1] {
            obv_values[i] = obv_values[i - 1] - volumes[i];
        } else {
            obv_values[i] = obv_values[i - 1];
        }
    }
    obv_values
}

/// Cumulative from series start; no session reset.
pub fn calculate_vwap(highs: &[f64], lows: &[f64], closes: &[f64], volumes: &[f64]) -> Vec<f64> {
    let mut vwap_values = Vec::with_capacity(closes.len());
    let mut cumulative_pv = 0.0;
    let mut cumulative_volume = 0.0;

    for i in 0..closes.len() {
        let typical_price = (highs[i] + lows[i] + closes[i]) / 3.0;
        cumulative_pv += typical_price * volumes[i];
        cumulative_volume += volumes[i];

        if cumulative_volume > 0.0 {
            vwap_values.push(cumulative_pv / cumulative_volume);
        } else {
            vwap_values.push(typical_price);
        }
    }

    vwap_values
}

/// One column per indicator, each aligned to the source bars.
#[derive(Debug, Clone)]
pub struct IndicatorColumns {
    pub sma_20: Vec<f64>,
    pub sma_50: Vec<f64>,
    pub ema_20: Vec<f64>,
    pub ema_50: Vec<f64>,
    pub rsi_14: Vec<f64>,
    pub macd_line: Vec<f64>,
    pub macd_signal: Vec<f64>,
    pub macd_histogram: Vec<f64>,
    pub bollinger_upper: Vec<f64>,
    pub bollinger_middle: Vec<f64>,
    pub bollinger_lower: Vec<f64>,
    pub stoch_k: Vec<f64>,
    pub stoch_d: Vec<f64>,
    pub adx_14: Vec<f64>,
    pub obv: Vec<f64>,
    pub atr_14: Vec<f64>,
    pub vwap: Vec<f64>,
}

/// Nullable latest-bar view of the indicator columns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSnapshot {
    pub close: Option<f64>,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub ema_20: Option<f64>,
    pub ema_50: Option<f64>,
    pub rsi_14: Option<f64>,
    pub macd_line: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub bollinger_upper: Option<f64>,
    pub bollinger_middle: Option<f64>,
    pub bollinger_lower: Option<f64>,
    pub stoch_k: Option<f64>,
    pub stoch_d: Option<f64>,
    pub adx_14: Option<f64>,
    pub obv: Option<f64>,
    pub atr_14: Option<f64>,
    pub vwap: Option<f64>,
}

fn value_at(column: &[f64], index: usize) -> Option<f64> {
    column.get(index).copied().filter(|v| v.is_finite())
}

impl IndicatorSnapshot {
    pub fn at_index(series: &BarSeries, columns: &IndicatorColumns, index: usize) -> Self {
        Self {
            close: series.bars().get(index).map(|b| b.close),
            sma_20: value_at(&columns.sma_20, index),
            sma_50: value_at(&columns.sma_50, index),
            ema_20: value_at(&columns.ema_20, index),
            ema_50: value_at(&columns.ema_50, index),
            rsi_14: value_at(&columns.rsi_14, index),
            macd_line: value_at(&columns.macd_line, index),
            macd_signal: value_at(&columns.macd_signal, index),
            macd_histogram: value_at(&columns.macd_histogram, index),
            bollinger_upper: value_at(&columns.bollinger_upper, index),
            bollinger_middle: value_at(&columns.bollinger_middle, index),
            bollinger_lower: value_at(&columns.bollinger_lower, index),
            stoch_k: value_at(&columns.stoch_k, index),
            stoch_d: value_at(&columns.stoch_d, index),
            adx_14: value_at(&columns.adx_14, index),
            obv: value_at(&columns.obv, index),
            atr_14: value_at(&columns.atr_14, index),
            vwap: value_at(&columns.vwap, index),
        }
    }
}

/// A bar series plus its computed indicator columns.
#[derive(Debug, Clone)]
pub struct AugmentedSeries {
    series: BarSeries,
    columns: IndicatorColumns,
}

impl AugmentedSeries {
    pub fn series(&self) -> &BarSeries {
        &self.series
    }

    pub fn columns(&self) -> &IndicatorColumns {
        &self.columns
    }

    /// Trend-filter moving-average column for the configured period, if one
    /// of the computed SMA columns covers it.
    pub fn trend_filter(&self, period: usize) -> Option<&[f64]> {
        match period {
            SMA_FAST_PERIOD => Some(&self.columns.sma_20),
            SMA_SLOW_PERIOD => Some(&self.columns.sma_50),
            _ => None,
        }
    }
}

/// Computes every indicator column walk-forward over the series and returns
/// the latest-bar snapshot alongside the augmented series. The input series
/// is cloned, never mutated.
pub fn compute_indicators(series: &BarSeries) -> (IndicatorSnapshot, AugmentedSeries) {
    let closes = series.closes();
    let highs = series.highs();
    let lows = series.lows();
    let volumes = series.volumes();

    let (macd_line, macd_signal, macd_histogram) = calculate_macd(
        &closes,
        MACD_FAST_PERIOD,
        MACD_SLOW_PERIOD,
        MACD_SIGNAL_PERIOD,
    );
    let (bollinger_upper, bollinger_middle, bollinger_lower) =
        calculate_bollinger_bands(&closes, BOLLINGER_PERIOD, BOLLINGER_STD_DEV);
    let (stoch_k, stoch_d) = calculate_stochastic(
        &highs,
        &lows,
        &closes,
        STOCH_K_PERIOD,
        STOCH_K_SMOOTHING,
        STOCH_D_PERIOD,
    );

    let columns = IndicatorColumns {
        sma_20: calculate_sma(&closes, SMA_FAST_PERIOD),
        sma_50: calculate_sma(&closes, SMA_SLOW_PERIOD),
        ema_20: calculate_ema(&closes, EMA_FAST_PERIOD),
        ema_50: calculate_ema(&closes, EMA_SLOW_PERIOD),
        rsi_14: calculate_rsi(&closes, RSI_PERIOD),
        macd_line,
        macd_signal,
        macd_histogram,
        bollinger_upper,
        bollinger_middle,
        bollinger_lower,
        stoch_k,
        stoch_d,
        adx_14: calculate_adx(&highs, &lows, &closes, ADX_PERIOD),
        obv: calculate_obv(&closes, &volumes),
        atr_14: calculate_atr(&highs, &lows, &closes, ATR_PERIOD),
        vwap: calculate_vwap(&highs, &lows, &closes, &volumes),
    };

    let snapshot = if series.is_empty() {
        IndicatorSnapshot::default()
    } else {
        IndicatorSnapshot::at_index(series, &columns, series.len() - 1)
    };

    let augmented = AugmentedSeries {
        series: series.clone(),
        columns,
    };

    (snapshot, augmented)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bar, BarSeries, Timeframe};
    use chrono::{Duration, TimeZone, Utc};

    fn series_from_closes(closes: &[f64]) -> BarSeries {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: base + Duration::days(i as i64),
                open: close,
                high: close + 1.0,
                low: (close - 1.0).max(0.0),
                close,
                volume: 1_000.0,
            })
            .collect();
        BarSeries::new(Timeframe::Daily, bars).unwrap()
    }

    #[test]
    fn sma_warm_up_is_nan_then_rolls() {
        let values = calculate_sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert!(values[0].is_nan());
        assert!(values[1].is_nan());
        assert!((values[2] - 2.0).abs() < 1e-9);
        assert!((values[4] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_is_nan_until_period_and_bounded_after() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i % 7) as f64).collect();
        let rsi = calculate_rsi(&closes, RSI_PERIOD);
        for value in &rsi[..RSI_PERIOD] {
            assert!(value.is_nan());
        }
        for value in &rsi[RSI_PERIOD..] {
            assert!((0.0..=100.0).contains(value));
        }
    }

    #[test]
    fn atr_follows_wilder_smoothing() {
        let n = 20;
        let highs = vec![12.0; n];
        let lows = vec![10.0; n];
        let closes = vec![11.0; n];
        let atr = calculate_atr(&highs, &lows, &closes, ATR_PERIOD);
        assert!(atr[ATR_PERIOD - 1].is_nan());
        // Constant 2-point true range settles at 2.0
        assert!((atr[ATR_PERIOD] - 2.0).abs() < 1e-9);
        assert!((atr[n - 1] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn vwap_is_cumulative_from_series_start() {
        let vwap = calculate_vwap(
            &[11.0, 21.0],
            &[9.0, 19.0],
            &[10.0, 20.0],
            &[100.0, 300.0],
        );
        assert!((vwap[0] - 10.0).abs() < 1e-9);
        // (10*100 + 20*300) / 400
        assert!((vwap[1] - 17.5).abs() < 1e-9);
    }

    #[test]
    fn snapshot_masks_unwarmed_indicators() {
        let series = series_from_closes(&[100.0, 101.0, 102.0]);
        let (snapshot, _) = compute_indicators(&series);
        assert!(snapshot.sma_20.is_none());
        assert!(snapshot.rsi_14.is_none());
        assert!(snapshot.atr_14.is_none());
        assert!(snapshot.close.is_some());
        assert!(snapshot.obv.is_some());
        assert!(snapshot.vwap.is_some());
    }

    #[test]
    fn indicators_have_no_lookahead() {
        let mut closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64).sin() * 5.0 + i as f64 * 0.1).collect();
        let series = series_from_closes(&closes);
        let (_, augmented) = compute_indicators(&series);
        let probe = 60;

        // Altering every bar after the probe index must not change values at it.
        for value in closes.iter_mut().skip(probe + 1) {
            *value += 40.0;
        }
        let altered = series_from_closes(&closes);
        let (_, altered_augmented) = compute_indicators(&altered);

        let pairs = [
            (&augmented.columns.sma_20, &altered_augmented.columns.sma_20),
            (&augmented.columns.ema_50, &altered_augmented.columns.ema_50),
            (&augmented.columns.rsi_14, &altered_augmented.columns.rsi_14),
            (
                &augmented.columns.macd_line,
                &altered_augmented.columns.macd_line,
            ),
            (
                &augmented.columns.bollinger_upper,
                &altered_augmented.columns.bollinger_upper,
            ),
            (&augmented.columns.stoch_d, &altered_augmented.columns.stoch_d),
            (&augmented.columns.adx_14, &altered_augmented.columns.adx_14),
            (&augmented.columns.atr_14, &altered_augmented.columns.atr_14),
            (&augmented.columns.vwap, &altered_augmented.columns.vwap),
        ];
        for (before, after) in pairs {
            for i in 0..=probe {
                let same = (before[i].is_nan() && after[i].is_nan())
                    || (before[i] - after[i]).abs() < 1e-9;
                assert!(same, "column diverged at index {}", i);
            }
        }
    }

    #[test]
    fn recomputation_is_idempotent() {
        let series = series_from_closes(&(0..60).map(|i| 100.0 + i as f64).collect::<Vec<_>>());
        let (first, _) = compute_indicators(&series);
        let (second, _) = compute_indicators(&series);
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }
}
