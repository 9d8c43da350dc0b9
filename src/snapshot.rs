use crate::models::{Bar, BarSeries, Timeframe};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

pub const MARKET_DATA_SNAPSHOT_VERSION: u32 = 1;

/// One bar of one symbol on one timeframe, as stored in a snapshot file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarRecord {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// On-disk market data container: bincode for the compact snapshot, JSON for
/// the human-editable import format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataSnapshot {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub records: Vec<BarRecord>,
}

impl MarketDataSnapshot {
    pub fn from_records(records: Vec<BarRecord>) -> Self {
        Self {
            version: MARKET_DATA_SNAPSHOT_VERSION,
            generated_at: Utc::now(),
            records,
        }
    }
}

/// Normalizes a symbol string by trimming whitespace and uppercasing.
pub fn normalize_symbol(value: &str) -> Option<String> {
    let normalized = value.trim().to_uppercase();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Validated per-symbol, per-timeframe bar series built from a snapshot.
#[derive(Debug, Clone)]
pub struct MarketData {
    series: BTreeMap<String, BTreeMap<Timeframe, BarSeries>>,
}

impl MarketData {
    /// Groups snapshot records by normalized symbol and timeframe, sorts each
    /// group by timestamp, and validates it as a BarSeries. A malformed group
    /// fails with an error naming the symbol and timeframe.
    pub fn from_snapshot(snapshot: &MarketDataSnapshot) -> Result<Self> {
        if snapshot.version != MARKET_DATA_SNAPSHOT_VERSION {
            return Err(anyhow!(
                "Unsupported market data snapshot version {} (expected {})",
                snapshot.version,
                MARKET_DATA_SNAPSHOT_VERSION
            ));
        }

        let mut grouped: BTreeMap<(String, Timeframe), Vec<Bar>> = BTreeMap::new();
        for record in &snapshot.records {
            let Some(symbol) = normalize_symbol(&record.symbol) else {
                warn!("Skipping bar record with an empty symbol");
                continue;
            };
            grouped.entry((symbol, record.timeframe)).or_default().push(Bar {
                timestamp: record.timestamp,
                open: record.open,
                high: record.high,
                low: record.low,
                close: record.close,
                volume: record.volume,
            });
        }

        let mut series: BTreeMap<String, BTreeMap<Timeframe, BarSeries>> = BTreeMap::new();
        for ((symbol, timeframe), mut bars) in grouped {
            bars.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
            let validated = BarSeries::new(timeframe, bars)
                .with_context(|| format!("invalid {} {} series", symbol, timeframe))?;
            series.entry(symbol).or_default().insert(timeframe, validated);
        }

        Ok(Self { series })
    }

    pub fn has_data(&self) -> bool {
        !self.series.is_empty()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.series.keys().cloned().collect()
    }

    pub fn series_for(&self, symbol: &str, timeframe: Timeframe) -> Option<&BarSeries> {
        self.series.get(symbol).and_then(|by_tf| by_tf.get(&timeframe))
    }

    pub fn timeframes_for(&self, symbol: &str) -> Option<&BTreeMap<Timeframe, BarSeries>> {
        self.series.get(symbol)
    }
}

fn is_json_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Reads a snapshot file, decoding JSON or bincode by file extension.
pub fn load_snapshot(path: &Path) -> Result<MarketDataSnapshot> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open market data file {}", path.display()))?;
    let reader = BufReader::new(file);
    let snapshot: MarketDataSnapshot = if is_json_path(path) {
        serde_json::from_reader(reader)
            .with_context(|| format!("Snapshot JSON decode failed for {}", path.display()))?
    } else {
        bincode::deserialize_from(reader)
            .with_context(|| format!("Snapshot decode failed for {}", path.display()))?
    };
    Ok(snapshot)
}

/// Writes the compact bincode snapshot.
pub fn save_snapshot(path: &Path, snapshot: &MarketDataSnapshot) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create snapshot file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    bincode::serialize_into(&mut writer, snapshot)
        .context("Failed to serialize market data snapshot")?;
    writer.flush().context("Failed to flush snapshot file")?;
    Ok(())
}

pub fn load_market_data(path: &Path) -> Result<MarketData> {
    let snapshot = load_snapshot(path)?;
    MarketData::from_snapshot(&snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn record(symbol: &str, timeframe: Timeframe, offset: i64, close: f64) -> BarRecord {
        BarRecord {
            symbol: symbol.to_string(),
            timeframe,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + Duration::minutes(offset),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 500.0,
        }
    }

    #[test]
    fn groups_and_sorts_records_per_symbol_and_timeframe() {
        let snapshot = MarketDataSnapshot::from_records(vec![
            record("aapl", Timeframe::Daily, 2_880, 102.0),
            record("AAPL", Timeframe::Daily, 0, 100.0),
            record("AAPL", Timeframe::Daily, 1_440, 101.0),
            record("msft", Timeframe::OneHour, 0, 400.0),
        ]);
        let data = MarketData::from_snapshot(&snapshot).unwrap();

        assert_eq!(data.symbols(), vec!["AAPL".to_string(), "MSFT".to_string()]);
        let daily = data.series_for("AAPL", Timeframe::Daily).unwrap();
        assert_eq!(daily.len(), 3);
        assert!((daily.bars()[0].close - 100.0).abs() < 1e-9);
        assert!((daily.bars()[2].close - 102.0).abs() < 1e-9);
        assert!(data.series_for("MSFT", Timeframe::Daily).is_none());
        assert!(data.series_for("MSFT", Timeframe::OneHour).is_some());
    }

    #[test]
    fn duplicate_timestamps_fail_with_symbol_context() {
        let snapshot = MarketDataSnapshot::from_records(vec![
            record("AAPL", Timeframe::Daily, 0, 100.0),
            record("AAPL", Timeframe::Daily, 0, 101.0),
        ]);
        let error = MarketData::from_snapshot(&snapshot).unwrap_err();
        assert!(format!("{:#}", error).contains("AAPL daily"));
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let mut snapshot = MarketDataSnapshot::from_records(Vec::new());
        snapshot.version = 99;
        assert!(MarketData::from_snapshot(&snapshot).is_err());
    }

    #[test]
    fn snapshot_round_trips_through_bincode() {
        let snapshot = MarketDataSnapshot::from_records(vec![record(
            "AAPL",
            Timeframe::FiveMinute,
            0,
            100.0,
        )]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("market-data.bin");
        save_snapshot(&path, &snapshot).unwrap();

        let loaded = load_snapshot(&path).unwrap();
        assert_eq!(loaded.version, MARKET_DATA_SNAPSHOT_VERSION);
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.records[0].symbol, "AAPL");
    }
}
