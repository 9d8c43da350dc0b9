use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Error)]
pub enum SeriesError {
    #[error("bar {index}: timestamp {timestamp} is not after {previous}")]
    NonMonotonicTimestamp {
        index: usize,
        timestamp: DateTime<Utc>,
        previous: DateTime<Utc>,
    },
    #[error("bar {index}: field {field} is not a finite non-negative number ({value})")]
    InvalidField {
        index: usize,
        field: &'static str,
        value: f64,
    },
    #[error("bar {index}: high {high} / low {low} do not envelope open {open} and close {close}")]
    InvertedEnvelope {
        index: usize,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "4hour")]
    FourHour,
    #[serde(rename = "1hour")]
    OneHour,
    #[serde(rename = "5min")]
    FiveMinute,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Daily => "daily",
            Timeframe::FourHour => "4hour",
            Timeframe::OneHour => "1hour",
            Timeframe::FiveMinute => "5min",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "1day" | "day" => Ok(Timeframe::Daily),
            "4hour" | "4h" => Ok(Timeframe::FourHour),
            "1hour" | "1h" | "hour" => Ok(Timeframe::OneHour),
            "5min" | "5m" => Ok(Timeframe::FiveMinute),
            other => Err(anyhow!("Unknown timeframe '{}'", other)),
        }
    }
}

/// An immutable, validated, strictly time-ordered bar sequence for one
/// timeframe. Construction through `new` is the only way to build one.
#[derive(Debug, Clone)]
pub struct BarSeries {
    timeframe: Timeframe,
    bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new(timeframe: Timeframe, bars: Vec<Bar>) -> Result<Self, SeriesError> {
        for (index, bar) in bars.iter().enumerate() {
            for (field, value) in [
                ("open", bar.open),
                ("high", bar.high),
                ("low", bar.low),
                ("close", bar.close),
                ("volume", bar.volume),
            ] {
                if !value.is_finite() || value < 0.0 {
                    return Err(SeriesError::InvalidField {
                        index,
                        field,
                        value,
                    });
                }
            }
            if bar.high < bar.open.max(bar.close) || bar.low > bar.open.min(bar.close) {
                return Err(SeriesError::InvertedEnvelope {
                    index,
                    open: bar.open,
                    high: bar.high,
                    low: bar.low,
                    close: bar.close,
                });
            }
            if index > 0 {
                let previous = bars[index - 1].timestamp;
                if bar.timestamp <= previous {
                    return Err(SeriesError::NonMonotonicTimestamp {
                        index,
                        timestamp: bar.timestamp,
                        previous,
                    });
                }
            }
        }

        Ok(Self { timeframe, bars })
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }

    /// +1 for long, -1 for short; used in pnl arithmetic.
    pub fn signum(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" => Ok(Direction::Long),
            "short" => Ok(Direction::Short),
            other => Err(anyhow!("Unknown direction '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendLabel {
    Uptrend,
    Downtrend,
    Unknown,
}

impl TrendLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendLabel::Uptrend => "uptrend",
            TrendLabel::Downtrend => "downtrend",
            TrendLabel::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub strategy: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub direction: Direction,
    pub entry_price: f64,
    pub entry_timestamp: DateTime<Utc>,
    pub stop_price: f64,
    pub take_profit_price: f64,
    pub size: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedTrade {
    pub direction: Direction,
    pub strategy: String,
    pub entry_timestamp: DateTime<Utc>,
    pub exit_timestamp: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    pub gross_pnl: f64,
    pub net_pnl: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestSummary {
    pub win_rate: f64,
    pub total_trades: i32,
    pub average_pnl: f64,
    pub total_pnl: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
}

impl BacktestSummary {
    pub fn zero() -> Self {
        Self {
            win_rate: 0.0,
            total_trades: 0,
            average_pnl: 0.0,
            total_pnl: 0.0,
            sharpe_ratio: 0.0,
            max_drawdown: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResult {
    pub id: String,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub initial_cash: f64,
    pub final_equity: f64,
    pub summary: BacktestSummary,
    pub trades: Vec<ClosedTrade>,
    pub equity_curve: Vec<EquityPoint>,
}

pub fn generate_run_id() -> String {
    Uuid::new_v4().to_string()
}
