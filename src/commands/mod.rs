pub mod analyze;
pub mod backtest;
pub mod export_snapshot;
