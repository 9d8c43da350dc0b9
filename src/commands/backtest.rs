use crate::commands::analyze::resolve_symbols;
use crate::config::{AnalysisConfig, BacktestConfig};
use crate::engine::BacktestEngine;
use crate::indicators::compute_indicators;
use crate::key_levels::compute_key_levels;
use crate::models::{BacktestResult, Timeframe};
use crate::signals::generate_signals;
use crate::snapshot::{load_market_data, MarketData};
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;

struct SymbolBacktestResultMsg {
    symbol: String,
    run: Result<BacktestResult, String>,
}

/// Generates signals and backtests them per symbol over a worker pool.
pub fn run(
    data_file: &Path,
    symbol: Option<&str>,
    timeframe: Timeframe,
    parameters: &HashMap<String, f64>,
    output: Option<&Path>,
) -> Result<()> {
    let market = Arc::new(load_market_data(data_file)?);
    if !market.has_data() {
        warn!("No market data available to run backtests.");
        return Ok(());
    }
    let analysis_config = AnalysisConfig::from_parameters(parameters);
    let backtest_config = BacktestConfig::from_parameters(parameters);

    let symbols = resolve_symbols(market.symbols(), symbol)?;
    let total = symbols.len();
    let num_workers = std::cmp::min(total, std::cmp::max(1, num_cpus::get()));
    info!(
        "Backtesting {} symbol{} on the {} timeframe with {} worker thread{}",
        total,
        if total == 1 { "" } else { "s" },
        timeframe,
        num_workers,
        if num_workers == 1 { "" } else { "s" }
    );

    let (task_tx, task_rx): (Sender<String>, Receiver<String>) = bounded(total);
    let (result_tx, result_rx): (
        Sender<SymbolBacktestResultMsg>,
        Receiver<SymbolBacktestResultMsg>,
    ) = bounded(total);

    let mut handles = Vec::new();
    for _ in 0..num_workers {
        let rx = task_rx.clone();
        let result_tx = result_tx.clone();
        let market = Arc::clone(&market);
        let analysis_config = analysis_config.clone();
        let backtest_config = backtest_config.clone();

        let handle = thread::spawn(move || {
            while let Ok(symbol) = rx.recv() {
                let run = run_symbol_backtest(
                    &market,
                    &symbol,
                    timeframe,
                    &analysis_config,
                    &backtest_config,
                )
                .map_err(|e| e.to_string());
                if result_tx.send(SymbolBacktestResultMsg { symbol, run }).is_err() {
                    break;
                }
            }
        });
        handles.push(handle);
    }

    for symbol in &symbols {
        task_tx.send(symbol.clone())?;
    }
    drop(task_tx);
    drop(result_tx);

    let progress = ProgressBar::new(total as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut results: Vec<BacktestResult> = Vec::with_capacity(total);
    let mut failures: Vec<String> = Vec::new();
    while let Ok(message) = result_rx.recv() {
        progress.inc(1);
        match message.run {
            Ok(result) => {
                info!(
                    "{}: {} trade(s), win rate {:.1}%, total pnl {:.2}, sharpe {:.2}, max drawdown {:.1}%",
                    message.symbol,
                    result.summary.total_trades,
                    result.summary.win_rate * 100.0,
                    result.summary.total_pnl,
                    result.summary.sharpe_ratio,
                    result.summary.max_drawdown
                );
                results.push(result);
            }
            Err(error) => {
                warn!("Backtest failed for {}: {}", message.symbol, error);
                failures.push(format!("{} ({})", message.symbol, error));
            }
        }
    }
    progress.finish_and_clear();

    for handle in handles {
        let _ = handle.join();
    }

    results.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    if let Some(path) = output {
        let file = File::create(path)
            .with_context(|| format!("Failed to create output file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &results)?;
        writer.flush()?;
        info!("Wrote {} backtest result(s) to {}", results.len(), path.display());
    }

    if !failures.is_empty() {
        warn!(
            "Backtesting completed with {} failure{}: {}",
            failures.len(),
            if failures.len() == 1 { "" } else { "s" },
            failures.join(", ")
        );
    }

    Ok(())
}

/// One symbol's full pipeline: key levels from the daily series, indicator
/// augmentation and signals on the requested timeframe, then the engine run.
pub fn run_symbol_backtest(
    market: &MarketData,
    symbol: &str,
    timeframe: Timeframe,
    analysis_config: &AnalysisConfig,
    backtest_config: &BacktestConfig,
) -> Result<BacktestResult> {
    let series = market
        .series_for(symbol, timeframe)
        .ok_or_else(|| anyhow!("No {} series available for {}", timeframe, symbol))?;
    let key_levels = market
        .series_for(symbol, Timeframe::Daily)
        .map(compute_key_levels)
        .unwrap_or_default();

    let (_, augmented) = compute_indicators(series);
    let signals = generate_signals(&augmented, &key_levels, &analysis_config.signal);
    let engine = BacktestEngine::new(backtest_config.clone());
    Ok(engine.run(symbol, series, &signals))
}
