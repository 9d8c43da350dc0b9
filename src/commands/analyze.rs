use crate::analysis::{analyze_symbol, AnalysisSnapshot};
use crate::config::AnalysisConfig;
use crate::snapshot::{load_market_data, normalize_symbol};
use anyhow::{anyhow, Context, Result};
use log::info;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Runs the multi-timeframe analysis for one or every symbol of a snapshot
/// and writes the result as JSON to stdout or a file.
pub fn run(
    data_file: &Path,
    symbol: Option<&str>,
    parameters: &HashMap<String, f64>,
    output: Option<&Path>,
) -> Result<()> {
    let market = load_market_data(data_file)?;
    if !market.has_data() {
        info!("Market data file contains no bars; nothing to analyze.");
        return Ok(());
    }
    let config = AnalysisConfig::from_parameters(parameters);

    let symbols = resolve_symbols(market.symbols(), symbol)?;
    info!(
        "Analyzing {} symbol{} from {}",
        symbols.len(),
        if symbols.len() == 1 { "" } else { "s" },
        data_file.display()
    );

    let snapshots: Vec<AnalysisSnapshot> = symbols
        .par_iter()
        .filter_map(|symbol| {
            market
                .timeframes_for(symbol)
                .map(|series| analyze_symbol(symbol, series, &config))
        })
        .collect();

    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &snapshots)?;
            writer.flush()?;
            info!("Wrote analysis for {} symbols to {}", snapshots.len(), path.display());
        }
        None => {
            let stdout = io::stdout();
            serde_json::to_writer_pretty(stdout.lock(), &snapshots)?;
            println!();
        }
    }

    Ok(())
}

pub(crate) fn resolve_symbols(
    available: Vec<String>,
    requested: Option<&str>,
) -> Result<Vec<String>> {
    match requested {
        Some(raw) => {
            let symbol = normalize_symbol(raw)
                .ok_or_else(|| anyhow!("Symbol filter must not be empty"))?;
            if !available.contains(&symbol) {
                return Err(anyhow!("Symbol {} not present in the market data", symbol));
            }
            Ok(vec![symbol])
        }
        None => Ok(available),
    }
}
