use anyhow::Result;
use candlecraft::commands::{analyze, backtest, export_snapshot};
use candlecraft::models::Timeframe;
use candlecraft::param_utils::parse_parameter_map_from_json;
use clap::{Parser, Subcommand};
use log::info;
use std::collections::HashMap;
use std::path::PathBuf;

const DEFAULT_MARKET_DATA_FILE: &str = "data/market-data.bin";

#[derive(Parser)]
#[command(name = "candlecraft")]
#[command(about = "Multi-timeframe price-action analysis and backtesting tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze key levels, indicators, and candle patterns per timeframe
    Analyze {
        /// Path to the market data snapshot file (.bin or .json)
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: Option<PathBuf>,
        /// Restrict the analysis to a single symbol
        #[arg(long)]
        symbol: Option<String>,
        /// Analysis parameters as a JSON object, e.g. '{"trendFilterPeriod": 50}'
        #[arg(long)]
        params: Option<String>,
        /// Destination file for the JSON output (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Generate price-action signals and backtest them per symbol
    Backtest {
        /// Path to the market data snapshot file (.bin or .json)
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: Option<PathBuf>,
        /// Restrict the backtest to a single symbol
        #[arg(long)]
        symbol: Option<String>,
        /// Timeframe the signals are generated on
        #[arg(long, default_value = "daily")]
        timeframe: String,
        /// Signal and risk parameters as a JSON object, e.g. '{"stopLossMode": 1}'
        #[arg(long)]
        params: Option<String>,
        /// Destination file for the JSON results
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Convert a JSON bar file into the compact snapshot format
    ExportSnapshot {
        /// Source JSON file with bar records
        input: PathBuf,
        /// Destination file for the snapshot
        #[arg(short, long, value_name = "PATH")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting candlecraft. Not financial advice. Use at your own risk.");

    match cli.command {
        Commands::Analyze {
            data_file,
            symbol,
            params,
            output,
        } => {
            let data_file = resolve_market_data_path(data_file);
            let parameters = parse_parameters(params.as_deref())?;
            analyze::run(
                &data_file,
                symbol.as_deref(),
                &parameters,
                output.as_deref(),
            )?;
        }
        Commands::Backtest {
            data_file,
            symbol,
            timeframe,
            params,
            output,
        } => {
            let data_file = resolve_market_data_path(data_file);
            let timeframe: Timeframe = timeframe.parse()?;
            let parameters = parse_parameters(params.as_deref())?;
            backtest::run(
                &data_file,
                symbol.as_deref(),
                timeframe,
                &parameters,
                output.as_deref(),
            )?;
        }
        Commands::ExportSnapshot { input, output } => {
            export_snapshot::run(&input, &output)?;
        }
    }

    Ok(())
}

fn resolve_market_data_path(cli_value: Option<PathBuf>) -> PathBuf {
    cli_value.unwrap_or_else(|| PathBuf::from(DEFAULT_MARKET_DATA_FILE))
}

fn parse_parameters(raw: Option<&str>) -> Result<HashMap<String, f64>> {
    match raw {
        Some(json) => parse_parameter_map_from_json(json),
        None => Ok(HashMap::new()),
    }
}
