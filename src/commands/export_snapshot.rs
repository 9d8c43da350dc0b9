use crate::snapshot::{load_snapshot, save_snapshot, MarketData};
use anyhow::Result;
use log::info;
use std::path::Path;

/// Converts a JSON bar file into the compact bincode snapshot, validating
/// every series before anything is written.
pub fn run(input: &Path, output: &Path) -> Result<()> {
    let snapshot = load_snapshot(input)?;
    let data = MarketData::from_snapshot(&snapshot)?;

    save_snapshot(output, &snapshot)?;
    info!(
        "Exported {} bar records across {} symbols to {}",
        snapshot.records.len(),
        data.symbols().len(),
        output.display()
    );
    Ok(())
}
