//! Extract command: captured JSON pages to a CSV summary.

use std::path::Path;

use anyhow::Context;

use crate::cli::icons::{dim_arrow, success, warn};
use crate::config::Config;
use crate::services::{load_all_data, write_csv, SortMode, WriteOutcome};

pub const DEFAULT_SUMMARY_FILE: &str = "reels_summary.csv";

pub async fn cmd_extract(
    config_path: Option<&Path>,
    output: &Path,
    sort: &[SortMode],
    raw: bool,
    dir: Option<&Path>,
) -> anyhow::Result<()> {
    let capture_dir = match dir {
        Some(dir) => dir.to_path_buf(),
        None => Config::load(config_path).await?.output_dir(),
    };

    let records = load_all_data(&capture_dir)
        .await
        .with_context(|| format!("Failed to read captures from {}", capture_dir.display()))?;

    match write_csv(records, sort, !raw, output)? {
        WriteOutcome::Nothing => {
            println!("{} No data to write.", warn());
            println!(
                "  {} No reels found in {}",
                dim_arrow(),
                capture_dir.display()
            );
        }
        WriteOutcome::Written { rows, path } => {
            println!("{} Wrote {} rows to {}", success(), rows, path.display());
        }
    }

    Ok(())
}
