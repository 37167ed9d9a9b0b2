//! CSV summary of extracted reels.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use super::extract::ReelRecord;
use crate::utils::{format_engagement, humanize_count};

/// Column order of the summary file.
pub const SUMMARY_HEADER: [&str; 4] = ["url", "plays", "likes", "engagement_rate"];

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("Failed to write summary {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to write summary {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Sort key for summary rows. Every key sorts descending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SortMode {
    /// Keep extraction order
    #[default]
    None,
    /// Most played first
    Plays,
    /// Most liked first
    Likes,
    /// Highest engagement rate first
    Engagement,
}

impl SortMode {
    fn compare(self, a: &ReelRecord, b: &ReelRecord) -> Ordering {
        match self {
            SortMode::None => Ordering::Equal,
            SortMode::Plays => b.plays.cmp(&a.plays),
            SortMode::Likes => b.likes.cmp(&a.likes),
            SortMode::Engagement => b.engagement_rate.total_cmp(&a.engagement_rate),
        }
    }
}

/// Stable sort by the given keys in priority order.
pub fn sort_records(records: &mut [ReelRecord], keys: &[SortMode]) {
    if keys.iter().all(|k| *k == SortMode::None) {
        return;
    }
    records.sort_by(|a, b| {
        keys.iter()
            .map(|key| key.compare(a, b))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    });
}

/// Result of [`write_csv`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// No records; no file was created.
    Nothing,
    Written { rows: usize, path: PathBuf },
}

/// Render one record as CSV fields. Counts are humanized on request.
pub fn render_row(record: &ReelRecord, humanize: bool) -> [String; 4] {
    let count = |n: u64| {
        if humanize {
            humanize_count(n)
        } else {
            n.to_string()
        }
    };
    [
        record.url.clone(),
        count(record.plays),
        count(record.likes),
        format_engagement(record.engagement_rate),
    ]
}

/// Sort `records` and write them to `path`.
///
/// Sorting happens on raw counts before any humanization.
pub fn write_csv(
    mut records: Vec<ReelRecord>,
    sorts: &[SortMode],
    humanize: bool,
    path: &Path,
) -> Result<WriteOutcome, SummaryError> {
    if records.is_empty() {
        info!("No data to write");
        return Ok(WriteOutcome::Nothing);
    }

    sort_records(&mut records, sorts);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| SummaryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    }

    let csv_err = |source| SummaryError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    writer.write_record(SUMMARY_HEADER).map_err(csv_err)?;
    for record in &records {
        writer
            .write_record(render_row(record, humanize))
            .map_err(csv_err)?;
    }
    writer.flush().map_err(|source| SummaryError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    info!("Wrote {} rows to {}", records.len(), path.display());
    Ok(WriteOutcome::Written {
        rows: records.len(),
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn records() -> Vec<ReelRecord> {
        vec![
            ReelRecord::new("instagram.com/reel/small/", 2300, 115),
            ReelRecord::new("instagram.com/reel/big/", 1_500_000, 3000),
            ReelRecord::new("instagram.com/reel/mid/", 12600, 115),
        ]
    }

    fn urls(records: &[ReelRecord]) -> Vec<&str> {
        records.iter().map(|r| r.url.as_str()).collect()
    }

    #[test]
    fn test_sort_modes() {
        let mut rows = records();
        sort_records(&mut rows, &[SortMode::None]);
        assert_eq!(urls(&rows)[0], "instagram.com/reel/small/");

        sort_records(&mut rows, &[SortMode::Plays]);
        assert_eq!(
            urls(&rows),
            ["instagram.com/reel/big/", "instagram.com/reel/mid/", "instagram.com/reel/small/"]
        );

        sort_records(&mut rows, &[SortMode::Engagement]);
        assert_eq!(urls(&rows)[0], "instagram.com/reel/small/");
    }

    #[test]
    fn test_combined_keys_break_ties() {
        let mut rows = records();
        // small and mid tie on likes; plays decides
        sort_records(&mut rows, &[SortMode::Likes, SortMode::Plays]);
        assert_eq!(
            urls(&rows),
            ["instagram.com/reel/big/", "instagram.com/reel/mid/", "instagram.com/reel/small/"]
        );

        // Stable when every key ties
        let mut tied = vec![
            ReelRecord::new("a", 10, 1),
            ReelRecord::new("b", 10, 1),
        ];
        sort_records(&mut tied, &[SortMode::Plays, SortMode::Likes]);
        assert_eq!(urls(&tied), ["a", "b"]);
    }

    #[test]
    fn test_plays_order_survives_humanizing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reels_summary.csv");

        let outcome = write_csv(records(), &[SortMode::Plays], true, &path).unwrap();
        assert_eq!(
            outcome,
            WriteOutcome::Written {
                rows: 3,
                path: path.clone()
            }
        );

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "url,plays,likes,engagement_rate");
        assert_eq!(lines[1], "instagram.com/reel/big/,1.5M,3K,0.20%");
        assert_eq!(lines[2], "instagram.com/reel/mid/,13K,115,0.91%");
        assert_eq!(lines[3], "instagram.com/reel/small/,2K,115,5.00%");
    }

    #[test]
    fn test_raw_counts() {
        let row = render_row(&ReelRecord::new("u", 2300, 115), false);
        assert_eq!(row, ["u", "2300", "115", "5.00%"].map(String::from));
    }

    #[test]
    fn test_empty_input_creates_no_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reels_summary.csv");

        let outcome = write_csv(Vec::new(), &[SortMode::Plays], true, &path).unwrap();
        assert_eq!(outcome, WriteOutcome::Nothing);
        assert!(!path.exists());
    }
}
