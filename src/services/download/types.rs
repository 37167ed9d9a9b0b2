//! Download service types and events.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Configuration for download service.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadConfig {
    pub output_dir: PathBuf,
    /// Bounds of the random pause after each fetch.
    pub delay_min: Duration,
    pub delay_max: Duration,
    /// Hosts (and their subdomains) accepted for download.
    pub allowed_hosts: Vec<String>,
}

/// One URL to fetch, optionally labelled (the play count in CSV mode).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub url: String,
    pub label: Option<String>,
}

impl DownloadTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            label: None,
        }
    }

    pub fn with_label(url: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            label: Some(label.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Success,
    Failed,
    Skipped,
}

/// Outcome of a single target.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadResult {
    pub reel_id: String,
    pub status: DownloadStatus,
    pub error_detail: Option<String>,
}

/// Tally of a download run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl DownloadSummary {
    pub fn record(&mut self, status: DownloadStatus) {
        match status {
            DownloadStatus::Success => self.success += 1,
            DownloadStatus::Failed => self.failed += 1,
            DownloadStatus::Skipped => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.success + self.failed + self.skipped
    }
}

/// Events emitted during download operations.
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    /// Fetch started for a target
    Started {
        index: usize,
        total: usize,
        reel_id: String,
    },
    /// Target finished (fetched, skipped or failed)
    Finished { index: usize, result: DownloadResult },
    /// Stop requested; remaining targets were not processed
    Stopped { remaining: usize },
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("{} has no `{column}` column", path.display())]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("Failed to read {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to create output directory {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
