//! Service layer for the reels pipeline.
//!
//! This module contains domain logic separated from UI concerns.
//! Services report progress through event channels and return their tallies.

pub mod capture;
pub mod download;
pub mod extract;
pub mod summary;

pub use capture::{
    CaptureError, CaptureEvent, CaptureReport, CaptureService, CaptureStore, CaptureTiming,
    ScrapeSession,
};
pub use download::{
    read_targets_csv, DownloadConfig, DownloadError, DownloadEvent, DownloadService,
    DownloadStatus, DownloadSummary, DownloadTarget, MediaFetcher, YtDlpFetcher,
};
pub use extract::{extract_from_payload, extract_media_info, load_all_data, ReelRecord};
pub use summary::{write_csv, SortMode, WriteOutcome};
