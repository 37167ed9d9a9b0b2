//! Reel metrics extraction from captured feed pages.
//!
//! Captured payloads are treated as untrusted: every key along the path to a
//! media object may be missing or of the wrong type, and such gaps turn into
//! defaults rather than errors.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::utils::reel_url;

/// Key of the paginated reels connection inside `data`.
const CLIPS_CONNECTION: &str = "xdt_api__v1__clips__user__connection_v2";

/// Prefix of GraphQL capture files.
const QUERY_FILE_PREFIX: &str = "query_";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Capture directory not found: {}", .0.display())]
    MissingDir(PathBuf),

    #[error("Failed to read capture directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One reel with raw counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReelRecord {
    pub url: String,
    pub plays: u64,
    pub likes: u64,
    pub engagement_rate: f64,
}

impl ReelRecord {
    pub fn new(url: impl Into<String>, plays: u64, likes: u64) -> Self {
        Self {
            url: url.into(),
            plays,
            likes,
            engagement_rate: engagement_rate(plays, likes),
        }
    }
}

/// Likes per play as a percentage rounded to two decimals; `0.0` without plays.
pub fn engagement_rate(plays: u64, likes: u64) -> f64 {
    if plays == 0 {
        return 0.0;
    }
    let rate = likes as f64 / plays as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

/// Lenient view over a `media` object.
#[derive(Debug, Clone, Copy)]
pub struct MediaNode<'a>(&'a Value);

impl<'a> MediaNode<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self(value)
    }

    pub fn code(&self) -> Option<&'a str> {
        self.0
            .get("code")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
    }

    pub fn play_count(&self) -> u64 {
        count(self.0.get("play_count"))
    }

    pub fn like_count(&self) -> u64 {
        count(self.0.get("like_count"))
    }

    pub fn to_record(&self) -> ReelRecord {
        let url = self.code().map(reel_url).unwrap_or_default();
        ReelRecord::new(url, self.play_count(), self.like_count())
    }
}

/// Counts sometimes arrive as floats or strings; anything unusable is 0.
fn count(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Extract one record per edge of the reels connection.
pub fn extract_from_payload(payload: &Value) -> Vec<ReelRecord> {
    let edges = payload
        .get("data")
        .and_then(|d| d.get(CLIPS_CONNECTION))
        .and_then(|c| c.get("edges"))
        .and_then(Value::as_array);

    let Some(edges) = edges else {
        return Vec::new();
    };

    static EMPTY: Value = Value::Null;
    edges
        .iter()
        .map(|edge| {
            let media = edge
                .get("node")
                .and_then(|n| n.get("media"))
                .unwrap_or(&EMPTY);
            MediaNode::new(media).to_record()
        })
        .collect()
}

/// Extract records from one capture file.
///
/// Read and parse failures are logged and yield no records.
pub async fn extract_media_info(path: &Path) -> Vec<ReelRecord> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) => {
            warn!("Error reading {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    match serde_json::from_str::<Value>(&content) {
        Ok(payload) => extract_from_payload(&payload),
        Err(e) => {
            warn!("Error parsing {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// Extract records from every `query_*.json` file in `dir`.
pub async fn load_all_data(dir: &Path) -> Result<Vec<ReelRecord>, ExtractError> {
    if !dir.is_dir() {
        return Err(ExtractError::MissingDir(dir.to_path_buf()));
    }

    let read_dir_err = |source| ExtractError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await.map_err(read_dir_err)?;
    while let Some(entry) = entries.next_entry().await.map_err(read_dir_err)? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(QUERY_FILE_PREFIX) && name.ends_with(".json") {
            files.push(entry.path());
        }
    }
    files.sort();

    let mut records = Vec::new();
    for file in &files {
        let extracted = extract_media_info(file).await;
        debug!("{}: {} records", file.display(), extracted.len());
        records.extend(extracted);
    }

    debug!(
        "Extracted {} records from {} files in {}",
        records.len(),
        files.len(),
        dir.display()
    );
    Ok(records)
}
