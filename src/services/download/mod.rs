//! Reel media download service.
//!
//! Walks a list of reel URLs, skipping what already exists on disk and
//! fetching the rest one at a time with a randomized pause in between.
//! Separated from UI concerns - emits events for progress tracking.

mod fetcher;
mod types;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::utils::{ensure_scheme, host_matches, reel_id_from_url};

pub use fetcher::{FetchError, MediaFetcher, YtDlpFetcher};
pub use types::{
    DownloadConfig, DownloadError, DownloadEvent, DownloadResult, DownloadStatus,
    DownloadSummary, DownloadTarget,
};

/// Required column of the input CSV.
const URL_COLUMN: &str = "url";
/// Optional column used as the file label.
const PLAYS_COLUMN: &str = "plays";

/// Read download targets from a summary-style CSV.
///
/// Fails before any side effect when the `url` column is missing. Rows that
/// cannot be parsed are skipped with a warning.
pub fn read_targets_csv(path: &Path) -> Result<Vec<DownloadTarget>, DownloadError> {
    let csv_err = |source| DownloadError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let headers = reader.headers().map_err(csv_err)?.clone();

    let column = |name: &str| headers.iter().position(|h| h.trim() == name);
    let url_idx = column(URL_COLUMN).ok_or_else(|| DownloadError::MissingColumn {
        path: path.to_path_buf(),
        column: URL_COLUMN,
    })?;
    let plays_idx = column(PLAYS_COLUMN);

    let mut targets = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping unreadable row {} of {}: {}", line + 2, path.display(), e);
                continue;
            }
        };
        let url = record.get(url_idx).unwrap_or("").trim().to_string();
        let label = plays_idx
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        targets.push(DownloadTarget { url, label });
    }

    Ok(targets)
}

/// Output file for a reel: `<reel_id>-<label>.mp4`, or `<reel_id>.mp4`.
pub fn output_file_name(reel_id: &str, label: Option<&str>) -> String {
    match label {
        Some(label) => format!("{}-{}.mp4", reel_id, sanitize_filename(label)),
        None => format!("{}.mp4", reel_id),
    }
}

/// Sanitize a string for use as a filename.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(100)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Service for fetching reel media with an external tool.
pub struct DownloadService<F: MediaFetcher> {
    fetcher: F,
    config: DownloadConfig,
}

impl<F: MediaFetcher> DownloadService<F> {
    pub fn new(fetcher: F, config: DownloadConfig) -> Self {
        Self { fetcher, config }
    }

    /// Download every target in order.
    ///
    /// `stop` is checked before each target; once set, the run ends and the
    /// tally so far is returned.
    pub async fn download(
        &self,
        targets: &[DownloadTarget],
        stop: Arc<AtomicBool>,
        event_tx: mpsc::Sender<DownloadEvent>,
    ) -> Result<DownloadSummary, DownloadError> {
        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .map_err(|source| DownloadError::Io {
                path: self.config.output_dir.clone(),
                source,
            })?;

        let mut summary = DownloadSummary::default();
        let total = targets.len();

        for (index, target) in targets.iter().enumerate() {
            if stop.load(Ordering::Relaxed) {
                info!("Download stopped");
                let _ = event_tx
                    .send(DownloadEvent::Stopped {
                        remaining: total - index,
                    })
                    .await;
                break;
            }

            if target.url.trim().is_empty() {
                continue;
            }

            let (result, fetched) = self.process(index, total, target, &event_tx).await;
            summary.record(result.status);
            let _ = event_tx
                .send(DownloadEvent::Finished { index, result })
                .await;

            if fetched {
                self.pause().await;
            }
        }

        info!(
            "Download results: {} total, {} success, {} failed, {} skipped",
            summary.total(),
            summary.success,
            summary.failed,
            summary.skipped
        );
        Ok(summary)
    }

    /// Handle one target. The flag reports whether the fetcher was invoked.
    async fn process(
        &self,
        index: usize,
        total: usize,
        target: &DownloadTarget,
        event_tx: &mpsc::Sender<DownloadEvent>,
    ) -> (DownloadResult, bool) {
        let url = ensure_scheme(&target.url);

        if !self
            .config
            .allowed_hosts
            .iter()
            .any(|host| host_matches(&url, host))
        {
            warn!("Skipping URL outside allowed hosts: {}", url);
            return (skipped(url, Some("host not allowed".to_string())), false);
        }

        let Some(reel_id) = reel_id_from_url(&url) else {
            warn!("Cannot derive a reel id from {}", url);
            return (failed(url, "no reel id in URL".to_string()), false);
        };

        let file_name = output_file_name(&reel_id, target.label.as_deref());
        let output = self.config.output_dir.join(&file_name);

        if output.exists() {
            info!("Exists: {}", file_name);
            return (skipped(reel_id, None), false);
        }

        info!("Downloading ({}/{}): {}", index + 1, total, reel_id);
        let _ = event_tx
            .send(DownloadEvent::Started {
                index,
                total,
                reel_id: reel_id.clone(),
            })
            .await;

        let result = match self.fetcher.fetch(&url, &output).await {
            Ok(()) => {
                info!("Saved: {}", file_name);
                DownloadResult {
                    reel_id,
                    status: DownloadStatus::Success,
                    error_detail: None,
                }
            }
            Err(e) => {
                warn!("Failed: {} | Error: {}", reel_id, e);
                failed(reel_id, e.to_string())
            }
        };
        (result, true)
    }

    async fn pause(&self) {
        let (min, max) = (self.config.delay_min, self.config.delay_max);
        let delay = if max > min {
            Duration::from_secs_f64(rand::rng().random_range(min.as_secs_f64()..=max.as_secs_f64()))
        } else {
            min
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }
}

fn skipped(reel_id: String, detail: Option<String>) -> DownloadResult {
    DownloadResult {
        reel_id,
        status: DownloadStatus::Skipped,
        error_detail: detail,
    }
}

fn failed(reel_id: String, detail: String) -> DownloadResult {
    DownloadResult {
        reel_id,
        status: DownloadStatus::Failed,
        error_detail: Some(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Writes a placeholder file for every URL, failing for those listed.
    #[derive(Default)]
    struct FakeFetcher {
        calls: Mutex<Vec<String>>,
        fail: Vec<String>,
        stop_after_first: Option<Arc<AtomicBool>>,
    }

    #[async_trait]
    impl MediaFetcher for FakeFetcher {
        async fn fetch(&self, url: &str, output: &Path) -> Result<(), FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            if let Some(stop) = &self.stop_after_first {
                stop.store(true, Ordering::SeqCst);
            }
            if self.fail.iter().any(|f| f == url) {
                return Err(FetchError::Exit {
                    code: Some(1),
                    stderr: "ERROR: private reel".to_string(),
                });
            }
            std::fs::write(output, b"mp4").unwrap();
            Ok(())
        }
    }

    fn config(dir: &Path) -> DownloadConfig {
        DownloadConfig {
            output_dir: dir.to_path_buf(),
            delay_min: Duration::ZERO,
            delay_max: Duration::ZERO,
            allowed_hosts: vec!["instagram.com".to_string()],
        }
    }

    fn targets() -> Vec<DownloadTarget> {
        vec![
            DownloadTarget::with_label("instagram.com/reel/AAA/", "2K"),
            DownloadTarget::with_label("instagram.com/reel/BBB/", "13K"),
            DownloadTarget::with_label("https://www.instagram.com/reel/CCC/", "1.5M"),
        ]
    }

    #[tokio::test]
    async fn test_existing_file_is_skipped() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("BBB-13K.mp4"), b"old").unwrap();

        let service = DownloadService::new(FakeFetcher::default(), config(dir.path()));
        let (tx, _rx) = mpsc::channel(64);
        let summary = service
            .download(&targets(), Arc::new(AtomicBool::new(false)), tx)
            .await
            .unwrap();

        assert_eq!(
            summary,
            DownloadSummary {
                success: 2,
                failed: 0,
                skipped: 1
            }
        );
        let calls = service.fetcher.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            [
                "https://instagram.com/reel/AAA/",
                "https://www.instagram.com/reel/CCC/"
            ]
        );
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let dir = tempdir().unwrap();
        let service = DownloadService::new(FakeFetcher::default(), config(dir.path()));

        let (tx, _rx) = mpsc::channel(64);
        let first = service
            .download(&targets(), Arc::new(AtomicBool::new(false)), tx.clone())
            .await
            .unwrap();
        assert_eq!(first.success, 3);

        let second = service
            .download(&targets(), Arc::new(AtomicBool::new(false)), tx)
            .await
            .unwrap();
        assert_eq!(second.success, 0);
        assert_eq!(second.skipped, 3);
        assert_eq!(service.fetcher.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_blank_foreign_and_failed_rows() {
        let dir = tempdir().unwrap();
        let fetcher = FakeFetcher {
            fail: vec!["https://instagram.com/reel/BAD/".to_string()],
            ..Default::default()
        };
        let service = DownloadService::new(fetcher, config(dir.path()));

        let list = vec![
            DownloadTarget::new("   "),
            DownloadTarget::new("https://example.com/reel/XYZ/"),
            DownloadTarget::new("https://notinstagram.com/reel/XYZ/"),
            DownloadTarget::new("instagram.com/reel/BAD/"),
            DownloadTarget::new("instagram.com/reel/GOOD"),
        ];
        let (tx, mut rx) = mpsc::channel(64);
        let summary = service
            .download(&list, Arc::new(AtomicBool::new(false)), tx)
            .await
            .unwrap();

        // The blank row is not counted at all
        assert_eq!(
            summary,
            DownloadSummary {
                success: 1,
                failed: 1,
                skipped: 2
            }
        );
        assert!(dir.path().join("GOOD.mp4").exists());

        let mut failure = None;
        while let Ok(event) = rx.try_recv() {
            if let DownloadEvent::Finished { result, .. } = event {
                if result.status == DownloadStatus::Failed {
                    failure = result.error_detail;
                }
            }
        }
        assert_eq!(failure.as_deref(), Some("ERROR: private reel"));
    }

    /// Shared buffer capturing formatted log output.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_one_log_line_per_failure_and_skip() {
        let dir = tempdir().unwrap();
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        // `false` exits non-zero without output
        let service = DownloadService::new(
            crate::services::download::YtDlpFetcher::new("false", "best", Vec::new()),
            config(dir.path()),
        );
        let list = vec![
            DownloadTarget::new("instagram.com/reel/BAD/"),
            DownloadTarget::new("https://example.com/reel/XYZ/"),
        ];
        let (tx, _rx) = mpsc::channel(64);
        let summary = service
            .download(&list, Arc::new(AtomicBool::new(false)), tx)
            .await
            .unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.iter().filter(|l| l.contains("BAD")).count(), 1, "{}", output);
        assert_eq!(lines.iter().filter(|l| l.contains("example.com")).count(), 1, "{}", output);
        assert_eq!(lines.len(), 2, "{}", output);
    }

    #[tokio::test]
    async fn test_stop_flag_ends_run() {
        let dir = tempdir().unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let fetcher = FakeFetcher {
            stop_after_first: Some(stop.clone()),
            ..Default::default()
        };
        let service = DownloadService::new(fetcher, config(dir.path()));

        let (tx, _rx) = mpsc::channel(64);
        let summary = service.download(&targets(), stop, tx).await.unwrap();

        assert_eq!(summary.total(), 1);
        assert_eq!(service.fetcher.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_read_targets_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reels.csv");
        std::fs::write(
            &path,
            "url,plays,likes,engagement_rate\n\
             instagram.com/reel/AAA/,2K,115,5.00%\n\
             ,,,\n\
             instagram.com/reel/BBB/,,3,0.10%\n",
        )
        .unwrap();

        let targets = read_targets_csv(&path).unwrap();
        assert_eq!(
            targets,
            [
                DownloadTarget::with_label("instagram.com/reel/AAA/", "2K"),
                DownloadTarget::new(""),
                DownloadTarget::new("instagram.com/reel/BBB/"),
            ]
        );
    }

    #[test]
    fn test_missing_url_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "link,plays\ninstagram.com/reel/A/,1\n").unwrap();

        let err = read_targets_csv(&path).unwrap_err();
        assert!(matches!(err, DownloadError::MissingColumn { column: "url", .. }));
    }

    #[test]
    fn test_output_file_name() {
        assert_eq!(output_file_name("ABC", None), "ABC.mp4");
        assert_eq!(output_file_name("ABC", Some("1.5M")), "ABC-1.5M.mp4");
        assert_eq!(output_file_name("ABC", Some("a/b")), "ABC-a_b.mp4");
    }
}
