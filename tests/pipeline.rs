//! End-to-end pipeline: capture -> extract -> CSV -> download.
//!
//! The browser and the external fetcher are replaced by in-memory fakes.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::tempdir;
use tokio::sync::mpsc;

use reelscrape::scrapers::{FeedPage, InterceptedResponse, PageError};
use reelscrape::services::download::FetchError;
use reelscrape::services::{
    load_all_data, read_targets_csv, write_csv, CaptureService, CaptureStore, CaptureTiming,
    DownloadConfig, DownloadService, DownloadSummary, MediaFetcher, ScrapeSession, SortMode,
    WriteOutcome,
};

const GRAPHQL_URL: &str = "https://www.instagram.com/graphql/query";

fn feed_page(reels: &[(&str, u64, u64)]) -> String {
    let edges: Vec<_> = reels
        .iter()
        .map(|(code, plays, likes)| {
            json!({"node": {"media": {"code": code, "play_count": plays, "like_count": likes}}})
        })
        .collect();
    json!({"data": {"xdt_api__v1__clips__user__connection_v2": {"edges": edges}}}).to_string()
}

/// Serves one feed page per scroll, plus one on the initial load.
struct ScrollingFeed {
    pages: Vec<String>,
    tx: Mutex<Option<mpsc::Sender<InterceptedResponse>>>,
    served: AtomicU32,
}

impl ScrollingFeed {
    fn new(pages: Vec<String>) -> Self {
        Self {
            pages,
            tx: Mutex::new(None),
            served: AtomicU32::new(0),
        }
    }

    async fn serve_next(&self) {
        let n = self.served.fetch_add(1, Ordering::SeqCst) as usize;
        if n >= self.pages.len() {
            return;
        }
        let tx = self.tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            // Static assets arrive alongside the feed pages
            let _ = tx
                .send(InterceptedResponse {
                    url: format!("https://static.cdninstagram.com/rsrc/{}.js", n),
                    status: 200,
                    request_id: format!("asset-{}", n),
                })
                .await;
            let _ = tx
                .send(InterceptedResponse {
                    url: GRAPHQL_URL.to_string(),
                    status: 200,
                    request_id: format!("page-{}", n),
                })
                .await;
        }
    }
}

#[async_trait]
impl FeedPage for ScrollingFeed {
    async fn subscribe(&self) -> Result<mpsc::Receiver<InterceptedResponse>, PageError> {
        let (tx, rx) = mpsc::channel(16);
        *self.tx.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn navigate(&self, _url: &str) -> Result<(), PageError> {
        self.serve_next().await;
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> Result<(), PageError> {
        self.serve_next().await;
        Ok(())
    }

    async fn response_body(&self, request_id: &str) -> Result<String, PageError> {
        let index: usize = request_id
            .strip_prefix("page-")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| PageError::Body(format!("unexpected request {}", request_id)))?;
        Ok(self.pages[index].clone())
    }

    async fn close(&self) {}
}

#[derive(Default)]
struct RecordingFetcher {
    calls: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl MediaFetcher for RecordingFetcher {
    async fn fetch(&self, url: &str, output: &Path) -> Result<(), FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        std::fs::write(output, b"\x00\x00\x00\x18ftypmp42").unwrap();
        Ok(())
    }
}

#[tokio::test]
async fn capture_extract_and_download() {
    let work = tempdir().unwrap();
    let captures = work.path().join("output");
    let downloads = work.path().join("downloads");
    let summary_csv = work.path().join("reels_summary.csv");

    // Capture: initial load plus two scrolls, each yielding one feed page
    let page = Arc::new(ScrollingFeed::new(vec![
        feed_page(&[("AAA", 2300, 115), ("BBB", 1_500_000, 3000)]),
        feed_page(&[("CCC", 12600, 115)]),
        feed_page(&[("DDD", 0, 0)]),
    ]));
    let timing = CaptureTiming {
        settle: Duration::from_millis(10),
        scroll_margin: Duration::ZERO,
        drain: Duration::from_millis(50),
        idle: None,
        max_in_flight: 4,
    };
    let session = ScrapeSession {
        target_url: "https://www.instagram.com/someone/reels/".to_string(),
        scroll_count: 2,
        scroll_delay: Duration::from_millis(5),
        headless: true,
        session_file: work.path().join("insta_session.json"),
    };

    let service = CaptureService::new(CaptureStore::open(&captures).await.unwrap(), timing);
    let (tx, _rx) = mpsc::channel(64);
    let report = service.run(page, &session, tx).await.unwrap();
    assert_eq!(report.captured, 3);
    assert_eq!(report.graphql, 3);
    assert_eq!(report.scrolls, 2);
    assert_eq!(report.failed, 0);

    // Extract and summarize, most played first
    let records = load_all_data(&captures).await.unwrap();
    assert_eq!(records.len(), 4);

    let outcome = write_csv(records, &[SortMode::Plays], true, &summary_csv).unwrap();
    assert!(matches!(outcome, WriteOutcome::Written { rows: 4, .. }));

    let csv = std::fs::read_to_string(&summary_csv).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "url,plays,likes,engagement_rate");
    assert_eq!(lines[1], "instagram.com/reel/BBB/,1.5M,3K,0.20%");
    assert_eq!(lines[2], "instagram.com/reel/CCC/,13K,115,0.91%");
    assert_eq!(lines[3], "instagram.com/reel/AAA/,2K,115,5.00%");
    assert_eq!(lines[4], "instagram.com/reel/DDD/,0,0,0.00%");

    // Download from the summary; the second run has nothing left to do
    let targets = read_targets_csv(&summary_csv).unwrap();
    let config = DownloadConfig {
        output_dir: downloads.clone(),
        delay_min: Duration::ZERO,
        delay_max: Duration::ZERO,
        allowed_hosts: vec!["instagram.com".to_string()],
    };
    let fetcher = RecordingFetcher::default();
    let calls = fetcher.calls.clone();
    let downloader = DownloadService::new(fetcher, config);

    let (tx, _rx) = mpsc::channel(64);
    let first = downloader
        .download(&targets, Arc::new(AtomicBool::new(false)), tx.clone())
        .await
        .unwrap();
    assert_eq!(
        first,
        DownloadSummary {
            success: 4,
            failed: 0,
            skipped: 0
        }
    );
    assert!(downloads.join("BBB-1.5M.mp4").exists());
    assert!(downloads.join("AAA-2K.mp4").exists());
    assert_eq!(calls.lock().unwrap().len(), 4);

    let second = downloader
        .download(&targets, Arc::new(AtomicBool::new(false)), tx)
        .await
        .unwrap();
    assert_eq!(
        second,
        DownloadSummary {
            success: 0,
            failed: 0,
            skipped: 4
        }
    );
    assert_eq!(calls.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn extract_skips_malformed_capture() {
    let dir = tempdir().unwrap();
    let store = CaptureStore::open(dir.path()).await.unwrap();

    let valid: serde_json::Value =
        serde_json::from_str(&feed_page(&[("ABC", 2300, 115)])).unwrap();
    store.write("query", 1, &valid).await.unwrap();
    std::fs::write(dir.path().join("query_2_999999.json"), "{\"data\": [").unwrap();

    let records = load_all_data(dir.path()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].url, "instagram.com/reel/ABC/");
    assert_eq!(records[0].plays, 2300);
}
