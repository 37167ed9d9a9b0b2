//! Feed capture service.
//!
//! Drives a [`FeedPage`] through navigate, settle, scroll and drain while a
//! listener persists every relevant paginated response to disk. Emits events
//! for progress tracking; the final tally is returned, never kept globally.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::scrapers::{classify, FeedPage, InterceptedResponse, PageError, ResponseClass};

/// Timing knobs for a capture run.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureTiming {
    /// Pause after navigation before the first scroll.
    pub settle: Duration,
    /// Extra wait added to every scroll delay.
    pub scroll_margin: Duration,
    /// Maximum wait for trailing responses after the last scroll.
    pub drain: Duration,
    /// End the drain early once no relevant response arrived for this long.
    pub idle: Option<Duration>,
    /// Concurrent response handlers.
    pub max_in_flight: usize,
}

impl Default for CaptureTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(5),
            scroll_margin: Duration::from_secs(2),
            drain: Duration::from_secs(10),
            idle: None,
            max_in_flight: 8,
        }
    }
}

/// Parameters of one scrape invocation. Immutable while the run is active.
#[derive(Debug, Clone)]
pub struct ScrapeSession {
    pub target_url: String,
    pub scroll_count: u32,
    pub scroll_delay: Duration,
    pub headless: bool,
    /// Saved browser session the page was opened with.
    pub session_file: PathBuf,
}

/// Outcome counts of a capture run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureReport {
    /// Files written.
    pub captured: usize,
    pub graphql: usize,
    pub music: usize,
    /// Relevant responses whose body could not be read, decoded or saved.
    pub failed: usize,
    /// Scroll actions issued.
    pub scrolls: u32,
}

impl CaptureReport {
    fn record(&mut self, outcome: HandlerOutcome) {
        match outcome {
            HandlerOutcome::Saved(class) => {
                self.captured += 1;
                match class {
                    ResponseClass::GraphQlPage => self.graphql += 1,
                    ResponseClass::MusicRestPage => self.music += 1,
                    ResponseClass::Irrelevant => {}
                }
            }
            HandlerOutcome::Failed => self.failed += 1,
        }
    }
}

/// Events emitted during a capture run.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// Target page loaded
    Navigated { url: String },
    /// Scroll action issued
    Scrolled { index: u32, total: u32 },
    /// Response persisted
    Saved { path: PathBuf, class: ResponseClass },
    /// Waiting for trailing responses
    Draining { timeout: Duration },
}

/// Errors that end a capture run.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Navigation failed: {0}")]
    Navigation(#[source] PageError),

    #[error("Page error: {0}")]
    Page(#[from] PageError),

    #[error("Failed to prepare output directory {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Response listener crashed: {0}")]
    Listener(String),
}

/// Write-once store for captured payloads.
///
/// Names are `<prefix>_<unix-millis>_<seq>.json`; the sequence number is
/// unique per store so two responses arriving in the same millisecond never
/// collide, and files are opened with create-new so nothing is overwritten.
#[derive(Debug)]
pub struct CaptureStore {
    dir: PathBuf,
    seq: AtomicU64,
}

impl CaptureStore {
    /// Open a store, creating the directory if missing.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, CaptureError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| CaptureError::Io {
                path: dir.clone(),
                source,
            })?;
        Ok(Self {
            dir,
            seq: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn next_path(&self, prefix: &str, arrived_ms: i64) -> PathBuf {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.dir
            .join(format!("{}_{}_{:06}.json", prefix, arrived_ms, seq))
    }

    /// Persist a payload under the given prefix.
    pub async fn write(
        &self,
        prefix: &str,
        arrived_ms: i64,
        payload: &serde_json::Value,
    ) -> std::io::Result<PathBuf> {
        let path = self.next_path(prefix, arrived_ms);
        let json = serde_json::to_vec_pretty(payload)?;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.write_all(&json).await?;
        file.flush().await?;

        Ok(path)
    }
}

enum HandlerOutcome {
    Saved(ResponseClass),
    Failed,
}

/// Service running the scroll-and-intercept loop.
pub struct CaptureService {
    store: Arc<CaptureStore>,
    timing: CaptureTiming,
}

impl CaptureService {
    pub fn new(store: CaptureStore, timing: CaptureTiming) -> Self {
        Self {
            store: Arc::new(store),
            timing,
        }
    }

    /// Run one capture against `page`, closing it when done.
    ///
    /// Navigation failure is fatal. Per-response failures are logged, counted
    /// and skipped.
    pub async fn run<P: FeedPage>(
        &self,
        page: Arc<P>,
        session: &ScrapeSession,
        event_tx: mpsc::Sender<CaptureEvent>,
    ) -> Result<CaptureReport, CaptureError> {
        // Subscribe before navigating so the first page is not missed
        let responses = match page.subscribe().await {
            Ok(rx) => rx,
            Err(e) => {
                page.close().await;
                return Err(e.into());
            }
        };

        let started = Instant::now();
        let last_relevant_ms = Arc::new(AtomicU64::new(0));
        let (stop_tx, stop_rx) = oneshot::channel();

        let listener = tokio::spawn(listen(
            page.clone(),
            responses,
            self.store.clone(),
            Arc::new(Semaphore::new(self.timing.max_in_flight.max(1))),
            stop_rx,
            started,
            last_relevant_ms.clone(),
            event_tx.clone(),
        ));

        let driven = self
            .drive(page.as_ref(), session, &event_tx, started, &last_relevant_ms)
            .await;

        // Stop listening, then wait for every handler still in flight
        let _ = stop_tx.send(());
        let joined = match listener.await {
            Ok((mut report, mut handlers)) => {
                while let Some(result) = handlers.join_next().await {
                    match result {
                        Ok(outcome) => report.record(outcome),
                        Err(e) => {
                            warn!("Response handler panicked: {}", e);
                            report.failed += 1;
                        }
                    }
                }
                Ok(report)
            }
            Err(e) => Err(CaptureError::Listener(e.to_string())),
        };

        page.close().await;

        let scrolls = driven?;
        let mut report = joined?;
        report.scrolls = scrolls;
        info!(
            "Capture finished: {} saved ({} graphql, {} music), {} failed, {} scrolls",
            report.captured, report.graphql, report.music, report.failed, report.scrolls
        );
        Ok(report)
    }

    async fn drive<P: FeedPage>(
        &self,
        page: &P,
        session: &ScrapeSession,
        event_tx: &mpsc::Sender<CaptureEvent>,
        started: Instant,
        last_relevant_ms: &AtomicU64,
    ) -> Result<u32, CaptureError> {
        info!("Navigating to {}", session.target_url);
        page.navigate(&session.target_url)
            .await
            .map_err(CaptureError::Navigation)?;
        let _ = event_tx
            .send(CaptureEvent::Navigated {
                url: session.target_url.clone(),
            })
            .await;

        tokio::time::sleep(self.timing.settle).await;

        let mut scrolls = 0;
        for index in 1..=session.scroll_count {
            match page.scroll_to_bottom().await {
                Ok(()) => {
                    scrolls += 1;
                    info!("Scrolled ({}/{})", index, session.scroll_count);
                    let _ = event_tx
                        .send(CaptureEvent::Scrolled {
                            index,
                            total: session.scroll_count,
                        })
                        .await;
                }
                Err(e) => warn!("Scroll {}/{} failed: {}", index, session.scroll_count, e),
            }
            tokio::time::sleep(session.scroll_delay + self.timing.scroll_margin).await;
        }

        let _ = event_tx
            .send(CaptureEvent::Draining {
                timeout: self.timing.drain,
            })
            .await;
        self.drain(started, last_relevant_ms).await;

        Ok(scrolls)
    }

    /// Wait for trailing responses, ending early on idle when configured.
    async fn drain(&self, started: Instant, last_relevant_ms: &AtomicU64) {
        let drain_start = Instant::now();
        let deadline = drain_start + self.timing.drain;

        let Some(idle) = self.timing.idle else {
            tokio::time::sleep_until(deadline).await;
            return;
        };

        loop {
            let last_seen =
                started + Duration::from_millis(last_relevant_ms.load(Ordering::Relaxed));
            let idle_until = last_seen.max(drain_start) + idle;
            let now = Instant::now();

            if now >= deadline {
                break;
            }
            if now >= idle_until {
                info!("No new responses for {:?}, ending drain early", idle);
                break;
            }
            tokio::time::sleep_until(idle_until.min(deadline)).await;
        }
    }
}

/// Route intercepted responses to handlers until told to stop.
///
/// Returns the tally of handlers that finished while listening plus the set
/// of those still running.
#[allow(clippy::too_many_arguments)]
async fn listen<P: FeedPage>(
    page: Arc<P>,
    mut responses: mpsc::Receiver<InterceptedResponse>,
    store: Arc<CaptureStore>,
    semaphore: Arc<Semaphore>,
    mut stop_rx: oneshot::Receiver<()>,
    started: Instant,
    last_relevant_ms: Arc<AtomicU64>,
    event_tx: mpsc::Sender<CaptureEvent>,
) -> (CaptureReport, JoinSet<HandlerOutcome>) {
    let mut report = CaptureReport::default();
    let mut handlers = JoinSet::new();

    let dispatch = |handlers: &mut JoinSet<HandlerOutcome>, response: InterceptedResponse| {
        let class = classify(&response.url, response.status);
        let Some(prefix) = class.file_prefix() else {
            return;
        };

        debug!("Intercepted {:?} response: {}", class, response.url);
        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        last_relevant_ms.store(elapsed, Ordering::Relaxed);
        let arrived_ms = chrono::Utc::now().timestamp_millis();

        handlers.spawn(handle_response(
            page.clone(),
            store.clone(),
            semaphore.clone(),
            response,
            class,
            prefix,
            arrived_ms,
            event_tx.clone(),
        ));
    };

    loop {
        tokio::select! {
            _ = &mut stop_rx => {
                // Responses already delivered are still handled
                while let Ok(response) = responses.try_recv() {
                    dispatch(&mut handlers, response);
                }
                break;
            }
            Some(finished) = handlers.join_next(), if !handlers.is_empty() => {
                match finished {
                    Ok(outcome) => report.record(outcome),
                    Err(e) => {
                        warn!("Response handler panicked: {}", e);
                        report.failed += 1;
                    }
                }
            }
            received = responses.recv() => {
                let Some(response) = received else { break };
                dispatch(&mut handlers, response);
            }
        }
    }

    (report, handlers)
}

#[allow(clippy::too_many_arguments)]
async fn handle_response<P: FeedPage>(
    page: Arc<P>,
    store: Arc<CaptureStore>,
    semaphore: Arc<Semaphore>,
    response: InterceptedResponse,
    class: ResponseClass,
    prefix: &'static str,
    arrived_ms: i64,
    event_tx: mpsc::Sender<CaptureEvent>,
) -> HandlerOutcome {
    let Ok(_permit) = semaphore.acquire_owned().await else {
        return HandlerOutcome::Failed;
    };

    let body = match page.response_body(&response.request_id).await {
        Ok(body) => body,
        Err(e) => {
            warn!("Skipping {}: {}", response.url, e);
            return HandlerOutcome::Failed;
        }
    };

    let payload: serde_json::Value = match serde_json::from_str(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Skipping {}: body is not JSON: {}", response.url, e);
            return HandlerOutcome::Failed;
        }
    };

    match store.write(prefix, arrived_ms, &payload).await {
        Ok(path) => {
            info!("Saved {}", path.display());
            let _ = event_tx
                .send(CaptureEvent::Saved { path, class })
                .await;
            HandlerOutcome::Saved(class)
        }
        Err(e) => {
            warn!("Failed to save response from {}: {}", response.url, e);
            HandlerOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// In-memory page that replays canned responses on navigate and scroll.
    struct FakePage {
        on_navigate: Vec<InterceptedResponse>,
        on_scroll: Vec<InterceptedResponse>,
        bodies: HashMap<String, String>,
        fail_navigation: bool,
        tx: Mutex<Option<mpsc::Sender<InterceptedResponse>>>,
        scrolls: AtomicU32,
        closed: AtomicU32,
    }

    impl FakePage {
        fn new() -> Self {
            Self {
                on_navigate: Vec::new(),
                on_scroll: Vec::new(),
                bodies: HashMap::new(),
                fail_navigation: false,
                tx: Mutex::new(None),
                scrolls: AtomicU32::new(0),
                closed: AtomicU32::new(0),
            }
        }

        fn with_response(mut self, url: &str, status: u16, body: Option<&str>) -> Self {
            let id = format!("req-{}", self.on_navigate.len() + self.on_scroll.len());
            if let Some(body) = body {
                self.bodies.insert(id.clone(), body.to_string());
            }
            self.on_navigate.push(InterceptedResponse {
                url: url.to_string(),
                status,
                request_id: id,
            });
            self
        }

        fn with_scroll_response(mut self, url: &str, body: &str) -> Self {
            let id = format!("req-{}", self.on_navigate.len() + self.on_scroll.len());
            self.bodies.insert(id.clone(), body.to_string());
            self.on_scroll.push(InterceptedResponse {
                url: url.to_string(),
                status: 200,
                request_id: id,
            });
            self
        }

        async fn emit(&self, responses: &[InterceptedResponse]) {
            let tx = self.tx.lock().unwrap().clone();
            if let Some(tx) = tx {
                for response in responses {
                    let _ = tx.send(response.clone()).await;
                }
            }
        }
    }

    #[async_trait]
    impl FeedPage for FakePage {
        async fn subscribe(&self) -> Result<mpsc::Receiver<InterceptedResponse>, PageError> {
            let (tx, rx) = mpsc::channel(64);
            *self.tx.lock().unwrap() = Some(tx);
            Ok(rx)
        }

        async fn navigate(&self, url: &str) -> Result<(), PageError> {
            if self.fail_navigation {
                return Err(PageError::Navigation {
                    url: url.to_string(),
                    message: "net::ERR_NAME_NOT_RESOLVED".to_string(),
                });
            }
            self.emit(&self.on_navigate).await;
            Ok(())
        }

        async fn scroll_to_bottom(&self) -> Result<(), PageError> {
            let n = self.scrolls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                self.emit(&self.on_scroll).await;
            }
            Ok(())
        }

        async fn response_body(&self, request_id: &str) -> Result<String, PageError> {
            self.bodies
                .get(request_id)
                .cloned()
                .ok_or_else(|| PageError::Body(format!("no body for {}", request_id)))
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fast_timing() -> CaptureTiming {
        CaptureTiming {
            settle: Duration::from_millis(10),
            scroll_margin: Duration::from_millis(0),
            drain: Duration::from_millis(50),
            idle: None,
            max_in_flight: 2,
        }
    }

    fn session(scroll_count: u32) -> ScrapeSession {
        ScrapeSession {
            target_url: "https://www.instagram.com/someone/reels/".to_string(),
            scroll_count,
            scroll_delay: Duration::from_millis(5),
            headless: true,
            session_file: PathBuf::from("insta_session.json"),
        }
    }

    fn json_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_zero_scrolls_still_loads_and_drains() {
        let dir = tempdir().unwrap();
        let page = Arc::new(FakePage::new().with_response(
            "https://www.instagram.com/graphql/query",
            200,
            Some(r#"{"data": {}}"#),
        ));

        let service = CaptureService::new(CaptureStore::open(dir.path()).await.unwrap(), fast_timing());
        let (tx, _rx) = mpsc::channel(64);
        let report = service.run(page.clone(), &session(0), tx).await.unwrap();

        assert_eq!(page.scrolls.load(Ordering::SeqCst), 0);
        assert_eq!(report.scrolls, 0);
        assert_eq!(report.captured, 1);
        assert_eq!(page.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_classifies_and_skips_bad_bodies() {
        let dir = tempdir().unwrap();
        let page = Arc::new(
            FakePage::new()
                .with_response("https://www.instagram.com/graphql/query", 200, Some(r#"{"a": 1}"#))
                .with_response("https://www.instagram.com/graphql/query", 200, Some("<html>"))
                .with_response("https://www.instagram.com/graphql/query", 500, Some("{}"))
                .with_response("https://www.instagram.com/static/app.js", 200, Some("{}"))
                .with_response("https://www.instagram.com/graphql/query", 200, None)
                .with_scroll_response(
                    "https://www.instagram.com/api/v1/clips/music/?audio_id=1",
                    r#"{"items": []}"#,
                ),
        );

        let service = CaptureService::new(CaptureStore::open(dir.path()).await.unwrap(), fast_timing());
        let (tx, _rx) = mpsc::channel(64);
        let report = service.run(page.clone(), &session(2), tx).await.unwrap();

        assert_eq!(report.scrolls, 2);
        assert_eq!(report.graphql, 1);
        assert_eq!(report.music, 1);
        assert_eq!(report.captured, 2);
        // malformed JSON and the missing body
        assert_eq!(report.failed, 2);

        let names = json_files(dir.path());
        assert_eq!(names.len(), 2);
        assert!(names.iter().any(|n| n.starts_with("query_")));
        assert!(names.iter().any(|n| n.starts_with("music_")));
    }

    #[tokio::test]
    async fn test_simultaneous_responses_get_unique_files() {
        let dir = tempdir().unwrap();
        let mut page = FakePage::new();
        for _ in 0..20 {
            page = page.with_response("https://www.instagram.com/graphql/query", 200, Some("{}"));
        }

        let service = CaptureService::new(CaptureStore::open(dir.path()).await.unwrap(), fast_timing());
        let (tx, _rx) = mpsc::channel(64);
        let report = service.run(Arc::new(page), &session(0), tx).await.unwrap();

        assert_eq!(report.captured, 20);
        assert_eq!(json_files(dir.path()).len(), 20);
    }

    #[tokio::test]
    async fn test_navigation_failure_is_fatal() {
        let dir = tempdir().unwrap();
        let mut page = FakePage::new();
        page.fail_navigation = true;
        let page = Arc::new(page);

        let service = CaptureService::new(CaptureStore::open(dir.path()).await.unwrap(), fast_timing());
        let (tx, _rx) = mpsc::channel(64);
        let result = service.run(page.clone(), &session(3), tx).await;

        assert!(matches!(result, Err(CaptureError::Navigation(_))));
        assert_eq!(page.scrolls.load(Ordering::SeqCst), 0);
        assert_eq!(page.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_ends_drain_early() {
        let dir = tempdir().unwrap();
        let page = Arc::new(FakePage::new());

        let timing = CaptureTiming {
            drain: Duration::from_secs(60),
            idle: Some(Duration::from_secs(2)),
            ..fast_timing()
        };
        let service = CaptureService::new(CaptureStore::open(dir.path()).await.unwrap(), timing);
        let (tx, _rx) = mpsc::channel(64);

        let before = Instant::now();
        service.run(page, &session(0), tx).await.unwrap();
        assert!(before.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_store_never_overwrites() {
        let dir = tempdir().unwrap();
        let store = CaptureStore::open(dir.path().join("nested")).await.unwrap();
        let payload = serde_json::json!({"k": 1});

        let a = store.write("query", 1_700_000_000_000, &payload).await.unwrap();
        let b = store.write("query", 1_700_000_000_000, &payload).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(
            a.file_name().unwrap().to_string_lossy(),
            "query_1700000000000_000000.json"
        );

        // A fresh store restarts its counter; the existing file must survive
        let again = CaptureStore::open(dir.path().join("nested")).await.unwrap();
        assert!(again.write("query", 1_700_000_000_000, &payload).await.is_err());
    }
}
