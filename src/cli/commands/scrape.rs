//! Scrape command: scroll the configured feed and save paginated responses.

use std::path::Path;

use crate::cli::icons::{dim_arrow, info, success, warn};
use crate::config::Config;
use crate::scrapers::SessionState;
use crate::services::{CaptureReport, ScrapeSession};

pub async fn cmd_scrape(
    config_path: Option<&Path>,
    scroll_count: Option<u32>,
    headless: bool,
    then_extract: bool,
) -> anyhow::Result<()> {
    let mut config = Config::load(config_path).await?;
    if let Some(count) = scroll_count {
        config.scroll_count = count;
    }
    if headless {
        config.headless = true;
    }

    let session = ScrapeSession {
        target_url: crate::utils::ensure_scheme(&config.url),
        scroll_count: config.scroll_count,
        scroll_delay: config.scroll_delay(),
        headless: config.headless,
        session_file: config.session_path(),
    };

    // A missing session is fatal; scraping logged out only yields a login wall
    let state = SessionState::load(&session.session_file).await?;

    println!(
        "{} Scraping {} ({} scrolls, {:.1}s apart)",
        info(),
        session.target_url,
        session.scroll_count,
        config.scroll_delay
    );

    let report = capture(&config, &session, &state).await?;

    println!(
        "{} Saved {} responses to {}",
        success(),
        report.captured,
        config.output_dir().display()
    );
    println!(
        "  {} {} graphql, {} music, {} scrolls",
        dim_arrow(),
        report.graphql,
        report.music,
        report.scrolls
    );
    if report.failed > 0 {
        println!(
            "  {} {} responses could not be saved (see log)",
            warn(),
            report.failed
        );
    }
    if report.captured == 0 {
        println!(
            "  {} Nothing captured. Check that the session is still logged in.",
            warn()
        );
    }

    if then_extract {
        super::extract::cmd_extract(
            config_path,
            Path::new(super::extract::DEFAULT_SUMMARY_FILE),
            &[],
            false,
            None,
        )
        .await?;
    }

    Ok(())
}

#[cfg(feature = "browser")]
async fn capture(
    config: &Config,
    session: &ScrapeSession,
    state: &SessionState,
) -> anyhow::Result<CaptureReport> {
    use std::sync::Arc;

    use anyhow::Context;
    use tokio::sync::mpsc;

    use crate::scrapers::BrowserSession;
    use crate::services::{CaptureEvent, CaptureService, CaptureStore};

    let store = CaptureStore::open(config.output_dir()).await?;
    let service = CaptureService::new(store, config.timing.to_capture_timing());

    let mut browser = BrowserSession::new(config.engine_config());
    let page = match browser.open_feed_page(state).await {
        Ok(page) => Arc::new(page),
        Err(e) => {
            browser.close().await;
            return Err(e.context("Failed to open browser page"));
        }
    };

    let (event_tx, event_rx) = mpsc::channel::<CaptureEvent>(100);
    let event_handler = tokio::spawn(show_progress(session.scroll_count, event_rx));

    let result = service.run(page, session, event_tx).await;
    browser.close().await;

    if let Err(e) = event_handler.await {
        tracing::warn!("Event handler task failed: {}", e);
    }

    result.context("Capture failed")
}

#[cfg(not(feature = "browser"))]
async fn capture(
    _config: &Config,
    _session: &ScrapeSession,
    _state: &SessionState,
) -> anyhow::Result<CaptureReport> {
    anyhow::bail!("Browser support not compiled. Rebuild with: cargo build --features browser")
}

/// Render capture events (UI layer).
#[cfg(feature = "browser")]
async fn show_progress(
    scroll_count: u32,
    mut event_rx: tokio::sync::mpsc::Receiver<crate::services::CaptureEvent>,
) {
    use crate::cli::progress::ScrollProgress;
    use crate::services::CaptureEvent;

    let progress = ScrollProgress::new(scroll_count);
    let mut saved = 0usize;

    while let Some(event) = event_rx.recv().await {
        match event {
            CaptureEvent::Navigated { url } => {
                progress.println(&format!("{} Loaded {}", dim_arrow(), url));
            }
            CaptureEvent::Scrolled { index, .. } => progress.scrolled(index),
            CaptureEvent::Saved { path, .. } => {
                saved += 1;
                progress.saved(saved);
                if let Some(name) = path.file_name() {
                    tracing::debug!("Saved {}", name.to_string_lossy());
                }
            }
            CaptureEvent::Draining { timeout } => progress.draining(timeout),
        }
    }

    progress.finish();
}
