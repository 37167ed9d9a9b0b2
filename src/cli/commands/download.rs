//! Download reel media command.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;

use crate::cli::icons::{bullet, dim_arrow, error, info, warn};
use crate::cli::progress::DownloadProgress;
use crate::config::{Config, ConfigError};
use crate::services::{
    read_targets_csv, DownloadEvent, DownloadService, DownloadTarget, YtDlpFetcher,
};

/// Download reels listed in a CSV, or a single URL.
pub async fn cmd_download(
    config_path: Option<&Path>,
    csv: Option<PathBuf>,
    url: Option<String>,
    output: Option<PathBuf>,
    show_progress: bool,
) -> anyhow::Result<()> {
    // Download settings have usable defaults; a config file is optional here
    let config = match Config::load(config_path).await {
        Ok(config) => config,
        Err(ConfigError::NotFound(_)) => Config::new("https://www.instagram.com/"),
        Err(e) => return Err(e.into()),
    };

    let targets = match (csv, url) {
        (Some(path), _) => read_targets_csv(&path)
            .with_context(|| format!("Cannot use {} as download input", path.display()))?,
        (None, Some(url)) => vec![DownloadTarget::new(url.trim())],
        (None, None) => anyhow::bail!("Pass --csv <file> or --url <reel url>"),
    };

    if targets.is_empty() {
        println!("{} No rows found in CSV.", error());
        return Ok(());
    }

    let mut download_config = config.download_config();
    if let Some(output) = output {
        download_config.output_dir = output;
    }

    let dl = &config.download;
    let fetcher = YtDlpFetcher::new(&dl.fetch_binary, &dl.format, dl.extra_args.clone());
    if !fetcher.is_available() {
        anyhow::bail!(
            "{} not found in PATH. Install it (e.g. `pipx install yt-dlp`) or set download.fetch_binary",
            dl.fetch_binary
        );
    }

    println!(
        "{} Downloading {} reels into {}",
        info(),
        targets.len(),
        download_config.output_dir.display()
    );

    // Ctrl-C finishes the current reel, then stops
    let stop = Arc::new(AtomicBool::new(false));
    let stop_signal = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop_signal.store(true, Ordering::Relaxed);
        }
    });

    let service = DownloadService::new(fetcher, download_config);

    // Event channel for progress updates
    let (event_tx, mut event_rx) = mpsc::channel::<DownloadEvent>(100);

    let total = targets.len() as u64;
    let event_handler = tokio::spawn(async move {
        let mut progress = show_progress.then(|| DownloadProgress::new(total));

        while let Some(event) = event_rx.recv().await {
            match event {
                DownloadEvent::Started {
                    index,
                    total,
                    reel_id,
                } => match progress.as_ref() {
                    Some(progress) => progress.start(&reel_id),
                    None => println!("{} Downloading ({}/{}): {}", dim_arrow(), index + 1, total, reel_id),
                },
                // Per-item outcomes are logged once by the service
                DownloadEvent::Finished { result, .. } => {
                    if let Some(progress) = progress.as_mut() {
                        progress.finish_item(result.status);
                    }
                }
                DownloadEvent::Stopped { remaining } => {
                    let line = format!("{} Download stopped ({} not processed)", warn(), remaining);
                    match progress.as_ref() {
                        Some(progress) => progress.println(&line),
                        None => println!("{}", line),
                    }
                }
            }
        }

        if let Some(ref progress) = progress {
            progress.finish();
        }
    });

    let summary = service.download(&targets, stop, event_tx).await?;

    if let Err(e) = event_handler.await {
        tracing::warn!("Event handler task failed: {}", e);
    }

    println!();
    println!("{} Results:", info());
    println!("  {} Total: {}", bullet(), summary.total());
    println!("  {} Success: {}", bullet(), summary.success);
    println!("  {} Failed: {}", bullet(), summary.failed);
    println!("  {} Skipped: {}", bullet(), summary.skipped);

    Ok(())
}
