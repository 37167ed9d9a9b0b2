//! Progress display for scrolling and downloads.

use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::services::DownloadStatus;

/// Summary bar plus a spinner for the reel currently being fetched.
pub struct DownloadProgress {
    multi: MultiProgress,
    summary_bar: ProgressBar,
    current: ProgressBar,
    success: usize,
    failed: usize,
    skipped: usize,
}

impl DownloadProgress {
    pub fn new(total: u64) -> Self {
        let multi = MultiProgress::new();

        // Summary bar at the top
        let summary_bar = multi.add(ProgressBar::new(total));
        summary_bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len}")
                .unwrap()
                .progress_chars("█▓░"),
        );
        summary_bar.set_message("Downloading");

        let current = multi.add(ProgressBar::new_spinner());
        current.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner:.dim} {wide_msg}")
                .unwrap(),
        );
        current.set_message("idle");

        Self {
            multi,
            summary_bar,
            current,
            success: 0,
            failed: 0,
            skipped: 0,
        }
    }

    /// Show the reel being fetched.
    pub fn start(&self, reel_id: &str) {
        self.current.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner:.cyan} {wide_msg}")
                .unwrap(),
        );
        self.current.set_message(reel_id.to_string());
        self.current.enable_steady_tick(Duration::from_millis(100));
    }

    /// Count a finished target and reset the spinner.
    pub fn finish_item(&mut self, status: DownloadStatus) {
        match status {
            DownloadStatus::Success => self.success += 1,
            DownloadStatus::Failed => self.failed += 1,
            DownloadStatus::Skipped => self.skipped += 1,
        }
        self.current.disable_steady_tick();
        self.current.set_message("idle");
        self.summary_bar.inc(1);
        self.summary_bar.set_message(format!(
            "Saved: {} | Skipped: {} | Failed: {}",
            self.success, self.skipped, self.failed
        ));
    }

    /// Print a message that coordinates with the progress display.
    /// This prevents the message from corrupting the progress bars.
    pub fn println(&self, message: &str) {
        let _ = self.multi.println(message);
    }

    /// Finish all progress bars and clear the display.
    pub fn finish(&self) {
        self.current.finish_and_clear();
        self.summary_bar.finish_and_clear();
    }
}

/// Bar tracking scroll actions during a capture.
pub struct ScrollProgress {
    bar: ProgressBar,
}

impl ScrollProgress {
    pub fn new(total: u32) -> Self {
        let bar = ProgressBar::new(u64::from(total));
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len}")
                .unwrap()
                .progress_chars("█▓░"),
        );
        bar.set_message("Loading feed");
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    pub fn scrolled(&self, index: u32) {
        self.bar.set_message("Scrolling");
        self.bar.set_position(u64::from(index));
    }

    pub fn saved(&self, count: usize) {
        self.bar.set_message(format!("Scrolling ({} pages saved)", count));
    }

    pub fn draining(&self, timeout: Duration) {
        self.bar
            .set_message(format!("Waiting up to {}s for final responses", timeout.as_secs()));
    }

    pub fn println(&self, message: &str) {
        self.bar.println(message);
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
