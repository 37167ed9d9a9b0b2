//! External media fetcher (yt-dlp).

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to execute {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{stderr}")]
    Exit { code: Option<i32>, stderr: String },
}

/// Fetches one media URL into a file.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str, output: &Path) -> Result<(), FetchError>;
}

/// [`MediaFetcher`] shelling out to `yt-dlp`.
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    binary: String,
    format: String,
    extra_args: Vec<String>,
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self::new("yt-dlp", "best", Vec::new())
    }
}

impl YtDlpFetcher {
    pub fn new(binary: impl Into<String>, format: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            format: format.into(),
            extra_args,
        }
    }

    /// Check that the binary can be found before starting a run.
    pub fn is_available(&self) -> bool {
        which::which(&self.binary).is_ok()
    }

    fn args(&self, url: &str, output: &Path) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            self.format.clone(),
            "-o".to_string(),
            output.to_string_lossy().to_string(),
            "--no-check-certificate".to_string(),
            "--quiet".to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch(&self, url: &str, output: &Path) -> Result<(), FetchError> {
        let args = self.args(url, output);
        debug!("Running {} {:?}", self.binary, args);

        let result = Command::new(&self.binary)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| FetchError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if result.status.success() {
            return Ok(());
        }

        // The caller logs the failure; stderr travels in the error
        let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
        Err(FetchError::Exit {
            code: result.status.code(),
            stderr,
        })
    }
}
