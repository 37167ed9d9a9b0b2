//! Configuration management for reelscrape.
//!
//! The persisted record mirrors what the `config` command asks for
//! (`url`, `output_dir`, `scroll_count`, `scroll_delay`, `headless`) plus
//! optional `browser`, `timing` and `download` sections with sane defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scrapers::BrowserEngineConfig;
use crate::services::capture::CaptureTiming;
use crate::services::download::DownloadConfig;

/// Default config file, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".scraper_config.json";

/// Default session file written by `login` and read by `scrape`.
pub const DEFAULT_SESSION_FILE: &str = "insta_session.json";

/// Errors raised while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config not found at {}. Run `reels config` first.", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {format} config: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    #[error("Failed to write config file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Persisted scraper configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Reels feed to scroll, e.g. `https://www.instagram.com/<user>/reels/`.
    pub url: String,

    /// Directory receiving captured JSON pages.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Number of scroll-to-bottom steps after the initial load.
    #[serde(default = "default_scroll_count")]
    pub scroll_count: u32,

    /// Seconds to wait after each scroll (a fixed margin is added on top).
    #[serde(default = "default_scroll_delay")]
    pub scroll_delay: f64,

    /// Run the browser without a window.
    #[serde(default)]
    pub headless: bool,

    /// Session file holding the authenticated cookies.
    #[serde(default = "default_session_file")]
    pub session_file: String,

    /// Browser launch options.
    #[serde(default, skip_serializing_if = "BrowserEngineConfig::is_default")]
    pub browser: BrowserEngineConfig,

    /// Capture loop timing.
    #[serde(default, skip_serializing_if = "TimingConfig::is_default")]
    pub timing: TimingConfig,

    /// Media download options.
    #[serde(default, skip_serializing_if = "DownloadSettings::is_default")]
    pub download: DownloadSettings,

    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

fn default_output_dir() -> String {
    "output".to_string()
}

fn default_scroll_count() -> u32 {
    20
}

fn default_scroll_delay() -> f64 {
    2.0
}

fn default_session_file() -> String {
    DEFAULT_SESSION_FILE.to_string()
}

/// Fixed waits around the scroll loop, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Wait after the initial navigation before scrolling.
    #[serde(default = "default_settle_secs")]
    pub settle_secs: f64,
    /// Extra wait added to every scroll delay; responses lag the scroll.
    #[serde(default = "default_scroll_margin_secs")]
    pub scroll_margin_secs: f64,
    /// Wait after the last scroll for in-flight responses.
    #[serde(default = "default_drain_secs")]
    pub drain_secs: f64,
    /// End the drain early once no relevant response arrived for this long.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_secs: Option<f64>,
    /// Upper bound on concurrently running capture handlers.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

fn default_settle_secs() -> f64 {
    5.0
}

fn default_scroll_margin_secs() -> f64 {
    2.0
}

fn default_drain_secs() -> f64 {
    10.0
}

fn default_max_in_flight() -> usize {
    8
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_secs: default_settle_secs(),
            scroll_margin_secs: default_scroll_margin_secs(),
            drain_secs: default_drain_secs(),
            idle_secs: None,
            max_in_flight: default_max_in_flight(),
        }
    }
}

impl TimingConfig {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Convert to the capture loop's duration-based timing.
    pub fn to_capture_timing(&self) -> CaptureTiming {
        CaptureTiming {
            settle: secs(self.settle_secs),
            scroll_margin: secs(self.scroll_margin_secs),
            drain: secs(self.drain_secs),
            idle: self.idle_secs.map(secs),
            max_in_flight: self.max_in_flight.max(1),
        }
    }
}

/// Media download settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadSettings {
    /// Directory receiving downloaded media.
    #[serde(default = "default_download_dir")]
    pub output_dir: String,
    /// Lower bound of the random pause between fetches, in seconds.
    #[serde(default = "default_delay_min_secs")]
    pub delay_min_secs: f64,
    /// Upper bound of the random pause between fetches, in seconds.
    #[serde(default = "default_delay_max_secs")]
    pub delay_max_secs: f64,
    /// External fetch binary.
    #[serde(default = "default_fetch_binary")]
    pub fetch_binary: String,
    /// Format selector passed to the fetch binary.
    #[serde(default = "default_format")]
    pub format: String,
    /// Additional arguments passed before the URL.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
    /// Hosts accepted for download; anything else is skipped.
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,
}

fn default_download_dir() -> String {
    "downloads".to_string()
}

fn default_delay_min_secs() -> f64 {
    1.0
}

fn default_delay_max_secs() -> f64 {
    2.5
}

fn default_fetch_binary() -> String {
    "yt-dlp".to_string()
}

fn default_format() -> String {
    "best".to_string()
}

fn default_allowed_hosts() -> Vec<String> {
    vec!["instagram.com".to_string()]
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            output_dir: default_download_dir(),
            delay_min_secs: default_delay_min_secs(),
            delay_max_secs: default_delay_max_secs(),
            fetch_binary: default_fetch_binary(),
            format: default_format(),
            extra_args: Vec::new(),
            allowed_hosts: default_allowed_hosts(),
        }
    }
}

impl DownloadSettings {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Durations are validated on load; anything unrepresentable clamps.
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

/// A seconds field must be a non-negative value that fits a `Duration`.
fn check_secs(field: &str, value: f64) -> Result<(), ConfigError> {
    if value < 0.0 || Duration::try_from_secs_f64(value).is_err() {
        return Err(ConfigError::Invalid(format!(
            "{} must be a non-negative number of seconds (got {})",
            field, value
        )));
    }
    Ok(())
}

impl Config {
    /// Create a config for a feed URL with every other field defaulted.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            output_dir: default_output_dir(),
            scroll_count: default_scroll_count(),
            scroll_delay: default_scroll_delay(),
            headless: false,
            session_file: default_session_file(),
            browser: BrowserEngineConfig::default(),
            timing: TimingConfig::default(),
            download: DownloadSettings::default(),
            source_path: None,
        }
    }

    /// Load configuration.
    ///
    /// Priority: explicit path, then `.scraper_config.json` in the working
    /// directory, then a `reelscrape.*` file discovered by prefer.
    pub async fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from_path(path).await;
        }

        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Self::load_from_path(&local).await;
        }

        if let Ok(pref_config) = prefer::load("reelscrape").await {
            if let Some(path) = pref_config.source_path() {
                tracing::debug!("Discovered config at {}", path.display());
                return Self::load_from_path(path).await;
            }
        }

        Err(ConfigError::NotFound(local))
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()))
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents).map_err(|e| ConfigError::Parse {
                format: "TOML",
                message: e.to_string(),
            })?,
            "yaml" | "yml" => serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
                format: "YAML",
                message: e.to_string(),
            })?,
            _ => serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
                format: "JSON",
                message: e.to_string(),
            })?,
        };

        config.validate()?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Write configuration to `path`, picking the format from its extension.
    pub async fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let contents = match ext {
            "toml" => toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
                format: "TOML",
                message: e.to_string(),
            })?,
            "yaml" | "yml" => serde_yaml::to_string(self).map_err(|e| ConfigError::Parse {
                format: "YAML",
                message: e.to_string(),
            })?,
            _ => serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse {
                format: "JSON",
                message: e.to_string(),
            })?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ConfigError::Write {
                    path: path.to_path_buf(),
                    source,
                })?;
        }

        tokio::fs::write(path, contents)
            .await
            .map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Reject values the scraper cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Invalid("url must not be empty".to_string()));
        }

        let timing = &self.timing;
        let dl = &self.download;
        check_secs("scroll_delay", self.scroll_delay)?;
        check_secs("timing.settle_secs", timing.settle_secs)?;
        check_secs("timing.scroll_margin_secs", timing.scroll_margin_secs)?;
        check_secs("timing.drain_secs", timing.drain_secs)?;
        if let Some(idle) = timing.idle_secs {
            check_secs("timing.idle_secs", idle)?;
        }
        check_secs("download.delay_min_secs", dl.delay_min_secs)?;
        check_secs("download.delay_max_secs", dl.delay_max_secs)?;

        if dl.delay_max_secs < dl.delay_min_secs {
            return Err(ConfigError::Invalid(format!(
                "download delay bounds must satisfy 0 <= min <= max (got {}..{})",
                dl.delay_min_secs, dl.delay_max_secs
            )));
        }
        Ok(())
    }

    /// Get the base directory for resolving relative paths.
    /// Returns the config file's parent directory if available, otherwise None.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to the config file location or CWD
    pub fn resolve_path(&self, path_str: &str) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            match self.base_dir() {
                Some(base) => base.join(path),
                None => path.to_path_buf(),
            }
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve_path(&self.output_dir)
    }

    pub fn session_path(&self) -> PathBuf {
        self.resolve_path(&self.session_file)
    }

    pub fn download_dir(&self) -> PathBuf {
        self.resolve_path(&self.download.output_dir)
    }

    pub fn scroll_delay(&self) -> Duration {
        secs(self.scroll_delay)
    }

    /// Browser options with the top-level `headless` flag applied.
    pub fn engine_config(&self) -> BrowserEngineConfig {
        BrowserEngineConfig {
            headless: self.headless,
            ..self.browser.clone()
        }
    }

    /// Download orchestrator configuration derived from the `download` section.
    pub fn download_config(&self) -> DownloadConfig {
        DownloadConfig {
            output_dir: self.download_dir(),
            delay_min: secs(self.download.delay_min_secs),
            delay_max: secs(self.download.delay_max_secs),
            allowed_hosts: self.download.allowed_hosts.clone(),
        }
    }
}
