//! Authenticated session persistence.
//!
//! Sessions use the Playwright `storage_state` layout (`cookies` plus
//! per-origin `localStorage`), so files written by other tooling load as-is.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised while loading or saving a session file.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session file not found at {}. Run `reels login` first.", .0.display())]
    Missing(PathBuf),

    #[error("Session file {} holds no usable cookies. Run `reels login` again.", .0.display())]
    Empty(PathBuf),

    #[error("Failed to parse session file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Saved browser state: cookies and localStorage per origin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    #[serde(default)]
    pub cookies: Vec<SessionCookie>,
    #[serde(default)]
    pub origins: Vec<OriginState>,
}

/// A single saved cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCookie {
    #[serde(alias = "key")]
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    /// Unix seconds; `-1` marks a session cookie.
    #[serde(default = "default_expires")]
    pub expires: f64,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

fn default_expires() -> f64 {
    -1.0
}

/// localStorage entries saved for one origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginState {
    pub origin: String,
    #[serde(default)]
    pub local_storage: Vec<StorageEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub name: String,
    pub value: String,
}

impl SessionCookie {
    /// Cookies without a name or domain cannot be injected.
    pub fn is_usable(&self) -> bool {
        !self.name.is_empty() && !self.domain.is_empty()
    }
}

impl SessionState {
    /// Load a session file, failing when it is absent or has no usable cookies.
    pub async fn load(path: &Path) -> Result<Self, SessionError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::Missing(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };

        let state: SessionState = serde_json::from_str(&content)?;
        if state.usable_cookies().next().is_none() {
            return Err(SessionError::Empty(path.to_path_buf()));
        }

        debug!(
            "Loaded session from {:?} ({} cookies, {} origins)",
            path,
            state.cookies.len(),
            state.origins.len()
        );
        Ok(state)
    }

    /// Write the session file, creating parent directories as needed.
    pub async fn save(&self, path: &Path) -> Result<(), SessionError> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, json).await?;

        info!("Saved {} cookies to {:?}", self.cookies.len(), path);
        Ok(())
    }

    pub fn usable_cookies(&self) -> impl Iterator<Item = &SessionCookie> {
        self.cookies.iter().filter(|c| c.is_usable())
    }

    /// Init script restoring localStorage, scoped to each saved origin.
    ///
    /// Returns `None` when there is nothing to restore.
    pub fn local_storage_script(&self) -> Option<String> {
        let blocks: Vec<String> = self
            .origins
            .iter()
            .filter(|o| !o.local_storage.is_empty())
            .map(|o| {
                let entries: serde_json::Map<String, serde_json::Value> = o
                    .local_storage
                    .iter()
                    .map(|e| (e.name.clone(), serde_json::Value::String(e.value.clone())))
                    .collect();
                format!(
                    "if (location.origin === {}) {{ for (const [k, v] of Object.entries({})) {{ localStorage.setItem(k, v); }} }}",
                    serde_json::Value::String(o.origin.clone()),
                    serde_json::Value::Object(entries)
                )
            })
            .collect();

        if blocks.is_empty() {
            None
        } else {
            Some(format!("(() => {{ try {{ {} }} catch (e) {{}} }})();", blocks.join(" ")))
        }
    }
}
