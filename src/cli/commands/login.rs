//! Login command: authenticate in a real browser and save the session.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;

use crate::cli::icons::{dim_arrow, info, success};
use crate::config::{Config, ConfigError};
use crate::scrapers::{BrowserSession, Credentials};

/// Log in and write the session file used by `scrape`.
pub async fn cmd_login(
    config_path: Option<&Path>,
    username: String,
    password: String,
    wait: u64,
) -> anyhow::Result<()> {
    // Login works without a config; it only needs browser settings and the session path
    let config = match Config::load(config_path).await {
        Ok(config) => config,
        Err(ConfigError::NotFound(_)) => Config::new("https://www.instagram.com/"),
        Err(e) => return Err(e.into()),
    };

    if username.trim().is_empty() || password.is_empty() {
        anyhow::bail!("Set INSTAGRAM_USERNAME and INSTAGRAM_PASSWORD (in .env or the environment)");
    }

    println!("{} Logging in as {}", info(), username);

    let credentials = Credentials { username, password };
    let mut browser = BrowserSession::new(config.engine_config());
    let result = browser
        .login(&credentials, Duration::from_secs(wait))
        .await;
    browser.close().await;
    let session = result.context("Login failed")?;

    let session_path = config.session_path();
    session
        .save(&session_path)
        .await
        .with_context(|| format!("Failed to save session to {}", session_path.display()))?;

    println!("{} Session saved to {}", success(), session_path.display());
    println!("  {} {} cookies", dim_arrow(), session.cookies.len());
    Ok(())
}
