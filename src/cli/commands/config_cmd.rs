//! Configuration management commands.

use std::path::{Path, PathBuf};

use anyhow::Context;
use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm, Input};

use crate::cli::icons::{dim_arrow, success};
use crate::config::{Config, ConfigError, DEFAULT_CONFIG_FILE};

/// Values given on the command line; any that are set skip their prompt.
#[derive(Debug, Default)]
pub struct ConfigOverrides {
    pub url: Option<String>,
    pub output_dir: Option<String>,
    pub scroll_count: Option<u32>,
    pub scroll_delay: Option<f64>,
    pub headless: Option<bool>,
}

impl ConfigOverrides {
    /// With a URL given, everything else falls back to defaults without prompting.
    fn is_non_interactive(&self) -> bool {
        self.url.is_some()
    }

    fn apply(self, config: &mut Config) {
        if let Some(url) = self.url {
            config.url = url;
        }
        if let Some(output_dir) = self.output_dir {
            config.output_dir = output_dir;
        }
        if let Some(scroll_count) = self.scroll_count {
            config.scroll_count = scroll_count;
        }
        if let Some(scroll_delay) = self.scroll_delay {
            config.scroll_delay = scroll_delay;
        }
        if let Some(headless) = self.headless {
            config.headless = headless;
        }
    }
}

/// Load the existing config to use as prompt defaults, if there is one.
async fn load_existing(path: Option<&Path>) -> anyhow::Result<Option<Config>> {
    match Config::load(path).await {
        Ok(config) => Ok(Some(config)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(e).context("Existing config is unreadable; fix or delete it first"),
    }
}

/// Create or update the scraper configuration.
pub async fn cmd_config(path: Option<&Path>, overrides: ConfigOverrides) -> anyhow::Result<()> {
    let existing = load_existing(path).await?;
    let target = path
        .map(Path::to_path_buf)
        .or_else(|| existing.as_ref().and_then(|c| c.source_path.clone()))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut config = existing.unwrap_or_else(|| Config::new(""));

    let interactive = !overrides.is_non_interactive();
    overrides.apply(&mut config);
    if interactive {
        prompt(&mut config)?;
    }

    config
        .save_to_path(&target)
        .await
        .with_context(|| format!("Failed to save config to {}", target.display()))?;

    // Reload so relative paths resolve against the saved file
    let saved = Config::load_from_path(&target).await?;
    tokio::fs::create_dir_all(saved.output_dir())
        .await
        .with_context(|| format!("Failed to create {}", saved.output_dir().display()))?;

    println!("{} Config saved to {}", success(), target.display());
    println!("  {} Feed: {}", dim_arrow(), saved.url);
    println!("  {} Captures: {}", dim_arrow(), saved.output_dir().display());
    Ok(())
}

fn prompt(config: &mut Config) -> anyhow::Result<()> {
    let theme = ColorfulTheme::default();

    config.url = Input::<String>::with_theme(&theme)
        .with_prompt("Instagram reels URL")
        .with_initial_text(config.url.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("URL is required")
            } else {
                Ok(())
            }
        })
        .interact_text()?
        .trim()
        .to_string();

    config.output_dir = Input::with_theme(&theme)
        .with_prompt("Output folder")
        .default(config.output_dir.clone())
        .interact_text()?;

    config.scroll_count = Input::with_theme(&theme)
        .with_prompt("Scroll count")
        .default(config.scroll_count)
        .interact_text()?;

    config.scroll_delay = Input::with_theme(&theme)
        .with_prompt("Scroll delay (seconds)")
        .default(config.scroll_delay)
        .validate_with(|input: &f64| -> Result<(), &str> {
            if input.is_finite() && *input >= 0.0 {
                Ok(())
            } else {
                Err("delay must be zero or more seconds")
            }
        })
        .interact_text()?;

    config.headless = Confirm::with_theme(&theme)
        .with_prompt("Run headless?")
        .default(config.headless)
        .interact()?;

    Ok(())
}

/// Print the effective configuration.
pub async fn cmd_config_show(path: Option<&Path>) -> anyhow::Result<()> {
    let config = Config::load(path).await?;

    let source = config
        .source_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".to_string());
    println!("{} {}", style("Config:").bold(), source);
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
