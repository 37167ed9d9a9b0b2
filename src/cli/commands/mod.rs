//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod config_cmd;
mod download;
mod extract;
mod login;
mod scrape;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::services::SortMode;

#[derive(Parser)]
#[command(name = "reels")]
#[command(about = "Instagram reels scraper: capture feed pages, summarize metrics, download media")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides .scraper_config.json and auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Set up the scraper configuration (interactive unless --url is given)
    Config {
        /// Reels feed URL, e.g. https://www.instagram.com/<user>/reels/
        #[arg(long)]
        url: Option<String>,
        /// Directory for captured JSON pages
        #[arg(long)]
        output_dir: Option<String>,
        /// Number of scroll actions
        #[arg(long)]
        scroll_count: Option<u32>,
        /// Seconds between scrolls
        #[arg(long)]
        scroll_delay: Option<f64>,
        /// Run the browser headless
        #[arg(long)]
        headless: Option<bool>,
        /// Print the current configuration instead of editing it
        #[arg(long)]
        show: bool,
    },

    /// Log in with INSTAGRAM_USERNAME / INSTAGRAM_PASSWORD and save the session
    Login {
        #[arg(long, env = "INSTAGRAM_USERNAME")]
        username: String,
        #[arg(long, env = "INSTAGRAM_PASSWORD", hide_env_values = true)]
        password: String,
        /// Seconds to wait after submitting the form (time for manual challenges)
        #[arg(long, default_value = "10")]
        wait: u64,
    },

    /// Scroll the configured feed and save every paginated response
    Scrape {
        /// Override the configured scroll count
        #[arg(long)]
        scroll_count: Option<u32>,
        /// Run the browser headless regardless of config
        #[arg(long)]
        headless: bool,
        /// Write the CSV summary right after capturing
        #[arg(long)]
        extract: bool,
    },

    /// Convert captured JSON pages into a CSV summary
    Extract {
        /// Output CSV file
        #[arg(short, long, default_value = "reels_summary.csv")]
        output: PathBuf,
        /// Sort keys in priority order (repeatable)
        #[arg(short, long, value_enum)]
        sort: Vec<SortMode>,
        /// Write raw counts instead of 1.5M / 13K
        #[arg(long)]
        raw: bool,
        /// Read captures from this directory instead of the configured one
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Download reel media with yt-dlp
    Download {
        /// CSV with a `url` column (and optional `plays` column)
        #[arg(long, conflicts_with = "url", required_unless_present = "url")]
        csv: Option<PathBuf>,
        /// Download a single reel URL
        #[arg(long)]
        url: Option<String>,
        /// Directory receiving the media files
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Show a progress bar
        #[arg(short = 'P', long)]
        progress: bool,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Config {
            url,
            output_dir,
            scroll_count,
            scroll_delay,
            headless,
            show,
        } => {
            if show {
                config_cmd::cmd_config_show(config_path).await
            } else {
                let overrides = config_cmd::ConfigOverrides {
                    url,
                    output_dir,
                    scroll_count,
                    scroll_delay,
                    headless,
                };
                config_cmd::cmd_config(config_path, overrides).await
            }
        }
        Commands::Login {
            username,
            password,
            wait,
        } => login::cmd_login(config_path, username, password, wait).await,
        Commands::Scrape {
            scroll_count,
            headless,
            extract,
        } => scrape::cmd_scrape(config_path, scroll_count, headless, extract).await,
        Commands::Extract {
            output,
            sort,
            raw,
            dir,
        } => extract::cmd_extract(config_path, &output, &sort, raw, dir.as_deref()).await,
        Commands::Download {
            csv,
            url,
            output,
            progress,
        } => download::cmd_download(config_path, csv, url, output, progress).await,
    }
}
