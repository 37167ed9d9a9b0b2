//! reelscrape - Instagram reels feed capture and metrics extraction.
//!
//! Core library behind the `reels` binary. The pipeline runs one way:
//! capture loop -> raw JSON pages -> metric extractor -> CSV sink -> downloader.

pub mod cli;
pub mod config;
pub mod scrapers;
pub mod services;
pub mod utils;
