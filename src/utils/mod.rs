//! Shared utility functions.
//!
//! This module contains reusable utilities used across the codebase:
//! - `format`: Human-readable counts and percentages for the CSV sink
//! - `url`: Reel URL normalization and filename derivation

mod format;
mod url;

pub use format::{format_engagement, humanize_count};
pub use url::{ensure_scheme, host_matches, reel_id_from_url, reel_url};
