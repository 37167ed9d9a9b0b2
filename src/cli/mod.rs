//! Command-line interface for reelscrape.

mod commands;
pub mod icons;
pub mod progress;

pub use commands::{is_verbose, run};
