//! Formatting utilities.

/// Format a play/like count the way the summary CSV shows it.
///
/// Millions keep one decimal, thousands are rounded to a whole number:
/// `1_500_000 -> "1.5M"`, `2_300 -> "2K"`, `950 -> "950"`.
pub fn humanize_count(count: u64) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.0}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}

/// Format an engagement rate as a two-decimal percentage string.
pub fn format_engagement(rate: f64) -> String {
    format!("{:.2}%", rate)
}
