//! Log-line scoring and level extraction
//!
//! Keyword tiers are checked in priority order, so a line containing both
//! "error" and "info" always scores as an error. Matching is
//! case-insensitive substring containment over the whole line.

/// Score a log line into a fixed severity tier
pub fn calculate_severity(line: &str) -> f64 {
    let lower = line.to_lowercase();
    if contains_any(&lower, &["error", "exception", "failed", "critical"]) {
        8.0
    } else if contains_any(&lower, &["warning", "warn", "timeout"]) {
        5.0
    } else if contains_any(&lower, &["info", "debug"]) {
        2.0
    } else {
        3.0
    }
}

/// Map a log line to a canonical level name
///
/// The ERROR tier uses the same keyword set as the top severity tier, so
/// a critical line is never filed under INFO.
pub fn extract_log_level(line: &str) -> &'static str {
    let lower = line.to_lowercase();
    if contains_any(&lower, &["error", "exception", "failed", "critical"]) {
        "ERROR"
    } else if contains_any(&lower, &["warning", "warn"]) {
        "WARNING"
    } else if lower.contains("info") {
        "INFO"
    } else if lower.contains("debug") {
        "DEBUG"
    } else {
        "INFO"
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Truncate to a maximum number of characters without splitting a code point
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
