//! Small helpers shared across scrapers, storage and analysis.
//!
//! - Whitespace normalization used by tagging, hashing and tokenizing
//! - Date parsing for feed and listing-page timestamps
//! - Log-friendly truncation and JSON truncation detection
//! - Output directory validation

use crate::error::Result;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument, warn};

static LISTING_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2})").expect("valid date regex"));

/// Collapse whitespace runs to a single space and trim.
pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a feed timestamp (RFC 2822 or RFC 3339, naive values read as UTC)
/// into RFC 3339. Unparseable input yields an empty string.
pub fn parse_feed_date(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return dt.to_rfc3339();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.to_rfc3339();
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, fmt) {
            return Utc.from_utc_datetime(&naive).to_rfc3339();
        }
    }
    String::new()
}

/// Find a `YYYY-MM-DD` or `YYYY.MM.DD` date in a listing cell and return
/// UTC midnight of that day as RFC 3339, or an empty string.
pub fn parse_listing_date(cell: &str) -> String {
    let text = cell.trim().replace('.', "-");
    let Some(m) = LISTING_DATE.captures(&text).and_then(|c| c.get(1)) else {
        return String::new();
    };
    NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive).to_rfc3339())
        .unwrap_or_default()
}

/// Truncate a string for logging.
///
/// Long strings are cut at the last character boundary before `max` bytes
/// and get `"…(+N bytes)"` appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(+{} bytes)", &s[..end], s.len() - end)
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// Model responses cut off by token limits fail with an EOF error; those are
/// worth one re-ask.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and deletes a marker file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).await?;
    let marker_path = path.join("..__write_check__");
    fs::File::create(&marker_path).await?;
    if let Err(e) = fs::remove_file(&marker_path).await {
        warn!(path = %marker_path.display(), error = %e, "Could not remove write-check file");
    }
    info!("Output directory is writable");
    Ok(())
}
