//! Persistent storage for scraped rows and run metadata.
//!
//! The store mirrors a spreadsheet with two tabs:
//!
//! | Tab  | Columns |
//! |------|---------|
//! | NEWS | [`NEWS_HEADERS`], one [`StoredRecord`] per row, append-only |
//! | META | `key`, `value` |
//!
//! # Backends
//!
//! - [`sheets`]: Google Sheets v4 REST API
//! - [`local`]: JSON files in a directory, for offline runs
//!
//! The store never deduplicates or reorders rows; the
//! [`FingerprintIndex`] owns dedup.

use crate::dedup::FingerprintIndex;
use crate::error::Result;
use crate::models::StoredRecord;
use tracing::{info, instrument};

pub mod local;
#[cfg(test)]
pub mod memory;
pub mod sheets;

pub const NEWS_TAB: &str = "NEWS";
pub const META_TAB: &str = "META";

pub const NEWS_HEADERS: [&str; 9] = [
    "published_at",
    "source",
    "title",
    "url",
    "url_canonical",
    "tags",
    "title_hash",
    "simhash",
    "duplicate_of",
];

pub const META_HEADERS: [&str; 2] = ["key", "value"];

/// Row and key/value access to a NEWS/META store.
pub trait NewsStore {
    /// Create the NEWS and META tabs with their header rows when missing.
    /// Existing tabs are left untouched.
    async fn ensure_tabs(&self) -> Result<()>;

    /// Every NEWS row below the header, in storage order.
    async fn read_rows(&self) -> Result<Vec<Vec<String>>>;

    /// Append rows to NEWS in the order given.
    async fn append_rows(&self, rows: &[Vec<String>]) -> Result<()>;

    /// Value stored under `key` in META, or an empty string.
    async fn meta_get(&self, key: &str) -> Result<String>;

    /// Overwrite `key` in META, appending a new entry when absent.
    async fn meta_set(&self, key: &str, value: &str) -> Result<()>;
}

/// Rebuild the run-scoped dedup index from every stored row.
#[instrument(level = "info", skip(store))]
pub async fn load_indexes<S: NewsStore>(store: &S, window_size: usize) -> Result<FingerprintIndex> {
    let rows = store.read_rows().await?;
    let index = FingerprintIndex::from_rows(&rows, window_size);
    info!(
        rows = rows.len(),
        urls = index.seen_url_count(),
        title_hashes = index.seen_title_hash_count(),
        window = index.window_len(),
        "Loaded dedup indexes"
    );
    Ok(index)
}

/// Append records in order with a single write; a no-op for an empty slice.
#[instrument(level = "info", skip_all, fields(count = records.len()))]
pub async fn append_records<S: NewsStore>(store: &S, records: &[StoredRecord]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    let rows: Vec<Vec<String>> = records.iter().map(StoredRecord::to_row).collect();
    store.append_rows(&rows).await?;
    info!(count = rows.len(), "Appended records");
    Ok(())
}

/// Cell `i` of `row`, or an empty string when the row is short.
pub(crate) fn cell(row: &[String], i: usize) -> &str {
    row.get(i).map(String::as_str).unwrap_or("")
}
