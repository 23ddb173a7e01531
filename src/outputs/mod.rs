//! Digest output in Markdown or JSON.
//!
//! # Submodules
//!
//! - [`digest`]: record selection (KST dates, filters) and the Markdown table
//! - [`json`]: the same selection as a JSON document

pub mod digest;
pub mod json;

use crate::error::Result;
use crate::models::StoredRecord;
use crate::storage::NewsStore;
use crate::utils::ensure_writable_dir;
use clap::ValueEnum;
use digest::{DigestFilter, render_markdown, select_entries};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DigestFormat {
    Markdown,
    Json,
}

/// Render the digest of every stored row matching `filter`.
///
/// Returns the rendered document and the number of entries in it.
#[instrument(level = "info", skip(store))]
pub async fn build_digest<S: NewsStore>(
    store: &S,
    filter: &DigestFilter,
    format: DigestFormat,
) -> Result<(String, usize)> {
    let records: Vec<StoredRecord> = store
        .read_rows()
        .await?
        .iter()
        .map(|row| StoredRecord::from_row(row))
        .collect();
    let total = records.len();
    let entries = select_entries(records, filter);
    info!(total, selected = entries.len(), "Selected digest entries");

    let doc = match format {
        DigestFormat::Markdown => render_markdown(&entries, filter),
        DigestFormat::Json => json::render_json(&entries, filter)?,
    };
    Ok((doc, entries.len()))
}

/// Write `doc` to `output`, or to stdout when `output` is `None`.
#[instrument(level = "info", skip(doc), fields(bytes = doc.len()))]
pub async fn write_output(doc: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                ensure_writable_dir(parent).await?;
            }
            fs::write(path, doc).await?;
            info!(path = %path.display(), "Wrote digest");
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(doc.as_bytes()).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}
