//! Article text enrichment.
//!
//! Syncs new NEWS rows into the native warehouse table, then fills
//! `article_text` for rows that have none by fetching each article page and
//! extracting its main text.

use crate::error::Result;
use crate::scrapers::HttpFetcher;
use crate::utils::{normalize_ws, truncate_for_log};
use crate::warehouse::Warehouse;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, error, info, instrument, warn};

/// URLs handled per run.
pub const DEFAULT_ENRICH_LIMIT: usize = 180;
/// Concurrent page fetches.
pub const FETCH_PARALLELISM: usize = 4;
/// Article pages are heavier than feeds.
pub const FETCH_TIMEOUT_SEC: u64 = 20;

static ARTICLE_PARAGRAPHS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("article p").expect("valid selector"));
static PARAGRAPHS: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("valid selector"));
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("valid selector"));

/// Source of article HTML.
pub trait PageFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String>;
}

impl PageFetcher for HttpFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String> {
        self.get_text(url).await
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnrichReport {
    pub synced: u64,
    pub attempted: usize,
    pub filled: usize,
    /// Pages fetched but with no extractable text.
    pub empty: usize,
    pub failed: usize,
}

/// Main text of an article page.
///
/// Paragraphs inside `<article>` win; otherwise every `<p>` on the page;
/// otherwise the visible body text. Returns an empty string when nothing is
/// found.
pub fn extract_article_text(html: &str) -> String {
    let document = Html::parse_document(html);

    for sel in [&*ARTICLE_PARAGRAPHS, &*PARAGRAPHS] {
        let paragraphs: Vec<String> = document
            .select(sel)
            .map(|p| normalize_ws(&p.text().collect::<Vec<_>>().join(" ")))
            .filter(|t| !t.is_empty())
            .collect();
        if !paragraphs.is_empty() {
            return paragraphs.join("\n");
        }
    }

    document
        .select(&BODY)
        .next()
        .map(visible_text)
        .unwrap_or_default()
}

fn visible_text(root: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name()))
            .is_some_and(|name| matches!(name, "script" | "style" | "noscript"));
        if !hidden {
            let text: &str = text;
            parts.push(text.to_string());
        }
    }
    normalize_ws(&parts.join(" "))
}

/// Sync, then fill missing article text for up to `limit` URLs.
///
/// A failing URL is logged and counted; the run continues.
#[instrument(level = "info", skip(warehouse, fetcher))]
pub async fn run_enrich<W, F>(warehouse: &W, fetcher: &F, limit: usize) -> Result<EnrichReport>
where
    W: Warehouse,
    F: PageFetcher,
{
    let synced = warehouse.sync_entries().await?;
    let urls = warehouse.urls_missing_text(limit).await?;
    info!(synced, pending = urls.len(), "Enrichment queue loaded");

    let mut report = EnrichReport {
        synced,
        attempted: urls.len(),
        ..Default::default()
    };

    let fetched: Vec<(String, Result<String>)> = stream::iter(urls)
        .map(|url| async move {
            let text = fetcher.fetch_page(&url).await.map(|html| extract_article_text(&html));
            (url, text)
        })
        .buffer_unordered(FETCH_PARALLELISM)
        .collect()
        .await;

    for (url, result) in fetched {
        match result {
            Ok(text) if text.is_empty() => {
                warn!(%url, "No article text found");
                report.empty += 1;
            }
            Ok(text) => match warehouse.set_article_text(&url, &text).await {
                Ok(()) => {
                    debug!(%url, preview = %truncate_for_log(&text, 80), "Stored article text");
                    report.filled += 1;
                }
                Err(e) => {
                    error!(%url, error = %e, "Failed to store article text");
                    report.failed += 1;
                }
            },
            Err(e) => {
                warn!(%url, error = %e, "Article fetch failed");
                report.failed += 1;
            }
        }
    }

    info!(
        attempted = report.attempted,
        filled = report.filled,
        empty = report.empty,
        failed = report.failed,
        "Enrichment finished"
    );
    Ok(report)
}
