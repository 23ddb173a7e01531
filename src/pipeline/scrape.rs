//! One scrape run: collect, deduplicate, append, record status in META.

use crate::config::{NewsConfig, RunSettings};
use crate::dedup::{BatchReport, Deduplicator, FingerprintIndex};
use crate::error::{NewsError, Result};
use crate::models::CandidateItem;
use crate::scrapers::{HttpFetcher, collect_candidates};
use crate::storage::{NewsStore, append_records, load_indexes};
use crate::tagging::Tagger;
use chrono::{SecondsFormat, Utc};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

pub const META_LAST_RUN_AT: &str = "last_run_at";
pub const META_LAST_ERROR: &str = "last_error";
pub const META_LAST_INSERTED_COUNT: &str = "last_inserted_count";

#[derive(Debug)]
pub enum ScrapeOutcome {
    /// `rss_enabled` was off; nothing was fetched.
    Disabled,
    Completed(BatchReport),
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Run a full scrape against `store`.
///
/// A fatal error is written to META `last_error` (best effort) and returned.
#[instrument(level = "info", skip_all)]
pub async fn run_scrape<S: NewsStore>(store: &S, config: &NewsConfig) -> Result<ScrapeOutcome> {
    match scrape(store, config).await {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            error!(error = %e, "Scrape run failed");
            record_failure(store, &e.to_string()).await;
            Err(e)
        }
    }
}

async fn scrape<S: NewsStore>(store: &S, config: &NewsConfig) -> Result<ScrapeOutcome> {
    store.ensure_tabs().await?;
    let settings = RunSettings::read(store).await?;
    info!(?settings, "Run settings");

    store.meta_set(META_LAST_RUN_AT, &now_rfc3339()).await?;
    store.meta_set(META_LAST_ERROR, "").await?;

    if !settings.rss_enabled {
        warn!("rss_enabled is off; skipping collection");
        store.meta_set(META_LAST_INSERTED_COUNT, "0").await?;
        return Ok(ScrapeOutcome::Disabled);
    }

    let index = load_indexes(store, settings.recent_sim_n).await?;
    let fetcher = HttpFetcher::new(&config.http, settings.fetch_timeout_sec)?;
    let tagger = Tagger::from_config(config);
    let candidates = collect_candidates(config, &settings, &fetcher, &tagger).await;

    let report = match ingest_into_store(store, index, settings.max_hamming, candidates).await {
        Ok(report) => report,
        Err(IngestError { report, source }) => {
            warn!(pending = report.accepted(), error = %source, "Append failed; retrying once");
            store_batch(store, &report).await?;
            report
        }
    };
    Ok(ScrapeOutcome::Completed(report))
}

/// A classified batch whose records could not be appended.
///
/// Nothing from `report.records` reached the store, so passing `report` to
/// [`store_batch`] again is safe.
#[derive(Debug, Error)]
#[error("append of {} records failed: {source}", .report.records.len())]
pub struct IngestError {
    pub report: BatchReport,
    #[source]
    pub source: NewsError,
}

/// Classify `candidates` against `index`, then [`store_batch`] the result.
#[instrument(level = "info", skip_all, fields(candidates = candidates.len()))]
pub async fn ingest_into_store<S: NewsStore>(
    store: &S,
    index: FingerprintIndex,
    max_hamming: u32,
    candidates: Vec<CandidateItem>,
) -> std::result::Result<BatchReport, IngestError> {
    let mut dedup = Deduplicator::new(index, max_hamming);
    let report = dedup.ingest(candidates);
    if report.all_failed() {
        warn!(failed = report.outcomes.len(), "Every candidate failed validation");
    }

    match store_batch(store, &report).await {
        Ok(()) => Ok(report),
        Err(source) => Err(IngestError { report, source }),
    }
}

/// Append `report.records` and record the accepted count in META.
///
/// Only the append can fail; once the rows are stored a failed
/// `last_inserted_count` write is logged and ignored.
pub async fn store_batch<S: NewsStore>(store: &S, report: &BatchReport) -> Result<()> {
    append_records(store, &report.records).await?;
    if let Err(e) = store
        .meta_set(META_LAST_INSERTED_COUNT, &report.accepted().to_string())
        .await
    {
        warn!(error = %e, "Could not record last_inserted_count");
    }

    info!(
        inserted = report.accepted(),
        near_duplicates = report.near_duplicates(),
        exact_duplicates = report.exact_duplicates(),
        failed = report.failures().count(),
        "Scrape batch stored"
    );
    Ok(())
}

async fn record_failure<S: NewsStore>(store: &S, message: &str) {
    if let Err(e) = store.meta_set(META_LAST_ERROR, message).await {
        warn!(error = %e, "Could not record last_error");
    }
    if let Err(e) = store.meta_set(META_LAST_RUN_AT, &now_rfc3339()).await {
        warn!(error = %e, "Could not record last_run_at");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::{canonicalize_url, title_hash};
    use crate::storage::memory::MemoryStore;

    fn candidate(title: &str, url: &str) -> CandidateItem {
        CandidateItem {
            published_at: "2025-05-06T00:00:00+00:00".to_string(),
            source: "병원신문".to_string(),
            title: title.to_string(),
            url: url.to_string(),
            url_canonical: canonicalize_url(url),
            tags: vec!["의료/의료정책".to_string()],
        }
    }

    fn batch() -> Vec<CandidateItem> {
        vec![
            candidate("전공의 파업 확산", "http://x/1"),
            candidate("간호사 인력난 심화", "http://x/2"),
            candidate("A병원 파업", "http://x/3"),
        ]
    }

    #[tokio::test]
    async fn test_rerun_on_same_batch_adds_nothing() {
        let store = MemoryStore::default();

        let index = load_indexes(&store, 800).await.unwrap();
        let first = ingest_into_store(&store, index, 6, batch()).await.unwrap();
        assert_eq!(first.accepted(), 3);
        assert_eq!(store.row_count(), 3);

        let index = load_indexes(&store, 800).await.unwrap();
        let second = ingest_into_store(&store, index, 6, batch()).await.unwrap();
        assert_eq!(second.accepted(), 0);
        assert_eq!(second.exact_duplicates(), 3);
        assert_eq!(store.row_count(), 3);
        assert_eq!(store.meta_get(META_LAST_INSERTED_COUNT).await.unwrap(), "0");
        // The empty second batch never touched storage.
        assert_eq!(*store.append_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_tracking_parameter_variant_is_dropped() {
        let store = MemoryStore::default();
        let index = load_indexes(&store, 800).await.unwrap();
        let report = ingest_into_store(
            &store,
            index,
            6,
            vec![
                candidate("A병원 파업", "http://x/1"),
                candidate("A병원 파업", "http://x/1?utm_source=rss"),
            ],
        )
        .await
        .unwrap();

        assert_eq!(report.accepted(), 1);
        assert_eq!(report.exact_duplicates(), 1);
        let rows = store.rows.lock().unwrap().clone();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][4], "http://x/1");
        assert_eq!(rows[0][6], title_hash("A병원 파업"));
        assert_eq!(store.meta_get(META_LAST_INSERTED_COUNT).await.unwrap(), "1");
    }

    #[tokio::test]
    async fn test_near_duplicate_is_stored_with_annotation() {
        let store = MemoryStore::default();
        let index = load_indexes(&store, 800).await.unwrap();
        let report = ingest_into_store(
            &store,
            index,
            6,
            vec![
                candidate("전공의 파업 확산", "http://x/1"),
                candidate("전공의 파업 확산!", "http://y/9"),
            ],
        )
        .await
        .unwrap();

        assert_eq!(report.accepted(), 2);
        assert_eq!(report.near_duplicates(), 1);
        let rows = store.rows.lock().unwrap().clone();
        assert_eq!(rows[1][8], "http://x/1");
    }

    #[tokio::test]
    async fn test_disabled_run_fetches_nothing() {
        let store = MemoryStore::default();
        store.meta_set("rss_enabled", "false").await.unwrap();
        let config = NewsConfig::builtin().unwrap();

        let outcome = run_scrape(&store, &config).await.unwrap();
        assert!(matches!(outcome, ScrapeOutcome::Disabled));
        assert_eq!(store.meta_get(META_LAST_INSERTED_COUNT).await.unwrap(), "0");
        assert_eq!(store.meta_get(META_LAST_ERROR).await.unwrap(), "");
        assert!(!store.meta_get(META_LAST_RUN_AT).await.unwrap().is_empty());
        assert_eq!(store.row_count(), 0);
    }

    #[tokio::test]
    async fn test_read_failure_aborts_and_records_error() {
        let store = MemoryStore {
            fail_reads: true,
            ..Default::default()
        };
        let config = NewsConfig::builtin().unwrap();

        let err = run_scrape(&store, &config).await.unwrap_err();
        assert!(matches!(err, NewsError::StorageRead(_)));
        assert!(
            store
                .meta_get(META_LAST_ERROR)
                .await
                .unwrap()
                .contains("simulated outage")
        );
        assert_eq!(*store.append_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_append_keeps_batch_for_retry() {
        let store = MemoryStore {
            failing_appends: std::sync::Mutex::new(1),
            ..Default::default()
        };
        let index = load_indexes(&store, 800).await.unwrap();

        let err = ingest_into_store(&store, index, 6, batch()).await.unwrap_err();
        assert!(matches!(err.source, NewsError::StorageWrite(_)));
        assert_eq!(err.report.records.len(), 3);
        assert_eq!(err.report.accepted(), 3);
        assert_eq!(store.row_count(), 0);
        assert_eq!(store.meta_get(META_LAST_INSERTED_COUNT).await.unwrap(), "");

        store_batch(&store, &err.report).await.unwrap();
        assert_eq!(store.row_count(), 3);
        assert_eq!(store.meta_get(META_LAST_INSERTED_COUNT).await.unwrap(), "3");
        assert_eq!(*store.append_calls.lock().unwrap(), 2);
    }
}
