//! Exact and near-duplicate detection for freshly scraped items.
//!
//! # Pipeline
//!
//! For each [`CandidateItem`], in order:
//!
//! 1. Hash the title and look up the canonical URL and title hash in the
//!    exact-match sets. A hit drops the item entirely.
//! 2. Fingerprint the title with SimHash and scan the recent window for the
//!    first entry within `max_hamming` bits.
//! 3. Emit a [`StoredRecord`] annotated with `duplicate_of` (near-duplicates
//!    are kept, not suppressed).
//! 4. Add the item to the index so later items in the same batch see it.
//!
//! The index is rebuilt from storage at the start of every run and dropped at
//! the end; nothing is cached between runs.

use crate::error::NewsError;
use crate::models::{CandidateItem, StoredRecord};
use chrono::DateTime;
use tracing::{debug, info, instrument, warn};

pub mod canonical;
pub mod index;
pub mod simhash;

pub use canonical::{canonicalize_url, title_hash};
pub use index::FingerprintIndex;
pub use simhash::{fingerprint_to_field, hamming, simhash64, tokenize};

/// Default Hamming threshold for near-duplicates.
pub const DEFAULT_MAX_HAMMING: u32 = 6;
/// Default number of recent fingerprints searched for near-duplicates.
pub const DEFAULT_WINDOW_SIZE: usize = 800;

/// What happened to one candidate.
#[derive(Debug)]
pub enum ItemOutcome {
    /// Persisted; `duplicate_of` names the earlier record it resembles.
    Inserted {
        url: String,
        duplicate_of: Option<String>,
    },
    /// Canonical URL or title hash already stored; dropped.
    ExactDuplicate { url: String },
    /// Rejected before classification; the batch continued.
    Failed(NewsError),
}

/// Records to persist and the per-item outcomes of one batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub records: Vec<StoredRecord>,
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchReport {
    /// Items persisted (new or near-duplicate).
    pub fn accepted(&self) -> usize {
        self.records.len()
    }

    pub fn near_duplicates(&self) -> usize {
        self.records.iter().filter(|r| r.is_near_duplicate()).count()
    }

    pub fn exact_duplicates(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ItemOutcome::ExactDuplicate { .. }))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &NewsError> {
        self.outcomes.iter().filter_map(|o| match o {
            ItemOutcome::Failed(e) => Some(e),
            _ => None,
        })
    }

    /// True when there was input and none of it could be processed.
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.failures().count() == self.outcomes.len()
    }
}

/// Owns a [`FingerprintIndex`] for one run and classifies candidates.
#[derive(Debug)]
pub struct Deduplicator {
    index: FingerprintIndex,
    max_hamming: u32,
}

impl Deduplicator {
    pub fn new(index: FingerprintIndex, max_hamming: u32) -> Self {
        Self { index, max_hamming }
    }

    pub fn index(&self) -> &FingerprintIndex {
        &self.index
    }

    /// Classify one item.
    ///
    /// Returns `Ok(None)` for an exact duplicate, `Ok(Some(record))` for an
    /// accepted item (already added to the index), and an
    /// [`NewsError::ItemProcessing`] for malformed input, which leaves the
    /// index untouched. An item already stored is an exact duplicate even
    /// when its `published_at` no longer parses.
    pub fn process(&mut self, item: CandidateItem) -> Result<Option<StoredRecord>, NewsError> {
        require_keys(&item)?;

        let hash = title_hash(&item.title);
        if self.index.is_exact_duplicate(&item.url_canonical, &hash) {
            debug!(url = %item.url, "Exact duplicate");
            return Ok(None);
        }
        validate_published_at(&item)?;

        let fingerprint = simhash64(&item.title);
        let duplicate_of = fingerprint
            .and_then(|fp| self.index.find_near_duplicate(fp, self.max_hamming))
            .map(str::to_string)
            .unwrap_or_default();

        self.index
            .accept(&item.url_canonical, &hash, fingerprint, &item.url);

        Ok(Some(StoredRecord::from_candidate(
            item,
            hash,
            fingerprint_to_field(fingerprint),
            duplicate_of,
        )))
    }

    /// Classify a batch in order. Failures are recorded and skipped.
    #[instrument(level = "info", skip_all)]
    pub fn ingest<I>(&mut self, items: I) -> BatchReport
    where
        I: IntoIterator<Item = CandidateItem>,
    {
        let mut report = BatchReport::default();
        for item in items {
            let url = item.url.clone();
            match self.process(item) {
                Ok(Some(record)) => {
                    let duplicate_of = record
                        .is_near_duplicate()
                        .then(|| record.duplicate_of.clone());
                    if let Some(ref of) = duplicate_of {
                        debug!(%url, duplicate_of = %of, "Near duplicate");
                    }
                    report.records.push(record);
                    report.outcomes.push(ItemOutcome::Inserted { url, duplicate_of });
                }
                Ok(None) => report.outcomes.push(ItemOutcome::ExactDuplicate { url }),
                Err(e) => {
                    warn!(%url, error = %e, "Skipping item");
                    report.outcomes.push(ItemOutcome::Failed(e));
                }
            }
        }

        info!(
            candidates = report.outcomes.len(),
            accepted = report.accepted(),
            near_duplicates = report.near_duplicates(),
            exact_duplicates = report.exact_duplicates(),
            failed = report.failures().count(),
            window = self.index.window_len(),
            "Ingested batch"
        );
        report
    }
}

fn require_keys(item: &CandidateItem) -> Result<(), NewsError> {
    if item.title.trim().is_empty() {
        return Err(NewsError::item(&item.url, "empty title"));
    }
    if item.url_canonical.trim().is_empty() {
        return Err(NewsError::item(&item.url, "empty canonical url"));
    }
    Ok(())
}

fn validate_published_at(item: &CandidateItem) -> Result<(), NewsError> {
    if !item.published_at.is_empty() && DateTime::parse_from_rfc3339(&item.published_at).is_err() {
        return Err(NewsError::item(
            &item.url,
            format!("malformed published_at {:?}", item.published_at),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(title: &str, url: &str) -> CandidateItem {
        CandidateItem {
            published_at: "2025-05-06T09:00:00+00:00".to_string(),
            source: "병원신문".to_string(),
            title: title.to_string(),
            url: url.to_string(),
            url_canonical: canonicalize_url(url),
            tags: vec!["의료/의료정책".to_string()],
        }
    }

    fn dedup() -> Deduplicator {
        Deduplicator::new(
            FingerprintIndex::new(DEFAULT_WINDOW_SIZE),
            DEFAULT_MAX_HAMMING,
        )
    }

    #[test]
    fn test_tracking_variant_is_exact_duplicate() {
        let mut d = dedup();
        let report = d.ingest(vec![
            candidate("A병원 파업", "http://x/1"),
            candidate("A병원 파업", "http://x/1?utm_source=rss"),
        ]);
        assert_eq!(report.accepted(), 1);
        assert_eq!(report.exact_duplicates(), 1);
        assert_eq!(report.records[0].url, "http://x/1");
        assert!(matches!(
            report.outcomes[1],
            ItemOutcome::ExactDuplicate { ref url } if url == "http://x/1?utm_source=rss"
        ));
    }

    #[test]
    fn test_same_title_different_url_is_exact_duplicate() {
        let mut d = dedup();
        let report = d.ingest(vec![
            candidate("전공의 파업 확산", "http://x/1"),
            candidate("  전공의   파업 확산 ", "http://y/2"),
        ]);
        assert_eq!(report.accepted(), 1);
        assert_eq!(report.exact_duplicates(), 1);
    }

    #[test]
    fn test_near_duplicate_is_annotated_not_dropped() {
        let mut d = dedup();
        let report = d.ingest(vec![
            candidate("전공의 파업 확산", "http://x/1"),
            candidate("전공의 파업 확산!", "http://y/2"),
        ]);
        assert_eq!(report.accepted(), 2);
        assert_eq!(report.near_duplicates(), 1);
        assert_eq!(report.records[0].duplicate_of, "");
        assert_eq!(report.records[1].duplicate_of, "http://x/1");
        assert_eq!(report.records[1].simhash, "11735309114748586214");
    }

    #[test]
    fn test_unrelated_titles_are_new() {
        let mut d = dedup();
        let report = d.ingest(vec![
            candidate("전공의 파업 확산", "http://x/1"),
            candidate("간호사 인력난 심화", "http://x/2"),
        ]);
        assert_eq!(report.near_duplicates(), 0);
    }

    #[test]
    fn test_untokenizable_title_has_no_fingerprint() {
        let mut d = dedup();
        let report = d.ingest(vec![
            candidate("!!!", "http://x/1"),
            candidate("???", "http://x/2"),
        ]);
        assert_eq!(report.accepted(), 2);
        assert!(report.records.iter().all(|r| r.simhash.is_empty()));
        assert!(report.records.iter().all(|r| r.duplicate_of.is_empty()));
        assert_eq!(d.index().window_len(), 0);
    }

    #[test]
    fn test_existing_url_is_suppressed() {
        let stored = StoredRecord::from_candidate(
            candidate("기존 기사 제목", "http://x/1"),
            title_hash("기존 기사 제목"),
            String::new(),
            String::new(),
        );
        let index = FingerprintIndex::from_rows(&[stored.to_row()], DEFAULT_WINDOW_SIZE);
        let mut d = Deduplicator::new(index, DEFAULT_MAX_HAMMING);

        let report = d.ingest(vec![candidate("완전히 다른 제목", "http://x/1#frag")]);
        assert_eq!(report.accepted(), 0);
        assert!(report.records.is_empty());
    }

    #[test]
    fn test_malformed_item_does_not_stop_batch() {
        let mut bad = candidate("병원 응급실 대란", "http://x/bad");
        bad.published_at = "yesterday".to_string();
        let mut no_url = candidate("보건소 예산 확대", "");
        no_url.url_canonical.clear();

        let mut d = dedup();
        let report = d.ingest(vec![bad, no_url, candidate("의대 정원 논의", "http://x/ok")]);

        assert_eq!(report.accepted(), 1);
        assert_eq!(report.failures().count(), 2);
        assert!(!report.all_failed());
        assert!(matches!(
            report.failures().next(),
            Some(NewsError::ItemProcessing { .. })
        ));
        // The failed item did not enter the index.
        assert!(!d.index().is_exact_duplicate("http://x/bad", "x"));
    }

    #[test]
    fn test_stored_item_with_bad_date_counts_as_duplicate() {
        let mut d = dedup();
        let first = d.ingest(vec![candidate("병원 응급실 대란", "http://x/1")]);
        assert_eq!(first.accepted(), 1);

        let mut refetched = candidate("병원 응급실 대란", "http://x/1");
        refetched.published_at = "어제".to_string();
        let report = d.ingest(vec![refetched]);
        assert_eq!(report.exact_duplicates(), 1);
        assert_eq!(report.failures().count(), 0);
    }

    #[test]
    fn test_all_failed_distinguished_from_empty() {
        let mut bad = candidate("병원 응급실 대란", "http://x/bad");
        bad.published_at = "not a date".to_string();

        assert!(!dedup().ingest(Vec::new()).all_failed());
        assert!(dedup().ingest(vec![bad]).all_failed());
    }

    #[test]
    fn test_evicted_fingerprint_no_longer_matches() {
        let window = 4;
        let mut d = Deduplicator::new(FingerprintIndex::new(window), 0);
        let titles: Vec<String> = (0..window + 5).map(|i| format!("기사{i} 제목{i}")).collect();
        let report = d.ingest(
            titles
                .iter()
                .enumerate()
                .map(|(i, t)| candidate(t, &format!("http://x/{i}"))),
        );
        assert_eq!(report.accepted(), window + 5);
        assert_eq!(d.index().window_len(), window);

        // Same tokens as the oldest item, different hash and URL.
        let report = d.ingest(vec![candidate("기사0 제목0!", "http://z/0")]);
        assert_eq!(report.accepted(), 1);
        assert_eq!(report.records[0].duplicate_of, "");

        // Same tokens as a retained item.
        let last = window + 4;
        let report = d.ingest(vec![candidate(&format!("기사{last} 제목{last}!"), "http://z/1")]);
        assert_eq!(report.records[0].duplicate_of, format!("http://x/{last}"));
    }
}
