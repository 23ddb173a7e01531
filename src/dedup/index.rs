//! Run-scoped dedup state: exact-match sets and the near-duplicate window.

use super::simhash::{fingerprint_from_field, hamming};
use crate::storage::cell;
use std::collections::{HashSet, VecDeque};

const COL_URL: usize = 3;
const COL_URL_CANONICAL: usize = 4;
const COL_TITLE_HASH: usize = 6;
const COL_SIMHASH: usize = 7;

/// Exact-match sets over every stored row plus a FIFO window of the most
/// recent fingerprints.
///
/// The sets are unbounded, so exact dedup covers the whole history. Only the
/// last `capacity` fingerprints take part in near-duplicate search.
#[derive(Debug, Clone, Default)]
pub struct FingerprintIndex {
    seen_urls: HashSet<String>,
    seen_title_hashes: HashSet<String>,
    recent: VecDeque<(u64, String)>,
    capacity: usize,
}

impl FingerprintIndex {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Build the index from NEWS rows in storage order (oldest first).
    ///
    /// Rows whose fingerprint cell is empty or not a decimal number are kept
    /// out of the window but still count for exact matching.
    pub fn from_rows(rows: &[Vec<String>], capacity: usize) -> Self {
        let mut index = Self::new(capacity);
        for row in rows {
            let url_canonical = cell(row, COL_URL_CANONICAL);
            if !url_canonical.is_empty() {
                index.seen_urls.insert(url_canonical.to_string());
            }
            let title_hash = cell(row, COL_TITLE_HASH);
            if !title_hash.is_empty() {
                index.seen_title_hashes.insert(title_hash.to_string());
            }
        }

        let tail = &rows[rows.len().saturating_sub(capacity)..];
        for row in tail {
            if let Some(fp) = fingerprint_from_field(cell(row, COL_SIMHASH)) {
                index.recent.push_back((fp, cell(row, COL_URL).to_string()));
            }
        }
        index
    }

    pub fn is_exact_duplicate(&self, url_canonical: &str, title_hash: &str) -> bool {
        self.seen_urls.contains(url_canonical) || self.seen_title_hashes.contains(title_hash)
    }

    /// URL of the first window entry, oldest first, within `max_hamming` bits.
    pub fn find_near_duplicate(&self, fingerprint: u64, max_hamming: u32) -> Option<&str> {
        self.recent
            .iter()
            .find(|(fp, _)| hamming(fingerprint, *fp) <= max_hamming)
            .map(|(_, url)| url.as_str())
    }

    /// Record an accepted item; evicts the oldest fingerprints past capacity.
    pub fn accept(
        &mut self,
        url_canonical: &str,
        title_hash: &str,
        fingerprint: Option<u64>,
        url: &str,
    ) {
        self.seen_urls.insert(url_canonical.to_string());
        self.seen_title_hashes.insert(title_hash.to_string());
        if let Some(fp) = fingerprint {
            self.recent.push_back((fp, url.to_string()));
            while self.recent.len() > self.capacity {
                self.recent.pop_front();
            }
        }
    }

    pub fn window_len(&self) -> usize {
        self.recent.len()
    }

    pub fn seen_url_count(&self) -> usize {
        self.seen_urls.len()
    }

    pub fn seen_title_hash_count(&self) -> usize {
        self.seen_title_hashes.len()
    }
}
