//! Data models for scraped items, stored rows and analysis results.
//!
//! - [`CandidateItem`]: an article reference fresh from a feed or listing page
//! - [`StoredRecord`]: a persisted NEWS row with dedup annotations
//! - [`PendingArticle`]: a warehouse row with full text awaiting analysis
//! - [`AnalysisResult`] / [`AnalysisRow`]: decoded model output and the row
//!   inserted into the result table

use crate::storage::cell;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One freshly fetched article reference.
///
/// Built once per fetch cycle by the scrapers and consumed once by the
/// ingestion loop. Items without tags never get this far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateItem {
    /// RFC 3339 timestamp, or empty when the source gave none.
    pub published_at: String,
    /// Human-readable source label.
    pub source: String,
    /// Whitespace-normalized title.
    pub title: String,
    /// Link as published.
    pub url: String,
    /// Link with fragment and tracking parameters removed.
    pub url_canonical: String,
    /// Taxonomy labels in configured order.
    pub tags: Vec<String>,
}

/// A NEWS row.
///
/// `duplicate_of` is empty for new stories and holds the `url` of an earlier
/// record for near-duplicates. Records are append-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub published_at: String,
    pub source: String,
    pub title: String,
    pub url: String,
    pub url_canonical: String,
    pub tags: Vec<String>,
    pub title_hash: String,
    /// Decimal SimHash, or empty when the title had no tokens.
    pub simhash: String,
    pub duplicate_of: String,
}

impl StoredRecord {
    pub fn from_candidate(
        item: CandidateItem,
        title_hash: String,
        simhash: String,
        duplicate_of: String,
    ) -> Self {
        Self {
            published_at: item.published_at,
            source: item.source,
            title: item.title,
            url: item.url,
            url_canonical: item.url_canonical,
            tags: item.tags,
            title_hash,
            simhash,
            duplicate_of,
        }
    }

    /// Cells in NEWS column order.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.published_at.clone(),
            self.source.clone(),
            self.title.clone(),
            self.url.clone(),
            self.url_canonical.clone(),
            self.tags.join(","),
            self.title_hash.clone(),
            self.simhash.clone(),
            self.duplicate_of.clone(),
        ]
    }

    /// Parse a NEWS row; missing trailing cells read as empty.
    pub fn from_row(row: &[String]) -> Self {
        Self {
            published_at: cell(row, 0).to_string(),
            source: cell(row, 1).to_string(),
            title: cell(row, 2).to_string(),
            url: cell(row, 3).to_string(),
            url_canonical: cell(row, 4).to_string(),
            tags: split_tags(cell(row, 5)),
            title_hash: cell(row, 6).to_string(),
            simhash: cell(row, 7).to_string(),
            duplicate_of: cell(row, 8).to_string(),
        }
    }

    pub fn is_near_duplicate(&self) -> bool {
        !self.duplicate_of.is_empty()
    }
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// An article with extracted text and no analysis yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingArticle {
    pub article_text: String,
    pub title_hash: String,
    pub published_at: String,
    pub title: String,
}

/// Structured model output.
///
/// Every field is optional in the model's JSON; missing values decode to
/// their defaults instead of failing the article.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AnalysisResult {
    pub physics_engine: PhysicsEngine,
    pub fmo_output: FmoOutput,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PhysicsEngine {
    pub module_1_delta: DeltaModule,
    pub module_3_phase: PhaseModule,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DeltaModule {
    pub kl_divergence: f64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PhaseModule {
    pub current_phase: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct FmoOutput {
    pub module_5_narratives: Value,
}

impl AnalysisResult {
    pub fn delta_score(&self) -> f64 {
        self.physics_engine.module_1_delta.kl_divergence
    }

    pub fn phase(&self) -> &str {
        &self.physics_engine.module_3_phase.current_phase
    }

    pub fn strategic_narrative(&self) -> &Value {
        &self.fmo_output.module_5_narratives
    }
}

/// Row inserted into the analysis result table.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnalysisRow {
    pub analysis_id: String,
    pub title_hash: String,
    pub published_at: String,
    pub observed_at: String,
    pub delta_score: f64,
    pub phase: String,
    /// The complete model response.
    pub analysis_payload: Value,
    pub strategic_narrative: Value,
}
