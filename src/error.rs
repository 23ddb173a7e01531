//! Error type shared by every stage of the pipeline.
//!
//! Fatal errors (configuration, storage reads) abort a run. Per-item errors
//! ([`NewsError::ItemProcessing`]) are collected into batch reports and never
//! stop a batch.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, NewsError>;

#[derive(Debug, Error)]
pub enum NewsError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("storage read failed: {0}")]
    StorageRead(String),

    #[error("storage write failed: {0}")]
    StorageWrite(String),

    #[error("item {url:?} skipped: {reason}")]
    ItemProcessing { url: String, reason: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("feed parse error: {0}")]
    Feed(String),

    #[error("warehouse error: {0}")]
    Warehouse(String),

    #[error("analysis error: {0}")]
    Analysis(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl NewsError {
    pub fn item(url: impl Into<String>, reason: impl Into<String>) -> Self {
        NewsError::ItemProcessing {
            url: url.into(),
            reason: reason.into(),
        }
    }
}
