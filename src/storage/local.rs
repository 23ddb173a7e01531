//! File-backed store for offline runs.
//!
//! Layout of the store directory:
//!
//! ```text
//! store_dir/
//! ├── news.jsonl   # header line, then one JSON array of cells per row
//! └── meta.json    # [["key", "value"], ...]
//! ```

use super::{META_HEADERS, NEWS_HEADERS, NewsStore};
use crate::error::{NewsError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn news_path(&self) -> PathBuf {
        self.dir.join("news.jsonl")
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join("meta.json")
    }

    async fn read_meta(&self) -> Result<Vec<Vec<String>>> {
        let text = fs::read_to_string(self.meta_path())
            .await
            .map_err(|e| NewsError::StorageRead(format!("meta.json: {e}")))?;
        serde_json::from_str(&text).map_err(|e| NewsError::StorageRead(format!("meta.json: {e}")))
    }

    async fn write_meta(&self, rows: &[Vec<String>]) -> Result<()> {
        let text = serde_json::to_string_pretty(rows)?;
        fs::write(self.meta_path(), text)
            .await
            .map_err(|e| NewsError::StorageWrite(format!("meta.json: {e}")))
    }
}

fn header(cols: &[&str]) -> Vec<String> {
    cols.iter().map(|c| c.to_string()).collect()
}

impl NewsStore for LocalStore {
    #[instrument(level = "info", skip_all, fields(dir = %self.dir.display()))]
    async fn ensure_tabs(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| NewsError::StorageWrite(e.to_string()))?;
        if !self.news_path().exists() {
            let line = serde_json::to_string(&header(&NEWS_HEADERS))?;
            fs::write(self.news_path(), format!("{line}\n"))
                .await
                .map_err(|e| NewsError::StorageWrite(e.to_string()))?;
            info!(path = %self.news_path().display(), "Created NEWS file");
        }
        if !self.meta_path().exists() {
            self.write_meta(&[header(&META_HEADERS)]).await?;
            info!(path = %self.meta_path().display(), "Created META file");
        }
        Ok(())
    }

    async fn read_rows(&self) -> Result<Vec<Vec<String>>> {
        let text = fs::read_to_string(self.news_path())
            .await
            .map_err(|e| NewsError::StorageRead(format!("news.jsonl: {e}")))?;
        let mut rows = Vec::new();
        for (lineno, line) in text.lines().enumerate().skip(1) {
            if line.trim().is_empty() {
                continue;
            }
            let row: Vec<String> = serde_json::from_str(line).map_err(|e| {
                NewsError::StorageRead(format!("news.jsonl line {}: {e}", lineno + 1))
            })?;
            rows.push(row);
        }
        debug!(rows = rows.len(), "Read NEWS rows");
        Ok(rows)
    }

    async fn append_rows(&self, rows: &[Vec<String>]) -> Result<()> {
        let mut buf = String::new();
        for row in rows {
            buf.push_str(&serde_json::to_string(row)?);
            buf.push('\n');
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.news_path())
            .await
            .map_err(|e| NewsError::StorageWrite(e.to_string()))?;
        file.write_all(buf.as_bytes())
            .await
            .map_err(|e| NewsError::StorageWrite(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| NewsError::StorageWrite(e.to_string()))?;
        Ok(())
    }

    async fn meta_get(&self, key: &str) -> Result<String> {
        let rows = self.read_meta().await?;
        Ok(rows
            .iter()
            .skip(1)
            .find(|r| r.len() >= 2 && r[0] == key)
            .map(|r| r[1].clone())
            .unwrap_or_default())
    }

    async fn meta_set(&self, key: &str, value: &str) -> Result<()> {
        let mut rows = self.read_meta().await?;
        match rows.iter_mut().skip(1).find(|r| r.first().is_some_and(|k| k == key)) {
            Some(row) => {
                row.resize(2, String::new());
                row[1] = value.to_string();
            }
            None => rows.push(vec![key.to_string(), value.to_string()]),
        }
        self.write_meta(&rows).await
    }
}
