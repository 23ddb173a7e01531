//! In-memory store used by tests.

use super::NewsStore;
use crate::error::{NewsError, Result};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryStore {
    pub rows: Mutex<Vec<Vec<String>>>,
    pub meta: Mutex<Vec<(String, String)>>,
    pub append_calls: Mutex<usize>,
    pub fail_reads: bool,
    /// Number of upcoming appends that fail without writing anything.
    pub failing_appends: Mutex<usize>,
}

impl MemoryStore {
    pub fn with_rows(rows: Vec<Vec<String>>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Default::default()
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

impl NewsStore for MemoryStore {
    async fn ensure_tabs(&self) -> Result<()> {
        Ok(())
    }

    async fn read_rows(&self) -> Result<Vec<Vec<String>>> {
        if self.fail_reads {
            return Err(NewsError::StorageRead("simulated outage".to_string()));
        }
        Ok(self.rows.lock().unwrap().clone())
    }

    async fn append_rows(&self, rows: &[Vec<String>]) -> Result<()> {
        *self.append_calls.lock().unwrap() += 1;
        let mut failing = self.failing_appends.lock().unwrap();
        if *failing > 0 {
            *failing -= 1;
            return Err(NewsError::StorageWrite("simulated append failure".to_string()));
        }
        drop(failing);
        self.rows.lock().unwrap().extend_from_slice(rows);
        Ok(())
    }

    async fn meta_get(&self, key: &str) -> Result<String> {
        Ok(self
            .meta
            .lock()
            .unwrap()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .unwrap_or_default())
    }

    async fn meta_set(&self, key: &str, value: &str) -> Result<()> {
        let mut meta = self.meta.lock().unwrap();
        match meta.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => meta.push((key.to_string(), value.to_string())),
        }
        Ok(())
    }
}
