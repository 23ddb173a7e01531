//! Data-warehouse access for enrichment and analysis.
//!
//! # Tables (in one dataset)
//!
//! | Table | Role |
//! |-------|------|
//! | `raw_stream_entry`   | External table over the NEWS sheet |
//! | `raw_stream_native`  | Native copy with an `article_text` column filled by `enrich` |
//! | `fmo_final_analysis` | One row per analyzed article, keyed by `title_hash` |
//!
//! [`BigQueryWarehouse`] talks to the BigQuery v2 REST API with a bearer
//! access token. Values that come from data (URLs, article text) are always
//! passed as named query parameters.

use crate::error::{NewsError, Result};
use crate::models::{AnalysisRow, PendingArticle};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

const BIGQUERY_API: &str = "https://bigquery.googleapis.com/bigquery/v2";
const QUERY_TIMEOUT_MS: u64 = 30_000;
const MAX_POLLS: usize = 20;

pub const ENTRY_TABLE: &str = "raw_stream_entry";
pub const NATIVE_TABLE: &str = "raw_stream_native";
pub const RESULT_TABLE: &str = "fmo_final_analysis";

/// Operations the enrichment and analysis stages need from the warehouse.
pub trait Warehouse {
    /// Copy entry-table rows whose `url` is not yet in the native table.
    /// Returns the number of rows inserted.
    async fn sync_entries(&self) -> Result<u64>;

    /// URLs of native rows without `article_text`, up to `limit`.
    async fn urls_missing_text(&self, limit: usize) -> Result<Vec<String>>;

    /// Set `article_text` on every native row with this `url`.
    async fn set_article_text(&self, url: &str, text: &str) -> Result<()>;

    /// Newest articles with text and no result row for their `title_hash`.
    async fn pending_analysis(&self, limit: usize) -> Result<Vec<PendingArticle>>;

    /// Insert one result row. Returns the per-row insert errors reported by
    /// the warehouse; an empty list means success.
    async fn insert_analysis(&self, row: &AnalysisRow) -> Result<Vec<String>>;
}

pub struct BigQueryWarehouse {
    client: Client,
    project: String,
    dataset: String,
    location: String,
    access_token: String,
}

impl std::fmt::Debug for BigQueryWarehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BigQueryWarehouse")
            .field("project", &self.project)
            .field("dataset", &self.dataset)
            .field("location", &self.location)
            .finish()
    }
}

/// A named STRING query parameter.
#[derive(Debug, Clone)]
pub struct QueryParam {
    pub name: &'static str,
    pub value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    #[serde(default)]
    rows: Vec<TableRow>,
    num_dml_affected_rows: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    v: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<Value>,
}

/// Result of a completed query: rows as optional strings, column order as selected.
#[derive(Debug, Default)]
pub struct QueryOutput {
    pub rows: Vec<Vec<Option<String>>>,
    pub affected_rows: u64,
}

impl QueryOutput {
    fn from_response(resp: QueryResponse) -> Self {
        let rows = resp
            .rows
            .into_iter()
            .map(|r| r.f.into_iter().map(|c| cell_string(c.v)).collect())
            .collect();
        let affected_rows = resp
            .num_dml_affected_rows
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        Self {
            rows,
            affected_rows,
        }
    }
}

fn cell_string(v: Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// BigQuery returns TIMESTAMP cells as epoch seconds (`"1.7145E9"`);
/// convert those to RFC 3339 and pass other strings through.
pub fn timestamp_cell(raw: &str) -> String {
    match raw.parse::<f64>() {
        Ok(secs) => {
            let micros = (secs * 1_000_000.0).round() as i64;
            DateTime::<Utc>::from_timestamp_micros(micros)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_else(|| raw.to_string())
        }
        Err(_) => raw.to_string(),
    }
}

impl BigQueryWarehouse {
    pub fn new(project: &str, dataset: &str, location: &str, access_token: &str) -> Result<Self> {
        if project.trim().is_empty() {
            return Err(NewsError::Configuration("Missing BQ_PROJECT_ID".to_string()));
        }
        if dataset.trim().is_empty() {
            return Err(NewsError::Configuration("Missing BQ_DATASET".to_string()));
        }
        if access_token.trim().is_empty() {
            return Err(NewsError::Configuration(
                "Missing GOOGLE_ACCESS_TOKEN".to_string(),
            ));
        }
        let client = Client::builder().timeout(Duration::from_secs(90)).build()?;
        Ok(Self {
            client,
            project: project.trim().to_string(),
            dataset: dataset.trim().to_string(),
            location: location.trim().to_string(),
            access_token: access_token.trim().to_string(),
        })
    }

    /// Fully qualified, backtick-quoted table name.
    pub fn table(&self, name: &str) -> String {
        format!("`{}.{}.{}`", self.project, self.dataset, name)
    }

    /// Run a standard-SQL query with named STRING parameters and wait for it.
    #[instrument(level = "debug", skip(self, params))]
    pub async fn query(&self, sql: &str, params: &[QueryParam]) -> Result<QueryOutput> {
        let url = format!("{}/projects/{}/queries", BIGQUERY_API, self.project);
        let query_parameters: Vec<Value> = params
            .iter()
            .map(|p| {
                json!({
                    "name": p.name,
                    "parameterType": { "type": "STRING" },
                    "parameterValue": { "value": p.value },
                })
            })
            .collect();
        let mut body = json!({
            "query": sql,
            "useLegacySql": false,
            "timeoutMs": QUERY_TIMEOUT_MS,
            "parameterMode": "NAMED",
            "queryParameters": query_parameters,
        });
        if !self.location.is_empty() {
            body["location"] = json!(self.location);
        }

        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        let mut parsed: QueryResponse = self.decode(resp).await?;

        let mut polls = 0;
        while !parsed.job_complete {
            polls += 1;
            if polls > MAX_POLLS {
                return Err(NewsError::Warehouse("query did not complete in time".to_string()));
            }
            let job = parsed
                .job_reference
                .as_ref()
                .ok_or_else(|| NewsError::Warehouse("incomplete query without job reference".to_string()))?;
            debug!(job_id = %job.job_id, polls, "Waiting for query job");
            sleep(Duration::from_millis(500)).await;
            parsed = self.poll(job).await?;
        }
        Ok(QueryOutput::from_response(parsed))
    }

    async fn poll(&self, job: &JobReference) -> Result<QueryResponse> {
        let mut url = format!(
            "{}/projects/{}/queries/{}?timeoutMs={}",
            BIGQUERY_API, self.project, job.job_id, QUERY_TIMEOUT_MS
        );
        if let Some(loc) = job.location.as_deref().filter(|l| !l.is_empty()) {
            url.push_str(&format!("&location={}", urlencoding::encode(loc)));
        }
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        self.decode(resp).await
    }

    async fn decode<T: for<'de> Deserialize<'de>>(&self, resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            warn!(%status, "BigQuery request failed");
            return Err(NewsError::Warehouse(format!("HTTP {status}: {text}")));
        }
        Ok(serde_json::from_str(&text)?)
    }
}

impl Warehouse for BigQueryWarehouse {
    #[instrument(level = "info", skip_all)]
    async fn sync_entries(&self) -> Result<u64> {
        let sql = format!(
            "INSERT INTO {native} \
             (published_at, source, title, url, url_canonical, tags, title_hash, simhash, duplicate_of) \
             SELECT published_at, source, title, url, url_canonical, tags, title_hash, simhash, duplicate_of \
             FROM {entry} \
             WHERE url NOT IN (SELECT url FROM {native})",
            native = self.table(NATIVE_TABLE),
            entry = self.table(ENTRY_TABLE),
        );
        let out = self.query(&sql, &[]).await?;
        info!(inserted = out.affected_rows, "Synced entry table");
        Ok(out.affected_rows)
    }

    #[instrument(level = "info", skip(self))]
    async fn urls_missing_text(&self, limit: usize) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT url FROM {} WHERE article_text IS NULL LIMIT {}",
            self.table(NATIVE_TABLE),
            limit
        );
        let out = self.query(&sql, &[]).await?;
        Ok(out
            .rows
            .into_iter()
            .filter_map(|r| r.into_iter().next().flatten())
            .collect())
    }

    #[instrument(level = "debug", skip(self, text), fields(bytes = text.len()))]
    async fn set_article_text(&self, url: &str, text: &str) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET article_text = @content WHERE url = @url",
            self.table(NATIVE_TABLE)
        );
        let params = [
            QueryParam {
                name: "content",
                value: text.to_string(),
            },
            QueryParam {
                name: "url",
                value: url.to_string(),
            },
        ];
        self.query(&sql, &params).await?;
        Ok(())
    }

    #[instrument(level = "info", skip(self))]
    async fn pending_analysis(&self, limit: usize) -> Result<Vec<PendingArticle>> {
        let sql = format!(
            "SELECT article_text, title_hash, published_at, title \
             FROM {raw} AS raw \
             WHERE NOT EXISTS ( \
                 SELECT 1 FROM {res} AS res WHERE res.title_hash = raw.title_hash \
             ) \
             AND article_text IS NOT NULL \
             ORDER BY published_at DESC LIMIT {limit}",
            raw = self.table(NATIVE_TABLE),
            res = self.table(RESULT_TABLE),
        );
        let out = self.query(&sql, &[]).await?;
        Ok(out
            .rows
            .into_iter()
            .map(|r| {
                let get = |i: usize| r.get(i).cloned().flatten().unwrap_or_default();
                PendingArticle {
                    article_text: get(0),
                    title_hash: get(1),
                    published_at: timestamp_cell(&get(2)),
                    title: get(3),
                }
            })
            .collect())
    }

    #[instrument(level = "info", skip_all, fields(analysis_id = %row.analysis_id))]
    async fn insert_analysis(&self, row: &AnalysisRow) -> Result<Vec<String>> {
        let url = format!(
            "{}/projects/{}/datasets/{}/tables/{}/insertAll",
            BIGQUERY_API, self.project, self.dataset, RESULT_TABLE
        );
        let body = json!({
            "rows": [{ "insertId": row.analysis_id, "json": row }],
        });
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        let parsed: InsertAllResponse = self.decode(resp).await?;
        Ok(parsed.insert_errors.iter().map(Value::to_string).collect())
    }
}
