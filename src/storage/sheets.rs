//! Google Sheets v4 REST backend.
//!
//! Requests are authorized with a bearer access token supplied by the
//! environment (for example `gcloud auth print-access-token` in the scheduler).
//! Values are always written with `valueInputOption=RAW` so fingerprints and
//! hashes are stored verbatim instead of being coerced into numbers.

use super::{META_HEADERS, META_TAB, NEWS_HEADERS, NEWS_TAB, NewsStore, cell};
use crate::error::{NewsError, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

pub struct SheetsStore {
    client: Client,
    sheet_id: String,
    access_token: String,
}

impl std::fmt::Debug for SheetsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetsStore")
            .field("sheet_id", &self.sheet_id)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetInfo {
    #[serde(default)]
    sheets: Vec<SheetInfo>,
}

#[derive(Debug, Deserialize)]
struct SheetInfo {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

impl SheetsStore {
    /// Build a store for `sheet_id`; both values are required.
    pub fn new(sheet_id: &str, access_token: &str) -> Result<Self> {
        if sheet_id.trim().is_empty() {
            return Err(NewsError::Configuration("Missing GSHEET_ID".to_string()));
        }
        if access_token.trim().is_empty() {
            return Err(NewsError::Configuration(
                "Missing GOOGLE_ACCESS_TOKEN".to_string(),
            ));
        }
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            sheet_id: sheet_id.trim().to_string(),
            access_token: access_token.trim().to_string(),
        })
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/{}/values/{}",
            SHEETS_API,
            self.sheet_id,
            urlencoding::encode(range)
        )
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.bearer_auth(&self.access_token)
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let resp = self
            .authed(self.client.get(self.values_url(range)))
            .send()
            .await
            .map_err(|e| NewsError::StorageRead(e.to_string()))?;
        let resp = check(resp, range, NewsError::StorageRead).await?;
        let body: ValueRange = resp
            .json()
            .await
            .map_err(|e| NewsError::StorageRead(e.to_string()))?;
        debug!(range, rows = body.values.len(), "Read sheet values");
        Ok(body.values)
    }

    async fn append_values(&self, range: &str, rows: &[Vec<String>]) -> Result<()> {
        let url = format!(
            "{}:append?valueInputOption=RAW&insertDataOption=INSERT_ROWS",
            self.values_url(range)
        );
        let resp = self
            .authed(self.client.post(url))
            .json(&json!({ "majorDimension": "ROWS", "values": rows }))
            .send()
            .await
            .map_err(|e| NewsError::StorageWrite(e.to_string()))?;
        check(resp, range, NewsError::StorageWrite).await?;
        Ok(())
    }

    async fn tab_titles(&self) -> Result<Vec<String>> {
        let url = format!(
            "{}/{}?fields=sheets.properties.title",
            SHEETS_API, self.sheet_id
        );
        let resp = self
            .authed(self.client.get(url))
            .send()
            .await
            .map_err(|e| NewsError::StorageRead(e.to_string()))?;
        let resp = check(resp, "spreadsheet", NewsError::StorageRead).await?;
        let info: SpreadsheetInfo = resp
            .json()
            .await
            .map_err(|e| NewsError::StorageRead(e.to_string()))?;
        Ok(info.sheets.into_iter().map(|s| s.properties.title).collect())
    }

    async fn add_tab(&self, title: &str, rows: u32, cols: u32, header: &[&str]) -> Result<()> {
        let url = format!("{}/{}:batchUpdate", SHEETS_API, self.sheet_id);
        let body = json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": title,
                        "gridProperties": { "rowCount": rows, "columnCount": cols }
                    }
                }
            }]
        });
        let resp = self
            .authed(self.client.post(url))
            .json(&body)
            .send()
            .await
            .map_err(|e| NewsError::StorageWrite(e.to_string()))?;
        check(resp, title, NewsError::StorageWrite).await?;

        let header_row = vec![header.iter().map(|h| h.to_string()).collect::<Vec<_>>()];
        self.append_values(&format!("{title}!A1"), &header_row).await?;
        info!(tab = title, "Created sheet tab");
        Ok(())
    }
}

/// Turn a non-2xx response into `kind`, keeping the body for diagnostics.
async fn check(
    resp: Response,
    what: &str,
    kind: fn(String) -> NewsError,
) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    warn!(%status, what, "Sheets API request failed");
    Err(kind(format!("{what}: HTTP {status}: {body}")))
}

impl NewsStore for SheetsStore {
    #[instrument(level = "info", skip_all)]
    async fn ensure_tabs(&self) -> Result<()> {
        let titles = self.tab_titles().await?;
        if !titles.iter().any(|t| t == NEWS_TAB) {
            let cols = (NEWS_HEADERS.len() + 5).max(20) as u32;
            self.add_tab(NEWS_TAB, 2000, cols, &NEWS_HEADERS).await?;
        }
        if !titles.iter().any(|t| t == META_TAB) {
            self.add_tab(META_TAB, 200, 5, &META_HEADERS).await?;
        }
        Ok(())
    }

    #[instrument(level = "info", skip_all)]
    async fn read_rows(&self) -> Result<Vec<Vec<String>>> {
        let mut values = self.get_values(&format!("{NEWS_TAB}!A:I")).await?;
        if values.is_empty() {
            return Ok(values);
        }
        values.remove(0);
        Ok(values)
    }

    #[instrument(level = "info", skip_all, fields(count = rows.len()))]
    async fn append_rows(&self, rows: &[Vec<String>]) -> Result<()> {
        self.append_values(&format!("{NEWS_TAB}!A1"), rows).await
    }

    #[instrument(level = "debug", skip(self))]
    async fn meta_get(&self, key: &str) -> Result<String> {
        let rows = self.get_values(&format!("{META_TAB}!A:B")).await?;
        Ok(rows
            .iter()
            .skip(1)
            .find(|r| r.len() >= 2 && cell(r, 0) == key)
            .map(|r| cell(r, 1).to_string())
            .unwrap_or_default())
    }

    #[instrument(level = "debug", skip(self))]
    async fn meta_set(&self, key: &str, value: &str) -> Result<()> {
        let rows = self.get_values(&format!("{META_TAB}!A:B")).await?;
        let existing = rows
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, r)| cell(r, 0) == key)
            .map(|(i, _)| i + 1);

        match existing {
            Some(sheet_row) => {
                let range = format!("{META_TAB}!B{sheet_row}");
                let url = format!("{}?valueInputOption=RAW", self.values_url(&range));
                let resp = self
                    .authed(self.client.put(url))
                    .json(&json!({ "range": range, "majorDimension": "ROWS", "values": [[value]] }))
                    .send()
                    .await
                    .map_err(|e| NewsError::StorageWrite(e.to_string()))?;
                check(resp, &range, NewsError::StorageWrite).await?;
            }
            None => {
                let row = vec![vec![key.to_string(), value.to_string()]];
                self.append_values(&format!("{META_TAB}!A1"), &row).await?;
            }
        }
        Ok(())
    }
}
