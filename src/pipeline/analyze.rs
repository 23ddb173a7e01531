//! Model analysis of enriched articles.
//!
//! Each pending article is sent to the model once (plus one re-ask when the
//! reply is cut off mid-JSON), decoded into an [`AnalysisResult`] and stored
//! as an [`AnalysisRow`]. One article failing never stops the others.

use crate::api::{AskAsync, article_prompt};
use crate::error::{NewsError, Result};
use crate::models::{AnalysisResult, AnalysisRow, PendingArticle};
use crate::utils::{looks_truncated, truncate_for_log};
use crate::warehouse::Warehouse;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::{error, info, instrument, warn};

/// Articles analyzed per run.
pub const DEFAULT_ANALYZE_LIMIT: usize = 5;

#[derive(Debug)]
pub enum ArticleOutcome {
    Inserted {
        title_hash: String,
        analysis_id: String,
    },
    Failed {
        title_hash: String,
        error: NewsError,
    },
}

#[derive(Debug, Default)]
pub struct AnalyzeReport {
    pub outcomes: Vec<ArticleOutcome>,
}

impl AnalyzeReport {
    pub fn inserted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ArticleOutcome::Inserted { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.inserted()
    }
}

/// `fmo-<UTC yyyymmddHHMMSS>-<first 8 chars of title_hash>`
pub fn analysis_id(observed_at: DateTime<Utc>, title_hash: &str) -> String {
    let short: String = title_hash.chars().take(8).collect();
    format!("fmo-{}-{}", observed_at.format("%Y%m%d%H%M%S"), short)
}

/// Drop a surrounding Markdown code fence, if the model added one.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

async fn ask_once<A>(asker: &A, prompt: &str) -> Result<String>
where
    A: AskAsync<Response = String>,
{
    asker
        .ask(prompt)
        .await
        .map_err(|e| NewsError::Analysis(format!("model call failed: {e}")))
}

/// Ask the model about one article and return its JSON reply.
#[instrument(level = "info", skip_all, fields(title_hash = %article.title_hash))]
pub async fn request_analysis<A>(asker: &A, article: &PendingArticle) -> Result<Value>
where
    A: AskAsync<Response = String>,
{
    let prompt = article_prompt(&article.article_text);
    let mut reply = ask_once(asker, &prompt).await?;
    let mut parsed = serde_json::from_str::<Value>(strip_code_fence(&reply));

    if let Err(ref e) = parsed {
        if looks_truncated(e) {
            warn!(error = %e, "EOF while parsing; re-asking once");
            reply = ask_once(asker, &prompt).await?;
            parsed = serde_json::from_str::<Value>(strip_code_fence(&reply));
        }
    }

    parsed.map_err(|e| {
        warn!(
            error = %e,
            response_preview = %truncate_for_log(&reply, 300),
            "Model returned non-conforming JSON"
        );
        NewsError::Analysis(format!("non-conforming JSON: {e}"))
    })
}

/// Build the result row for `article` from the model's JSON.
pub fn build_row(
    article: &PendingArticle,
    payload: Value,
    observed_at: DateTime<Utc>,
) -> Result<AnalysisRow> {
    if !payload.is_object() {
        return Err(NewsError::Analysis("model reply is not a JSON object".to_string()));
    }
    let result: AnalysisResult = serde_json::from_value(payload.clone())?;
    Ok(AnalysisRow {
        analysis_id: analysis_id(observed_at, &article.title_hash),
        title_hash: article.title_hash.clone(),
        published_at: article.published_at.clone(),
        observed_at: observed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        delta_score: result.delta_score(),
        phase: result.phase().to_string(),
        strategic_narrative: result.strategic_narrative().clone(),
        analysis_payload: payload,
    })
}

async fn analyze_article<W, A>(warehouse: &W, asker: &A, article: &PendingArticle) -> Result<String>
where
    W: Warehouse,
    A: AskAsync<Response = String>,
{
    let payload = request_analysis(asker, article).await?;
    let row = build_row(article, payload, Utc::now())?;
    let insert_errors = warehouse.insert_analysis(&row).await?;
    if !insert_errors.is_empty() {
        return Err(NewsError::Warehouse(format!(
            "insert rejected: {}",
            insert_errors.join("; ")
        )));
    }
    Ok(row.analysis_id)
}

/// Analyze up to `limit` pending articles, newest first.
#[instrument(level = "info", skip(warehouse, asker))]
pub async fn run_analyze<W, A>(warehouse: &W, asker: &A, limit: usize) -> Result<AnalyzeReport>
where
    W: Warehouse,
    A: AskAsync<Response = String>,
{
    let pending = warehouse.pending_analysis(limit).await?;
    info!(count = pending.len(), "Articles awaiting analysis");

    let mut report = AnalyzeReport::default();
    for article in &pending {
        match analyze_article(warehouse, asker, article).await {
            Ok(analysis_id) => {
                info!(%analysis_id, title = %article.title, "Stored analysis");
                report.outcomes.push(ArticleOutcome::Inserted {
                    title_hash: article.title_hash.clone(),
                    analysis_id,
                });
            }
            Err(e) => {
                error!(title = %article.title, error = %e, "Analysis failed; skipping article");
                report.outcomes.push(ArticleOutcome::Failed {
                    title_hash: article.title_hash.clone(),
                    error: e,
                });
            }
        }
    }

    info!(
        total = pending.len(),
        inserted = report.inserted(),
        failed = report.failed(),
        "Analysis finished"
    );
    Ok(report)
}
