//! Candidate collection from feeds and government listing pages.
//!
//! # Sources
//!
//! | Kind | Module | Notes |
//! |------|--------|-------|
//! | RSS / Atom feeds | [`rss`] | Trade press, agencies, Google News searches |
//! | HTML listings (`HTML:<board>`) | [`gov`] | Ministry press-release boards |
//!
//! Every source yields [`CandidateItem`]s with a normalized title, a
//! canonical URL and at least one tag. A source that fails is logged and
//! skipped; the remaining sources still run.

use crate::config::{NewsConfig, RunSettings, SourceKind};
use crate::dedup::canonicalize_url;
use crate::models::CandidateItem;
use crate::tagging::Tagger;
use crate::utils::normalize_ws;
use tracing::{error, info, instrument, warn};

pub mod gov;
pub mod http;
pub mod rss;

pub use http::HttpFetcher;

/// Build a candidate, or `None` when the title or link is empty or the
/// title matches no tag.
pub fn build_candidate(
    source: &str,
    title: &str,
    link: &str,
    published_at: String,
    tagger: &Tagger,
) -> Option<CandidateItem> {
    let title = normalize_ws(title);
    let url = link.trim().to_string();
    let url_canonical = canonicalize_url(&url);
    if title.is_empty() || url_canonical.is_empty() {
        return None;
    }
    let tags = tagger.pick_tags(&title);
    if tags.is_empty() {
        return None;
    }
    Some(CandidateItem {
        published_at,
        source: source.to_string(),
        title,
        url,
        url_canonical,
        tags,
    })
}

/// Collect candidates from every configured source, in configuration order.
#[instrument(level = "info", skip_all)]
pub async fn collect_candidates(
    config: &NewsConfig,
    settings: &RunSettings,
    fetcher: &HttpFetcher,
    tagger: &Tagger,
) -> Vec<CandidateItem> {
    let mut out = Vec::new();
    for source in &config.sources {
        let result = match source.kind() {
            SourceKind::Html(key) => match gov::GovBoard::find(key) {
                Some(board) => {
                    gov::crawl_board(fetcher, board, &source.name, settings.gov_pages, tagger).await
                }
                None => {
                    warn!(source = %source.name, board = key, "Unknown HTML board; skipping");
                    continue;
                }
            },
            SourceKind::Feed(url) => {
                rss::collect_feed(fetcher, &source.name, url, config.http.max_feed_entries, tagger)
                    .await
            }
        };

        match result {
            Ok(items) => {
                info!(source = %source.name, count = items.len(), "Collected candidates");
                out.extend(items);
            }
            Err(e) => error!(source = %source.name, error = %e, "Source failed; skipping"),
        }
    }
    info!(count = out.len(), sources = config.sources.len(), "Collected all candidates");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagger() -> Tagger {
        Tagger::from_config(&NewsConfig::builtin().unwrap())
    }

    #[test]
    fn test_build_candidate_keeps_raw_url() {
        let item = build_candidate(
            "청년의사",
            " 전공의\n복귀 논의 ",
            " https://www.docdocdoc.co.kr/news/1?utm_source=rss#top ",
            String::new(),
            &tagger(),
        )
        .unwrap();
        assert_eq!(item.title, "전공의 복귀 논의");
        assert_eq!(item.url, "https://www.docdocdoc.co.kr/news/1?utm_source=rss#top");
        assert_eq!(item.url_canonical, "https://www.docdocdoc.co.kr/news/1");
    }

    #[test]
    fn test_build_candidate_rejects_untagged_or_empty() {
        let t = tagger();
        assert!(build_candidate("s", "주식시장 마감", "https://a/1", String::new(), &t).is_none());
        assert!(build_candidate("s", "  ", "https://a/1", String::new(), &t).is_none());
        assert!(build_candidate("s", "병원 파업", "", String::new(), &t).is_none());
    }
}
