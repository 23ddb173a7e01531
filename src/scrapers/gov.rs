//! Government press-release listing crawlers.
//!
//! Some ministries publish no usable feed, so their press-release boards are
//! read as HTML tables. Each row gives a link, a title and a date cell.
//!
//! | Key    | Board |
//! |--------|-------|
//! | `mohw` | Ministry of Health and Welfare press releases |
//! | `moel` | Ministry of Employment and Labor press releases |

use super::{CandidateItem, HttpFetcher, build_candidate};
use crate::error::{NewsError, Result};
use crate::tagging::Tagger;
use crate::utils::parse_listing_date;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument};
use url::Url;

/// Marker some boards append to fresh titles.
const NEW_POST_MARKER: &str = "새글";

#[derive(Debug, Clone, Copy)]
pub struct GovBoard {
    pub key: &'static str,
    list_url: &'static str,
    page_param: &'static str,
    anchor: &'static str,
    site_root: &'static str,
}

pub static BOARDS: [GovBoard; 2] = [
    GovBoard {
        key: "mohw",
        list_url: "https://www.mohw.go.kr/board.es?mid=a10503010100&bid=0027",
        page_param: "nPage",
        anchor: "a[href]",
        site_root: "https://www.mohw.go.kr/",
    },
    GovBoard {
        key: "moel",
        list_url: "https://www.moel.go.kr/news/enews/report/enewsList.do",
        page_param: "pageIndex",
        anchor: r#"a[href*="enewsView.do"]"#,
        site_root: "https://www.moel.go.kr/",
    },
];

impl GovBoard {
    pub fn find(key: &str) -> Option<&'static GovBoard> {
        BOARDS.iter().find(|b| b.key == key)
    }

    pub fn page_url(&self, page: u32) -> String {
        let sep = if self.list_url.contains('?') { '&' } else { '?' };
        format!("{}{}{}={}", self.list_url, sep, self.page_param, page)
    }

    /// Extract tagged candidates from one listing page.
    pub fn parse_listing(&self, html: &str, source: &str, tagger: &Tagger) -> Result<Vec<CandidateItem>> {
        let root = Url::parse(self.site_root)
            .map_err(|e| NewsError::Configuration(format!("bad site root {}: {e}", self.site_root)))?;
        let document = Html::parse_document(html);
        let row_sel = selector("table tbody tr")?;
        let anchor_sel = selector(self.anchor)?;
        let cell_sel = selector("td")?;

        let mut out = Vec::new();
        for row in document.select(&row_sel) {
            let Some(anchor) = row.select(&anchor_sel).next() else {
                continue;
            };
            let href = anchor.value().attr("href").unwrap_or("").trim();
            let Ok(link) = root.join(href) else {
                debug!(href, "Unresolvable listing link");
                continue;
            };
            let title = anchor
                .text()
                .collect::<Vec<_>>()
                .join(" ")
                .replace(NEW_POST_MARKER, "");
            let published_at = row
                .select(&cell_sel)
                .map(|td| parse_listing_date(&td.text().collect::<Vec<_>>().join(" ")))
                .find(|d| !d.is_empty())
                .unwrap_or_default();

            if let Some(item) = build_candidate(source, &title, link.as_str(), published_at, tagger) {
                out.push(item);
            }
        }
        Ok(out)
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| NewsError::Configuration(format!("bad selector {css}: {e}")))
}

/// Crawl `pages` listing pages of a board.
#[instrument(level = "info", skip(fetcher, tagger, board), fields(board = board.key))]
pub async fn crawl_board(
    fetcher: &HttpFetcher,
    board: &GovBoard,
    source: &str,
    pages: u32,
    tagger: &Tagger,
) -> Result<Vec<CandidateItem>> {
    let mut out = Vec::new();
    for page in 1..=pages.max(1) {
        let html = fetcher.get_text(&board.page_url(page)).await?;
        let items = board.parse_listing(&html, source, tagger)?;
        debug!(page, count = items.len(), "Parsed listing page");
        out.extend(items);
    }
    info!(count = out.len(), "Crawled government board");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NewsConfig;

    const MOHW_PAGE: &str = r#"<html><body>
<table><thead><tr><th>번호</th><th>제목</th><th>등록일</th></tr></thead>
<tbody>
  <tr><td>101</td>
      <td><a href="/board.es?mid=a10503010100&amp;bid=0027&amp;list_no=1">필수의료 지원 대책 발표 <span>새글</span></a></td>
      <td>2025.05.06</td></tr>
  <tr><td>100</td>
      <td><a href="/board.es?mid=a10503010100&amp;bid=0027&amp;list_no=2">국민연금 기금운용 결과</a></td>
      <td>2025.05.05</td></tr>
  <tr><td colspan="3">공지 없음</td></tr>
</tbody></table></body></html>"#;

    const MOEL_PAGE: &str = r#"<table><tbody>
  <tr><td><a href="/news/etc.do">첨부</a>
          <a href="/news/enews/report/enewsView.do?news_seq=9">중대재해처벌법 감독 결과</a></td>
      <td>2025-05-02</td></tr>
</tbody></table>"#;

    fn tagger() -> Tagger {
        Tagger::from_config(&NewsConfig::builtin().unwrap())
    }

    #[test]
    fn test_page_urls() {
        let mohw = GovBoard::find("mohw").unwrap();
        let moel = GovBoard::find("moel").unwrap();
        assert_eq!(
            mohw.page_url(2),
            "https://www.mohw.go.kr/board.es?mid=a10503010100&bid=0027&nPage=2"
        );
        assert_eq!(
            moel.page_url(1),
            "https://www.moel.go.kr/news/enews/report/enewsList.do?pageIndex=1"
        );
        assert!(GovBoard::find("nope").is_none());
    }

    #[test]
    fn test_parse_mohw_listing() {
        let board = GovBoard::find("mohw").unwrap();
        let items = board
            .parse_listing(MOHW_PAGE, "보건복지부-보도자료", &tagger())
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "필수의료 지원 대책 발표");
        assert_eq!(
            items[0].url,
            "https://www.mohw.go.kr/board.es?mid=a10503010100&bid=0027&list_no=1"
        );
        assert_eq!(items[0].published_at, "2025-05-06T00:00:00+00:00");
    }

    #[test]
    fn test_parse_moel_listing_uses_view_anchor() {
        let board = GovBoard::find("moel").unwrap();
        let items = board
            .parse_listing(MOEL_PAGE, "고용노동부-보도자료", &tagger())
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(
            items[0].url,
            "https://www.moel.go.kr/news/enews/report/enewsView.do?news_seq=9"
        );
        assert_eq!(items[0].published_at, "2025-05-02T00:00:00+00:00");
    }
}
