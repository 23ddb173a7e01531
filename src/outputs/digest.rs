//! Read-only digest of stored news.
//!
//! Rows are shown in Korea Standard Time, newest first, filtered by date
//! range, tag and keyword. Rows whose `published_at` does not parse are left
//! out.

use crate::models::StoredRecord;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::fmt::Write;

/// UTC+9.
pub static KST: Lazy<FixedOffset> =
    Lazy::new(|| FixedOffset::east_opt(9 * 3600).expect("valid KST offset"));

/// Default range length in days.
pub const DEFAULT_DIGEST_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestFilter {
    /// First KST date included.
    pub from: NaiveDate,
    /// Last KST date included.
    pub to: NaiveDate,
    /// Substring of the tags column.
    pub tag: Option<String>,
    /// Case-insensitive substring of title, source or tags.
    pub keyword: Option<String>,
    pub hide_near_duplicates: bool,
}

impl DigestFilter {
    /// `days` days back from `today` through `today`.
    pub fn last_days(today: NaiveDate, days: i64) -> Self {
        Self {
            from: today - Duration::days(days.max(0)),
            to: today,
            tag: None,
            keyword: None,
            hide_near_duplicates: false,
        }
    }

    fn matches(&self, at: &DateTime<FixedOffset>, record: &StoredRecord) -> bool {
        let day = at.date_naive();
        if day < self.from || day > self.to {
            return false;
        }
        if self.hide_near_duplicates && record.is_near_duplicate() {
            return false;
        }
        let tags = record.tags.join(",");
        if let Some(tag) = self.tag.as_deref().filter(|t| !t.is_empty()) {
            if !tags.contains(tag) {
                return false;
            }
        }
        if let Some(keyword) = self.keyword.as_deref().filter(|k| !k.is_empty()) {
            let keyword = keyword.to_lowercase();
            let hit = [record.title.as_str(), record.source.as_str(), tags.as_str()]
                .iter()
                .any(|field| field.to_lowercase().contains(&keyword));
            if !hit {
                return false;
            }
        }
        true
    }
}

/// One digest line.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DigestEntry {
    #[serde(skip)]
    pub at: DateTime<FixedOffset>,
    /// `YYYY-MM-DD HH:MM` in KST.
    pub published: String,
    pub source: String,
    pub title: String,
    pub link: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,
}

/// Filter and sort records for display.
pub fn select_entries(records: Vec<StoredRecord>, filter: &DigestFilter) -> Vec<DigestEntry> {
    let mut entries: Vec<DigestEntry> = records
        .into_iter()
        .filter_map(|record| {
            let at = DateTime::parse_from_rfc3339(record.published_at.trim())
                .ok()?
                .with_timezone(&*KST);
            if !filter.matches(&at, &record) {
                return None;
            }
            let link = if record.url_canonical.is_empty() {
                record.url.clone()
            } else {
                record.url_canonical.clone()
            };
            Some(DigestEntry {
                at,
                published: at.format("%Y-%m-%d %H:%M").to_string(),
                duplicate_of: Some(record.duplicate_of.clone()).filter(|d| !d.is_empty()),
                source: record.source,
                title: record.title,
                link,
                tags: record.tags,
            })
        })
        .collect();
    entries.sort_by(|a, b| b.at.cmp(&a.at));
    entries
}

fn escape_cell(s: &str) -> String {
    s.replace(['\n', '\r'], " ")
        .replace('|', "\\|")
        .replace('[', "\\[")
        .replace(']', "\\]")
}

/// Markdown table `발행 | 출처 | 제목` with linked titles.
pub fn render_markdown(entries: &[DigestEntry], filter: &DigestFilter) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# 뉴스 다이제스트 ({} ~ {})\n", filter.from, filter.to);
    if entries.is_empty() {
        let _ = writeln!(md, "조건에 맞는 기사가 없습니다.");
        return md;
    }
    let _ = writeln!(md, "총 {}건\n", entries.len());
    let _ = writeln!(md, "| 발행 | 출처 | 제목 |");
    let _ = writeln!(md, "|---|---|---|");
    for e in entries {
        let _ = writeln!(
            md,
            "| {} | {} | [{}]({}) |",
            e.published,
            escape_cell(&e.source),
            escape_cell(&e.title),
            e.link.replace(' ', "%20").replace(')', "%29")
        );
    }
    md
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(published_at: &str, title: &str, tags: &[&str], duplicate_of: &str) -> StoredRecord {
        StoredRecord {
            published_at: published_at.to_string(),
            source: "병원신문".to_string(),
            title: title.to_string(),
            url: format!("http://x/{title}?utm_source=rss"),
            url_canonical: format!("http://x/{title}"),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            title_hash: String::new(),
            simhash: String::new(),
            duplicate_of: duplicate_of.to_string(),
        }
    }

    fn may(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, day).unwrap()
    }

    fn sample() -> Vec<StoredRecord> {
        vec![
            record("2025-05-05T16:30:00+00:00", "전공의", &["의료/의료정책"], ""),
            record("2025-05-01T00:00:00+00:00", "산재", &["노동/산재/고용"], ""),
            record("2025-05-06T01:00:00+00:00", "전공의2", &["의료/의료정책"], "http://x/전공의"),
            record("not a date", "깨진날짜", &["의료/의료정책"], ""),
            record("2025-04-01T00:00:00+00:00", "오래된", &["의료/의료정책"], ""),
        ]
    }

    #[test]
    fn test_kst_conversion_and_sort() {
        let filter = DigestFilter::last_days(may(6), DEFAULT_DIGEST_DAYS);
        let entries = select_entries(sample(), &filter);

        let titles: Vec<&str> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["전공의2", "전공의", "산재"]);
        // 16:30 UTC on the 5th is 01:30 KST on the 6th.
        assert_eq!(entries[1].published, "2025-05-06 01:30");
        assert_eq!(entries[1].link, "http://x/전공의");
    }

    #[test]
    fn test_range_is_inclusive_in_kst() {
        let filter = DigestFilter {
            from: may(6),
            to: may(6),
            ..DigestFilter::last_days(may(6), 0)
        };
        let entries = select_entries(sample(), &filter);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_tag_keyword_and_duplicate_filters() {
        let mut filter = DigestFilter::last_days(may(6), DEFAULT_DIGEST_DAYS);
        filter.tag = Some("노동".to_string());
        assert_eq!(select_entries(sample(), &filter).len(), 1);

        let mut filter = DigestFilter::last_days(may(6), DEFAULT_DIGEST_DAYS);
        filter.keyword = Some("병원신문".to_string());
        assert_eq!(select_entries(sample(), &filter).len(), 3);
        filter.keyword = Some("의료정책".to_string());
        assert_eq!(select_entries(sample(), &filter).len(), 2);

        filter.hide_near_duplicates = true;
        let entries = select_entries(sample(), &filter);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "전공의");
    }

    #[test]
    fn test_keyword_is_case_insensitive() {
        let mut records = sample();
        records[0].title = "KDCA 발표".to_string();
        let mut filter = DigestFilter::last_days(may(6), DEFAULT_DIGEST_DAYS);
        filter.keyword = Some("kdca".to_string());
        assert_eq!(select_entries(records, &filter).len(), 1);
    }

    #[test]
    fn test_render_markdown_table() {
        let filter = DigestFilter::last_days(may(6), DEFAULT_DIGEST_DAYS);
        let mut records = sample();
        records[1].title = "노동부 | 발표 [속보]".to_string();
        let md = render_markdown(&select_entries(records, &filter), &filter);

        assert!(md.starts_with("# 뉴스 다이제스트 (2025-04-29 ~ 2025-05-06)"));
        assert!(md.contains("| 발행 | 출처 | 제목 |"));
        assert!(md.contains("| 2025-05-06 01:30 | 병원신문 | [전공의](http://x/전공의) |"));
        assert!(md.contains("노동부 \\| 발표 \\[속보\\]"));
    }

    #[test]
    fn test_render_empty() {
        let filter = DigestFilter::last_days(may(6), DEFAULT_DIGEST_DAYS);
        let md = render_markdown(&[], &filter);
        assert!(md.contains("조건에 맞는 기사가 없습니다."));
        assert!(!md.contains("| 발행"));
    }
}
