//! JSON rendering of digest entries for downstream tools.

use super::digest::{DigestEntry, DigestFilter};
use crate::error::Result;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct DigestDocument<'a> {
    from: String,
    to: String,
    count: usize,
    entries: &'a [DigestEntry],
}

/// Pretty-printed `{from, to, count, entries}` document.
pub fn render_json(entries: &[DigestEntry], filter: &DigestFilter) -> Result<String> {
    let doc = DigestDocument {
        from: filter.from.to_string(),
        to: filter.to.to_string(),
        count: entries.len(),
        entries,
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outputs::digest::KST;
    use chrono::{NaiveDate, TimeZone};

    #[test]
    fn test_render_json_document() {
        let today = NaiveDate::from_ymd_opt(2025, 5, 6).unwrap();
        let filter = DigestFilter::last_days(today, 7);
        let entry = DigestEntry {
            at: KST.with_ymd_and_hms(2025, 5, 6, 9, 30, 0).unwrap(),
            published: "2025-05-06 09:30".to_string(),
            source: "병원신문".to_string(),
            title: "전공의 파업 확산".to_string(),
            link: "http://x/1".to_string(),
            tags: vec!["의료/의료정책".to_string()],
            duplicate_of: None,
        };

        let json = render_json(&[entry], &filter).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["from"], "2025-04-29");
        assert_eq!(value["count"], 1);
        assert_eq!(value["entries"][0]["published"], "2025-05-06 09:30");
        assert!(value["entries"][0].get("at").is_none());
        assert!(value["entries"][0].get("duplicate_of").is_none());
    }
}
