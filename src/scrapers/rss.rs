//! RSS 2.0 / RDF / Atom feed parsing.
//!
//! Only the fields the pipeline needs are read: title, link and a
//! publication timestamp. Elements nested deeper than the direct children of
//! an `<item>`/`<entry>` are ignored so `media:title` and friends never leak
//! into titles.

use super::{CandidateItem, build_candidate};
use crate::error::{NewsError, Result};
use crate::tagging::Tagger;
use crate::utils::parse_feed_date;
use quick_xml::Reader;
use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, instrument};

/// One `<item>` or `<entry>` as read from the feed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub published: String,
    pub updated: String,
}

impl FeedEntry {
    /// Publication timestamp as RFC 3339, preferring the published date.
    pub fn published_at(&self) -> String {
        let published = parse_feed_date(&self.published);
        if published.is_empty() {
            parse_feed_date(&self.updated)
        } else {
            published
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Published,
    Updated,
}

fn field_for(local_name: &[u8]) -> Option<Field> {
    match local_name {
        b"title" => Some(Field::Title),
        b"link" => Some(Field::Link),
        b"pubDate" | b"published" | b"date" | b"issued" => Some(Field::Published),
        b"updated" | b"modified" => Some(Field::Updated),
        _ => None,
    }
}

fn is_entry(local_name: &[u8]) -> bool {
    matches!(local_name, b"item" | b"entry")
}

/// Atom `<link href=".." rel="alternate"/>`; links with another `rel` are skipped.
fn atom_href(e: &BytesStart<'_>) -> Option<String> {
    let mut href = None;
    let mut rel_ok = true;
    for attr in e.attributes().flatten() {
        let value = String::from_utf8_lossy(&attr.value).into_owned();
        match attr.key.local_name().as_ref() {
            b"href" => href = Some(value),
            b"rel" => rel_ok = value == "alternate",
            _ => {}
        }
    }
    if rel_ok { href } else { None }
}

fn resolve_entity(name: &str) -> Option<String> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    resolve_predefined_entity(name).map(str::to_string)
}

fn push_text(entry: &mut FeedEntry, field: Field, text: &str) {
    let target = match field {
        Field::Title => &mut entry.title,
        Field::Link => &mut entry.link,
        Field::Published => &mut entry.published,
        Field::Updated => &mut entry.updated,
    };
    target.push_str(text);
}

/// Parse up to `max_entries` entries from a feed document.
pub fn parse_feed(xml: &str, max_entries: usize) -> Result<Vec<FeedEntry>> {
    if max_entries == 0 {
        return Ok(Vec::new());
    }
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut entries = Vec::new();
    let mut current: Option<FeedEntry> = None;
    let mut entry_depth = 0usize;
    let mut depth = 0usize;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                let name = e.local_name();
                if current.is_none() && is_entry(name.as_ref()) {
                    current = Some(FeedEntry::default());
                    entry_depth = depth;
                } else if let Some(entry) = current.as_mut() {
                    if depth == entry_depth + 1 {
                        field = field_for(name.as_ref());
                        if field == Some(Field::Link) && entry.link.is_empty() {
                            if let Some(href) = atom_href(&e) {
                                entry.link = href;
                                field = None;
                            }
                        }
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(entry) = current.as_mut() {
                    if depth == entry_depth
                        && e.local_name().as_ref() == b"link"
                        && entry.link.is_empty()
                    {
                        if let Some(href) = atom_href(&e) {
                            entry.link = href;
                        }
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(entry), Some(f)) = (current.as_mut(), field) {
                    let raw = String::from_utf8_lossy(&t).into_owned();
                    let text = unescape(&raw).map(|c| c.into_owned()).unwrap_or(raw);
                    push_text(entry, f, &text);
                }
            }
            Ok(Event::CData(t)) => {
                if let (Some(entry), Some(f)) = (current.as_mut(), field) {
                    push_text(entry, f, &String::from_utf8_lossy(&t));
                }
            }
            Ok(Event::GeneralRef(r)) => {
                if let (Some(entry), Some(f)) = (current.as_mut(), field) {
                    let name = String::from_utf8_lossy(&r).into_owned();
                    let text = resolve_entity(&name).unwrap_or_else(|| format!("&{name};"));
                    push_text(entry, f, &text);
                }
            }
            Ok(Event::End(e)) => {
                if current.is_some() && depth == entry_depth && is_entry(e.local_name().as_ref()) {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                    if entries.len() >= max_entries {
                        break;
                    }
                } else if depth == entry_depth + 1 {
                    field = None;
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(NewsError::Feed(format!(
                    "at byte {}: {e}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
    }

    debug!(entries = entries.len(), "Parsed feed");
    Ok(entries)
}

/// Turn parsed entries into tagged candidates for `source`.
pub fn entries_to_candidates(
    source: &str,
    entries: Vec<FeedEntry>,
    tagger: &Tagger,
) -> Vec<CandidateItem> {
    entries
        .into_iter()
        .filter_map(|e| {
            let published_at = e.published_at();
            build_candidate(source, &e.title, &e.link, published_at, tagger)
        })
        .collect()
}

/// Fetch a feed and return its tagged candidates.
#[instrument(level = "info", skip(fetcher, tagger))]
pub async fn collect_feed(
    fetcher: &super::HttpFetcher,
    source: &str,
    feed_url: &str,
    max_entries: usize,
    tagger: &Tagger,
) -> Result<Vec<CandidateItem>> {
    let body = fetcher.get_text(feed_url).await?;
    let entries = parse_feed(&body, max_entries)?;
    Ok(entries_to_candidates(source, entries, tagger))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NewsConfig;

    const SAMPLE_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>병원신문 전체기사</title>
    <link>https://www.khanews.com</link>
    <item>
      <title><![CDATA[전공의   파업 확산]]></title>
      <link>https://www.khanews.com/news/articleView.html?idxno=1&amp;utm_source=rss</link>
      <pubDate>Tue, 06 May 2025 09:30:00 +0900</pubDate>
      <media:content url="https://img/1.jpg"><media:title>사진</media:title></media:content>
    </item>
    <item>
      <title>간호사 &amp; 의료기사 처우 개선</title>
      <link>https://www.khanews.com/news/articleView.html?idxno=2</link>
    </item>
    <item>
      <title>프로야구 개막전</title>
      <link>https://www.khanews.com/news/articleView.html?idxno=3</link>
    </item>
  </channel>
</rss>"#;

    const SAMPLE_ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Press</title>
  <entry>
    <title>고용노동부 중대재해 감독 강화</title>
    <link rel="self" href="https://example.kr/self/1"/>
    <link rel="alternate" href="https://example.kr/news/1"/>
    <updated>2025-05-06T00:00:00Z</updated>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_rss_items() {
        let entries = parse_feed(SAMPLE_RSS, 50).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].title, "전공의   파업 확산");
        assert_eq!(
            entries[0].link,
            "https://www.khanews.com/news/articleView.html?idxno=1&utm_source=rss"
        );
        assert_eq!(entries[0].published_at(), "2025-05-06T09:30:00+09:00");
        assert_eq!(entries[1].title, "간호사 & 의료기사 처우 개선");
        assert_eq!(entries[1].published_at(), "");
    }

    #[test]
    fn test_parse_respects_entry_limit() {
        assert_eq!(parse_feed(SAMPLE_RSS, 2).unwrap().len(), 2);
        assert!(parse_feed(SAMPLE_RSS, 0).unwrap().is_empty());
    }

    #[test]
    fn test_parse_atom_entry() {
        let entries = parse_feed(SAMPLE_ATOM, 50).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].link, "https://example.kr/news/1");
        assert_eq!(entries[0].published_at(), "2025-05-06T00:00:00+00:00");
    }

    #[test]
    fn test_malformed_feed_is_error() {
        let err = parse_feed("<rss><channel><item><title>x</item></rss>", 50).unwrap_err();
        assert!(matches!(err, NewsError::Feed(_)));
    }

    #[test]
    fn test_entries_to_candidates_filters_and_canonicalizes() {
        let tagger = Tagger::from_config(&NewsConfig::builtin().unwrap());
        let entries = parse_feed(SAMPLE_RSS, 50).unwrap();
        let items = entries_to_candidates("병원신문", entries, &tagger);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "전공의 파업 확산");
        assert_eq!(
            items[0].url_canonical,
            "https://www.khanews.com/news/articleView.html?idxno=1"
        );
        assert_eq!(items[0].source, "병원신문");
        assert!(items[0].tags.contains(&"노동/산재/고용".to_string()));
    }

    #[test]
    fn test_numeric_entities() {
        assert_eq!(resolve_entity("#8230").as_deref(), Some("…"));
        assert_eq!(resolve_entity("#x41").as_deref(), Some("A"));
        assert_eq!(resolve_entity("lt").as_deref(), Some("<"));
        assert_eq!(resolve_entity("nbsp"), None);
    }
}
