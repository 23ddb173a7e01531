//! HTTP GET with a fixed User-Agent, timeout and linear backoff.

use crate::config::HttpSettings;
use crate::error::{NewsError, Result};
use encoding_rs::{Encoding, UTF_8};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

/// Shared client for feed, listing and article fetches.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    retries: u32,
    backoff: Duration,
}

impl HttpFetcher {
    pub fn new(settings: &HttpSettings, timeout_sec: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(Duration::from_secs(timeout_sec.max(1)))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self {
            client,
            retries: settings.retries,
            backoff: Duration::from_secs_f64(settings.backoff_sec.max(0.0)),
        })
    }

    /// GET `url`, retrying up to `retries` extra times.
    ///
    /// Attempt `n` (0-based) that fails sleeps `backoff * (n + 1)` before the
    /// next one. Non-2xx responses count as failures.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_body(&self, url: &str) -> Result<Body> {
        let t0 = Instant::now();
        let mut attempt = 0u32;
        loop {
            match self.try_get(url).await {
                Ok(body) => {
                    debug!(bytes = body.bytes.len(), elapsed_ms = t0.elapsed().as_millis() as u64, "Fetched");
                    return Ok(body);
                }
                Err(e) if attempt < self.retries => {
                    let delay = self.backoff * (attempt + 1);
                    warn!(attempt, max = self.retries, ?delay, error = %e, "GET failed; backing off");
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(attempt, elapsed_ms = t0.elapsed().as_millis() as u64, error = %e, "GET exhausted retries");
                    return Err(e);
                }
            }
        }
    }

    /// GET `url` and decode it with [`decode_body`].
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let body = self.get_body(url).await?;
        Ok(decode_body(&body.bytes, body.content_type.as_deref()))
    }

    async fn try_get(&self, url: &str) -> Result<Body> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NewsError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = resp.bytes().await?.to_vec();
        Ok(Body {
            bytes,
            content_type,
        })
    }
}

/// Raw response body and its `Content-Type` header.
#[derive(Debug, Clone)]
pub struct Body {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

static DECLARED_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:encoding|charset)\s*=\s*["']?([a-z0-9_.:-]+)"#).expect("valid charset regex")
});

fn header_charset(content_type: &str) -> Option<&'static Encoding> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("charset"))
        .and_then(|(_, v)| Encoding::for_label(v.trim().trim_matches('"').as_bytes()))
}

fn declared_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(1024)]);
    DECLARED_CHARSET
        .captures(&head)
        .and_then(|c| Encoding::for_label(c[1].as_bytes()))
}

/// Decode a response body to text.
///
/// A byte-order mark wins, then the `Content-Type` charset, then an
/// `<?xml encoding=..?>` or `<meta charset=..>` declaration near the top of
/// the document. Anything else is read as UTF-8.
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> String {
    let encoding = content_type
        .and_then(header_charset)
        .or_else(|| declared_charset(bytes))
        .unwrap_or(UTF_8);
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        warn!(encoding = used.name(), "Body had bytes invalid for its encoding");
    } else if used != UTF_8 {
        debug!(encoding = used.name(), "Decoded non-UTF-8 body");
    }
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_refused_connection_fails_after_retries() {
        let settings = HttpSettings {
            retries: 1,
            backoff_sec: 0.01,
            ..HttpSettings::default()
        };
        let fetcher = HttpFetcher::new(&settings, 2).unwrap();

        let t0 = Instant::now();
        let err = fetcher.get_body("http://127.0.0.1:1/feed").await.unwrap_err();
        assert!(matches!(err, NewsError::Http(_)), "unexpected error {err:?}");
        assert!(t0.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_header_charset_decodes_euc_kr() {
        let (bytes, _, _) = encoding_rs::EUC_KR.encode("전공의 파업 확산");
        let text = decode_body(&bytes, Some("text/html; charset=EUC-KR"));
        assert_eq!(text, "전공의 파업 확산");
    }

    #[test]
    fn test_xml_declaration_decodes_euc_kr_feed() {
        let xml = r#"<?xml version="1.0" encoding="euc-kr"?>
<rss version="2.0"><channel><item><title>간호사 인력난 심화</title><link>http://x/1</link></item></channel></rss>"#;
        let (bytes, _, _) = encoding_rs::EUC_KR.encode(xml);
        assert!(std::str::from_utf8(&bytes).is_err());

        let text = decode_body(&bytes, Some("application/rss+xml"));
        let entries = crate::scrapers::rss::parse_feed(&text, 10).unwrap();
        assert_eq!(entries[0].title, "간호사 인력난 심화");
    }

    #[test]
    fn test_html_meta_charset_and_utf8_fallback() {
        let html = r#"<html><head><meta charset="euc-kr"></head><body><p>고용노동부</p></body></html>"#;
        let (bytes, _, _) = encoding_rs::EUC_KR.encode(html);
        assert!(decode_body(&bytes, None).contains("고용노동부"));

        assert_eq!(decode_body("보건복지부".as_bytes(), None), "보건복지부");
        assert_eq!(
            decode_body("보건복지부".as_bytes(), Some("text/plain; charset=utf-8")),
            "보건복지부"
        );
    }
}
