//! Static and runtime configuration.
//!
//! Static configuration (keyword taxonomy, feed sources, HTTP defaults) comes
//! from YAML. A default file is compiled into the binary and `--config`
//! replaces it. Runtime knobs live in the META tab of the store and are read
//! at the start of every scrape run as [`RunSettings`].

use crate::dedup::{DEFAULT_MAX_HAMMING, DEFAULT_WINDOW_SIZE};
use crate::error::{NewsError, Result};
use crate::storage::NewsStore;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info, instrument};

const BUILTIN_CONFIG: &str = include_str!("../config/news.yaml");

/// Prefix marking a source that is crawled as an HTML listing instead of a feed.
pub const HTML_SOURCE_PREFIX: &str = "HTML:";

#[derive(Debug, Clone, Deserialize)]
pub struct NewsConfig {
    pub keywords: Vec<TagRule>,
    #[serde(default)]
    pub negative_hints: Vec<String>,
    pub sources: Vec<FeedSource>,
    #[serde(default)]
    pub http: HttpSettings,
}

/// One taxonomy label and the substrings that select it.
#[derive(Debug, Clone, Deserialize)]
pub struct TagRule {
    pub tag: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
}

/// Where a [`FeedSource`] is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind<'a> {
    Feed(&'a str),
    Html(&'a str),
}

impl FeedSource {
    pub fn kind(&self) -> SourceKind<'_> {
        match self.url.trim().strip_prefix(HTML_SOURCE_PREFIX) {
            Some(board) => SourceKind::Html(board),
            None => SourceKind::Feed(self.url.trim()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub user_agent: String,
    pub retries: u32,
    pub backoff_sec: f64,
    pub max_feed_entries: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: format!("news_monitor/{}", env!("CARGO_PKG_VERSION")),
            retries: 2,
            backoff_sec: 1.2,
            max_feed_entries: 50,
        }
    }
}

impl NewsConfig {
    /// The configuration shipped with the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_CONFIG)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: NewsConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` when given, otherwise the built-in configuration.
    #[instrument(level = "info")]
    pub async fn load(path: Option<&str>) -> Result<Self> {
        let config = match path {
            Some(p) => {
                if !Path::new(p).exists() {
                    return Err(NewsError::Configuration(format!(
                        "config file {p} does not exist"
                    )));
                }
                let text = tokio::fs::read_to_string(p).await?;
                Self::from_yaml(&text)?
            }
            None => Self::builtin()?,
        };
        info!(
            tags = config.keywords.len(),
            sources = config.sources.len(),
            "Loaded news configuration"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.keywords.is_empty() {
            return Err(NewsError::Configuration(
                "keyword taxonomy is empty".to_string(),
            ));
        }
        if self.sources.is_empty() {
            return Err(NewsError::Configuration("no sources configured".to_string()));
        }
        Ok(())
    }
}

/// Settings read from the META tab at the start of a scrape run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub max_hamming: u32,
    pub recent_sim_n: usize,
    pub fetch_timeout_sec: u64,
    pub rss_enabled: bool,
    pub gov_pages: u32,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_hamming: DEFAULT_MAX_HAMMING,
            recent_sim_n: DEFAULT_WINDOW_SIZE,
            fetch_timeout_sec: 10,
            rss_enabled: true,
            gov_pages: 1,
        }
    }
}

impl RunSettings {
    /// Read settings from META, falling back to defaults for empty keys.
    ///
    /// `gov_pages` is written back when absent so operators can find and edit it.
    #[instrument(level = "info", skip_all)]
    pub async fn read<S: NewsStore>(store: &S) -> Result<Self> {
        let defaults = Self::default();

        let max_hamming = parse_meta(store, "max_hamming", defaults.max_hamming).await?;
        let recent_sim_n = parse_meta(store, "recent_sim_n", defaults.recent_sim_n).await?;
        let fetch_timeout_sec =
            parse_meta(store, "fetch_timeout_sec", defaults.fetch_timeout_sec).await?;

        let rss_raw = store.meta_get("rss_enabled").await?;
        let rss_enabled = if rss_raw.trim().is_empty() {
            defaults.rss_enabled
        } else {
            rss_raw.trim().eq_ignore_ascii_case("TRUE")
        };

        if store.meta_get("gov_pages").await?.trim().is_empty() {
            store
                .meta_set("gov_pages", &defaults.gov_pages.to_string())
                .await?;
        }
        let gov_pages = parse_meta(store, "gov_pages", defaults.gov_pages).await?;

        let settings = Self {
            max_hamming,
            recent_sim_n,
            fetch_timeout_sec,
            rss_enabled,
            gov_pages: gov_pages.max(1),
        };
        debug!(?settings, "Resolved run settings");
        Ok(settings)
    }
}

async fn parse_meta<S, T>(store: &S, key: &str, default: T) -> Result<T>
where
    S: NewsStore,
    T: std::str::FromStr,
{
    let raw = store.meta_get(key).await?;
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(default);
    }
    raw.parse::<T>().map_err(|_| {
        NewsError::Configuration(format!("META value for {key} is not a valid number: {raw}"))
    })
}
