//! Keyword classification of article titles.

use crate::config::{NewsConfig, TagRule};
use itertools::Itertools;

/// Assigns taxonomy labels to titles by substring match.
#[derive(Debug, Clone)]
pub struct Tagger {
    rules: Vec<TagRule>,
    negative_hints: Vec<String>,
}

impl Tagger {
    pub fn new(rules: Vec<TagRule>, negative_hints: Vec<String>) -> Self {
        Self {
            rules,
            negative_hints,
        }
    }

    pub fn from_config(config: &NewsConfig) -> Self {
        Self::new(config.keywords.clone(), config.negative_hints.clone())
    }

    /// Labels whose keywords occur in `text`, in configured order.
    ///
    /// Any negative hint (entertainment, sports, ...) vetoes every label.
    pub fn pick_tags(&self, text: &str) -> Vec<String> {
        if self.negative_hints.iter().any(|h| text.contains(h.as_str())) {
            return Vec::new();
        }
        self.rules
            .iter()
            .filter(|rule| rule.keywords.iter().any(|k| text.contains(k.as_str())))
            .map(|rule| rule.tag.clone())
            .unique()
            .collect()
    }
}
