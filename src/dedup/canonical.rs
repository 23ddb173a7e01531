//! Canonical URLs and title hashes, the keys of exact-duplicate detection.

use crate::utils::normalize_ws;
use sha2::{Digest, Sha256};

const TRACKING_PARAMS: [&str; 2] = ["fbclid", "gclid"];

fn is_tracking_param(pair: &str) -> bool {
    let key = pair.split('=').next().unwrap_or("");
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

/// Strip the fragment and tracking query parameters from `url`.
///
/// Remaining parameters keep their order and original encoding, so the
/// result is stable for links that carry non-ASCII query values.
pub fn canonicalize_url(url: &str) -> String {
    let url = url.trim();
    let url = url.split('#').next().unwrap_or("");

    let mut out = match url.split_once('?') {
        Some((base, query)) => {
            let kept: Vec<&str> = query
                .split('&')
                .filter(|p| !p.is_empty() && !is_tracking_param(p))
                .collect();
            if kept.is_empty() {
                base.to_string()
            } else {
                format!("{}?{}", base, kept.join("&"))
            }
        }
        None => url.to_string(),
    };

    let trimmed_len = out.trim_end_matches(['?', '&']).len();
    out.truncate(trimmed_len);
    out
}

/// Lowercase hex SHA-256 of the whitespace-normalized, lowercased title.
pub fn title_hash(title: &str) -> String {
    hex::encode(Sha256::digest(normalize_ws(title).to_lowercase().as_bytes()))
}
