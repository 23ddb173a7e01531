//! Title tokenization and 64-bit SimHash fingerprints.
//!
//! Each token is hashed with MD5 and read as a 128-bit big-endian integer;
//! the low 64 bits vote on the fingerprint. The hash is fixed (not
//! `DefaultHasher`) so fingerprints stored by earlier runs stay comparable.

use crate::utils::normalize_ws;
use md5::{Digest, Md5};

/// Upper bound on tokens considered per title.
pub const MAX_TOKENS: usize = 200;

const MIN_TOKEN_CHARS: usize = 2;

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || ('\u{AC00}'..='\u{D7A3}').contains(&c) || c == ' '
}

/// Split `text` into lowercase tokens of at least two characters.
///
/// Characters other than ASCII letters/digits and Hangul syllables act as
/// separators. At most [`MAX_TOKENS`] tokens are returned.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = normalize_ws(text)
        .to_lowercase()
        .chars()
        .map(|c| if is_token_char(c) { c } else { ' ' })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .take(MAX_TOKENS)
        .map(str::to_string)
        .collect()
}

fn token_hash(token: &str) -> u128 {
    let digest = Md5::digest(token.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest);
    u128::from_be_bytes(bytes)
}

/// SimHash of the title, or `None` when it has no tokens.
pub fn simhash64(text: &str) -> Option<u64> {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return None;
    }

    let mut votes = [0i32; 64];
    for token in &tokens {
        let h = token_hash(token);
        for (i, v) in votes.iter_mut().enumerate() {
            if (h >> i) & 1 == 1 {
                *v += 1;
            } else {
                *v -= 1;
            }
        }
    }

    let fingerprint = votes
        .iter()
        .enumerate()
        .filter(|(_, v)| **v >= 0)
        .fold(0u64, |acc, (i, _)| acc | (1u64 << i));
    Some(fingerprint)
}

/// Number of differing bits, in `0..=64`.
pub fn hamming(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Storage form of a fingerprint: decimal digits, or empty when absent.
pub fn fingerprint_to_field(fingerprint: Option<u64>) -> String {
    fingerprint.map(|f| f.to_string()).unwrap_or_default()
}

/// Parse a stored fingerprint; anything but plain decimal digits is absent.
pub fn fingerprint_from_field(field: &str) -> Option<u64> {
    let field = field.trim();
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}
