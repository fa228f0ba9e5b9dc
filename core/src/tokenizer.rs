use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use sha1::{Digest, Sha1};
use std::collections::HashMap;

lazy_static! {
    static ref NON_ALNUM: Regex = Regex::new(r"[^a-zA-Z0-9]").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
}

/// Shortest token kept after splitting.
pub const MIN_TOKEN_LEN: usize = 2;

/// Blank out everything but ASCII letters/digits, lowercase.
pub fn normalize(text: &str) -> String {
    NON_ALNUM.replace_all(text, " ").to_lowercase()
}

pub fn stem(token: &str) -> String {
    STEMMER.stem(token).into_owned()
}

/// Turn raw page text into its stemmed term sequence, in reading order.
pub fn analyze(text: &str) -> Vec<String> {
    normalize(text)
        .split_whitespace()
        .filter(|t| t.len() >= MIN_TOKEN_LEN)
        .map(stem)
        .collect()
}

/// Cheap exact-duplicate checksum over a stemmed term stream.
///
/// Only byte and length totals go in, so any reordering of the same terms
/// yields the same value. Returns `None` when there is nothing to sum.
pub fn checksum<S: AsRef<str>>(terms: &[S]) -> Option<f64> {
    let mut total_bytes: u64 = 0;
    let mut total_chars: u64 = 0;
    for term in terms {
        let term = term.as_ref();
        total_chars += term.len() as u64;
        total_bytes += term.bytes().map(u64::from).sum::<u64>();
    }
    if total_bytes == 0 || total_chars == 0 {
        return None;
    }
    Some((total_bytes % total_chars) as f64 + total_chars as f64 / total_bytes as f64)
}

/// 64-bit content hash of a term: the leading eight bytes of its SHA-1 digest.
pub fn term_hash(term: &str) -> u64 {
    let digest = Sha1::digest(term.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}

/// Per-run memo of term hashes so each distinct term is hashed once.
#[derive(Debug, Default)]
pub struct TermHashes {
    hashes: HashMap<String, u64>,
}

impl TermHashes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash(&mut self, term: &str) -> u64 {
        if let Some(&h) = self.hashes.get(term) {
            return h;
        }
        let h = term_hash(term);
        self.hashes.insert(term.to_string(), h);
        h
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn clear(&mut self) {
        self.hashes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_analyze() {
        let t = analyze("Running, runner's run!");
        assert!(t.iter().any(|w| w == "run"));
        // "s" from "runner's" is below the minimum length
        assert!(!t.iter().any(|w| w == "s"));
    }

    #[test]
    fn checksum_ignores_order() {
        let a = checksum(&["cat", "dog", "cat"]).unwrap();
        let b = checksum(&["dog", "cat", "cat"]).unwrap();
        assert_eq!(a, b);
        assert!(checksum::<&str>(&[]).is_none());
    }

    #[test]
    fn checksum_formula() {
        // "ab" = 97 + 98 = 195 bytes over 2 chars
        let c = checksum(&["ab"]).unwrap();
        assert!((c - (1.0 + 2.0 / 195.0)).abs() < 1e-12);
    }

    #[test]
    fn term_hash_is_memoized_and_stable() {
        let mut hashes = TermHashes::new();
        let first = hashes.hash("cat");
        assert_eq!(hashes.hash("cat"), first);
        assert_eq!(first, term_hash("cat"));
        assert_ne!(first, term_hash("dog"));
        assert_eq!(hashes.len(), 1);
    }
}
