//! SimHash fingerprints and LSH bucket tables for near-duplicate pages.
//!
//! A fingerprint is rotated into 64 permutations. Permutation `i` keys table
//! `i` by the top `prefix_bits` bits of `fingerprint.rotate_left(i)`, so each
//! table groups pages that agree on a different contiguous window. Only the
//! suffixes inside a shared bucket are compared bit by bit.

use std::collections::HashMap;

pub const FINGERPRINT_BITS: usize = 64;

/// Fold per-term hashes into a document fingerprint.
///
/// Every occurrence counts: bit `i` of each hash adds +1 when set and -1 when
/// clear. Positive sums become 1; zero and negative sums become 0.
pub fn fingerprint<I>(hashes: I) -> u64
where
    I: IntoIterator<Item = u64>,
{
    let mut sums = [0i64; FINGERPRINT_BITS];
    for h in hashes {
        for (i, sum) in sums.iter_mut().enumerate() {
            let bit = (h >> (FINGERPRINT_BITS - 1 - i)) & 1;
            *sum += bit as i64 * 2 - 1;
        }
    }
    sums.iter().enumerate().fold(0u64, |acc, (i, &sum)| {
        if sum > 0 {
            acc | 1 << (FINGERPRINT_BITS - 1 - i)
        } else {
            acc
        }
    })
}

/// Split a fingerprint into its 64 `(prefix, suffix)` bands.
///
/// `prefix_bits` is clamped to `1..=63` so both halves are non-empty.
pub fn permutations(fingerprint: u64, prefix_bits: u32) -> Vec<(u64, u64)> {
    let prefix_bits = clamp_prefix_bits(prefix_bits);
    let suffix_bits = FINGERPRINT_BITS as u32 - prefix_bits;
    let suffix_mask = (1u64 << suffix_bits) - 1;
    (0..FINGERPRINT_BITS as u32)
        .map(|i| {
            let rotated = fingerprint.rotate_left(i);
            (rotated >> suffix_bits, rotated & suffix_mask)
        })
        .collect()
}

fn clamp_prefix_bits(prefix_bits: u32) -> u32 {
    prefix_bits.clamp(1, FINGERPRINT_BITS as u32 - 1)
}

pub fn hamming(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Banding tables for one indexing run. First-seen pages always win.
#[derive(Debug)]
pub struct NearDuplicateDetector {
    threshold: u32,
    prefix_bits: u32,
    tables: Vec<HashMap<u64, Vec<u64>>>,
}

impl NearDuplicateDetector {
    pub fn new(threshold: u32, prefix_bits: u32) -> Self {
        Self {
            threshold,
            prefix_bits: clamp_prefix_bits(prefix_bits),
            tables: vec![HashMap::new(); FINGERPRINT_BITS],
        }
    }

    /// Test `fingerprint` against every earlier one sharing a bucket, then record it.
    ///
    /// Returns true when any table holds a suffix within `threshold` differing
    /// bits. All 64 tables are updated either way; a suffix already present in
    /// its bucket is not stored twice.
    pub fn check(&mut self, fingerprint: u64) -> bool {
        let mut near_duplicate = false;
        for (table, (prefix, suffix)) in self
            .tables
            .iter_mut()
            .zip(permutations(fingerprint, self.prefix_bits))
        {
            let bucket = table.entry(prefix).or_default();
            let mut present = false;
            for &seen in bucket.iter() {
                if seen == suffix {
                    present = true;
                }
                if !near_duplicate && hamming(seen, suffix) <= self.threshold {
                    near_duplicate = true;
                }
            }
            if !present {
                bucket.push(suffix);
            }
        }
        near_duplicate
    }

    /// Total number of buckets across all tables.
    pub fn bucket_count(&self) -> usize {
        self.tables.iter().map(HashMap::len).sum()
    }

    pub fn clear(&mut self) {
        self.tables.iter_mut().for_each(HashMap::clear);
    }
}
