//! LSH banding index over MinHash signatures.
//!
//! A signature of length `K = B * R` is cut into `B` bands of `R` rows. Two
//! items become a candidate pair when every row of at least one band matches.
//! Raising `R` cuts false positives; raising `B` raises recall.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::error::{DedupError, Result};
use super::minhash::Signature;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LshParams {
    num_bands: usize,
    rows_per_band: usize,
}

impl LshParams {
    /// Split `num_hashes` signature rows into `num_bands` equal bands.
    pub fn new(num_hashes: usize, num_bands: usize) -> Result<Self> {
        if num_hashes == 0 || num_bands == 0 {
            return Err(DedupError::config(
                "number of hashes and number of bands must be >= 1",
            ));
        }
        if num_hashes % num_bands != 0 {
            return Err(DedupError::config(format!(
                "{} hashes cannot be split evenly into {} bands",
                num_hashes, num_bands
            )));
        }
        Ok(Self {
            num_bands,
            rows_per_band: num_hashes / num_bands,
        })
    }

    pub fn num_bands(&self) -> usize {
        self.num_bands
    }

    pub fn rows_per_band(&self) -> usize {
        self.rows_per_band
    }

    pub fn num_hashes(&self) -> usize {
        self.num_bands * self.rows_per_band
    }

    /// Probability that two items with Jaccard similarity `s` collide in at
    /// least one band: `1 - (1 - s^R)^B`.
    pub fn candidate_probability(&self, similarity: f64) -> f64 {
        let r = self.rows_per_band as f64;
        let b = self.num_bands as f64;
        1.0 - (1.0 - similarity.powf(r)).powf(b)
    }

    /// Similarity at which the candidate probability curve is steepest,
    /// approximately `(1/B)^(1/R)`.
    pub fn threshold(&self) -> f64 {
        (1.0 / self.num_bands as f64).powf(1.0 / self.rows_per_band as f64)
    }
}

/// Unordered pair of distinct items, stored as `(min, max)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CandidatePair<T> {
    first: T,
    second: T,
}

impl<T: Ord> CandidatePair<T> {
    /// Returns `None` for a self-pair.
    pub fn new(a: T, b: T) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { first: a, second: b }),
            std::cmp::Ordering::Greater => Some(Self { first: b, second: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn first(&self) -> &T {
        &self.first
    }

    pub fn second(&self) -> &T {
        &self.second
    }

    pub fn into_parts(self) -> (T, T) {
        (self.first, self.second)
    }
}

/// Band contents compared element-wise, so unrelated bands never share a
/// bucket even if their hashes collide.
type BandKey = Box<[u64]>;

#[derive(Debug, Clone)]
pub struct LshIndex<T> {
    params: LshParams,
    buckets: Vec<HashMap<BandKey, Vec<T>>>,
    len: usize,
}

impl<T: Clone + Ord> LshIndex<T> {
    pub fn new(params: LshParams) -> Self {
        Self {
            params,
            buckets: (0..params.num_bands).map(|_| HashMap::new()).collect(),
            len: 0,
        }
    }

    pub fn params(&self) -> LshParams {
        self.params
    }

    /// Number of signatures added.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total number of non-empty buckets across all bands.
    pub fn bucket_count(&self) -> usize {
        self.buckets.iter().map(HashMap::len).sum()
    }

    /// Insert `item` into exactly one bucket per band.
    pub fn add_signature(&mut self, item: T, signature: &Signature) -> Result<()> {
        let expected = self.params.num_hashes();
        if signature.len() != expected {
            return Err(DedupError::SignatureLength {
                expected,
                found: signature.len(),
            });
        }

        let bands = signature.values().chunks_exact(self.params.rows_per_band);
        for (band, table) in bands.zip(self.buckets.iter_mut()) {
            table.entry(band.into()).or_default().push(item.clone());
        }
        self.len += 1;
        Ok(())
    }

    /// Every pair of distinct items sharing at least one bucket, deduplicated
    /// across bands.
    pub fn find_candidates(&self) -> BTreeSet<CandidatePair<T>> {
        let mut candidates = BTreeSet::new();

        for items in self.buckets.iter().flat_map(HashMap::values) {
            if items.len() < 2 {
                continue;
            }
            for (i, a) in items.iter().enumerate() {
                for b in &items[i + 1..] {
                    if let Some(pair) = CandidatePair::new(a.clone(), b.clone()) {
                        candidates.insert(pair);
                    }
                }
            }
        }

        log::debug!(
            "LSH index: {} items, {} buckets, {} candidate pairs",
            self.len,
            self.bucket_count(),
            candidates.len()
        );
        candidates
    }
}
