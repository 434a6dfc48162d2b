use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::lsh::CandidatePair;

/// Candidate pair confirmed by the exact distance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VerifiedPair<T> {
    pub first: T,
    pub second: T,
    pub distance: u32,
}

/// Filters LSH candidates by exact Hamming distance. The threshold is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verifier {
    threshold: u32,
}

impl Verifier {
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// A candidate over the threshold is dropped. That is the expected outcome
    /// for a false positive and not an error.
    pub fn verify<T, F>(&self, pair: &CandidatePair<T>, distance: F) -> Option<VerifiedPair<T>>
    where
        T: Clone + Ord,
        F: FnOnce(&T, &T) -> u32,
    {
        let d = distance(pair.first(), pair.second());
        (d <= self.threshold).then(|| VerifiedPair {
            first: pair.first().clone(),
            second: pair.second().clone(),
            distance: d,
        })
    }

    /// Verify every candidate in parallel; output is sorted by pair.
    pub fn verify_all<T, F>(
        &self,
        candidates: &BTreeSet<CandidatePair<T>>,
        distance: F,
    ) -> Vec<VerifiedPair<T>>
    where
        T: Clone + Ord + Send + Sync,
        F: Fn(&T, &T) -> u32 + Sync,
    {
        let mut verified: Vec<VerifiedPair<T>> = candidates
            .par_iter()
            .filter_map(|pair| self.verify(pair, &distance))
            .collect();
        verified.par_sort_unstable();

        log::debug!(
            "Verified {} of {} candidate pairs at threshold {}",
            verified.len(),
            candidates.len(),
            self.threshold
        );
        verified
    }
}
