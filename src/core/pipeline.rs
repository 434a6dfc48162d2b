//! One duplicate-detection run: sign, index, verify, group.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::Hash;

use serde::Serialize;

use super::error::{DedupError, Result};
use super::features::encode;
use super::fingerprint::FingerprintStore;
use super::group::{DuplicateGroup, build_groups};
use super::lsh::{CandidatePair, LshIndex, LshParams};
use super::minhash::{HashFunctionFamily, Signature};
use super::verify::{VerifiedPair, Verifier};
use crate::config::DedupConfig;

/// Item that could not be signed. The rest of the batch is unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure<I> {
    pub id: I,
    #[serde(serialize_with = "serialize_error")]
    pub error: DedupError,
}

fn serialize_error<S: serde::Serializer>(
    error: &DedupError,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DedupOutcome<I> {
    pub candidates: Vec<CandidatePair<I>>,
    pub verified: Vec<VerifiedPair<I>>,
    pub groups: Vec<DuplicateGroup<I>>,
    pub failures: Vec<ItemFailure<I>>,
}

#[derive(Debug, Clone)]
pub struct DedupPipeline {
    config: DedupConfig,
    params: LshParams,
    family: HashFunctionFamily,
    verifier: Verifier,
}

impl DedupPipeline {
    /// Validate `config` and draw a fresh hash family from its seed, or from
    /// the OS when no seed is set.
    pub fn new(config: DedupConfig) -> Result<Self> {
        config.validate()?;
        let family = match config.seed {
            Some(seed) => HashFunctionFamily::from_seed(config.num_hashes, config.prime, seed)?,
            None => HashFunctionFamily::from_entropy(config.num_hashes, config.prime)?,
        };
        Self::with_family(config, family)
    }

    /// Reuse an existing family so repeated runs give identical results.
    pub fn with_family(config: DedupConfig, family: HashFunctionFamily) -> Result<Self> {
        let params = config.validate()?;
        if family.len() != params.num_hashes() {
            return Err(DedupError::config(format!(
                "hash family has {} functions, config expects {}",
                family.len(),
                params.num_hashes()
            )));
        }
        if family.prime() != config.prime {
            return Err(DedupError::config(format!(
                "hash family uses prime {}, config expects {}",
                family.prime(),
                config.prime
            )));
        }

        let verifier = Verifier::new(config.hamming_threshold);
        Ok(Self {
            config,
            params,
            family,
            verifier,
        })
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    pub fn params(&self) -> LshParams {
        self.params
    }

    pub fn family(&self) -> &HashFunctionFamily {
        &self.family
    }

    fn check_store<I>(&self, store: &FingerprintStore<I>) -> Result<()>
    where
        I: Clone + Eq + Hash + fmt::Display,
    {
        if store.width() != self.config.fingerprint_bits {
            return Err(DedupError::WidthMismatch {
                expected: self.config.fingerprint_bits,
                found: store.width(),
            });
        }
        Ok(())
    }

    /// Signatures by store index, plus the items that could not be signed.
    pub fn signatures<I>(
        &self,
        store: &FingerprintStore<I>,
    ) -> Result<(Vec<(usize, Signature)>, Vec<ItemFailure<I>>)>
    where
        I: Clone + Eq + Hash + fmt::Display,
    {
        self.check_store(store)?;

        let feature_sets: Vec<_> = store.fingerprints().iter().map(encode).collect();
        let mut signed = Vec::with_capacity(feature_sets.len());
        let mut failures = Vec::new();

        for (index, result) in self.family.sign_batch(&feature_sets).into_iter().enumerate() {
            match result {
                Ok(signature) => signed.push((index, signature)),
                Err(error) => {
                    let id = item_id(store, index)?;
                    log::warn!("Skipping {}: {}", id, error);
                    failures.push(ItemFailure { id, error });
                }
            }
        }
        Ok((signed, failures))
    }

    /// Candidate pairs over store indices.
    pub fn candidates<I>(
        &self,
        store: &FingerprintStore<I>,
    ) -> Result<(BTreeSet<CandidatePair<usize>>, Vec<ItemFailure<I>>)>
    where
        I: Clone + Eq + Hash + fmt::Display,
    {
        let (signed, failures) = self.signatures(store)?;

        let mut index = LshIndex::new(self.params);
        for (item, signature) in &signed {
            index.add_signature(*item, signature)?;
        }
        Ok((index.find_candidates(), failures))
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    pub fn run<I>(&self, store: &FingerprintStore<I>) -> Result<DedupOutcome<I>>
    where
        I: Clone + Ord + Hash + fmt::Display + Send + Sync,
    {
        let (candidates, failures) = self.candidates(store)?;
        let (verified, groups) = verify_candidates(store, &candidates, &self.verifier)?;

        log::info!(
            "{} items: {} candidates, {} verified pairs, {} groups, {} failures",
            store.len(),
            candidates.len(),
            verified.len(),
            groups.len(),
            failures.len()
        );

        Ok(DedupOutcome {
            candidates: candidate_ids(store, candidates)?,
            verified,
            groups,
            failures,
        })
    }
}

fn item_id<I>(store: &FingerprintStore<I>, index: usize) -> Result<I>
where
    I: Clone + Eq + Hash + fmt::Display,
{
    store
        .id(index)
        .cloned()
        .ok_or_else(|| DedupError::config(format!("store index {} out of range", index)))
}

/// Map index-based candidates back to item ids, sorted.
pub fn candidate_ids<I>(
    store: &FingerprintStore<I>,
    candidates: BTreeSet<CandidatePair<usize>>,
) -> Result<Vec<CandidatePair<I>>>
where
    I: Clone + Ord + Hash + fmt::Display,
{
    let mut pairs = Vec::with_capacity(candidates.len());
    for pair in candidates {
        let (a, b) = pair.into_parts();
        pairs.extend(CandidatePair::new(item_id(store, a)?, item_id(store, b)?));
    }
    pairs.sort();
    Ok(pairs)
}

/// Check candidates against the stored fingerprints and group the survivors.
/// Output is expressed in item ids with pairs and groups sorted.
pub fn verify_candidates<I>(
    store: &FingerprintStore<I>,
    candidates: &BTreeSet<CandidatePair<usize>>,
    verifier: &Verifier,
) -> Result<(Vec<VerifiedPair<I>>, Vec<DuplicateGroup<I>>)>
where
    I: Clone + Ord + Hash + fmt::Display + Send + Sync,
{
    let verified = verifier.verify_all(candidates, |a: &usize, b: &usize| {
        store.distance(*a, *b).unwrap_or(u32::MAX)
    });
    let groups = build_groups(&verified);

    let mut verified_ids = Vec::with_capacity(verified.len());
    for pair in verified {
        let (a, b) = (item_id(store, pair.first)?, item_id(store, pair.second)?);
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        verified_ids.push(VerifiedPair {
            first,
            second,
            distance: pair.distance,
        });
    }
    verified_ids.sort();

    let mut group_ids = groups
        .into_iter()
        .map(|group| group.try_map(|index| item_id(store, index)))
        .collect::<Result<Vec<_>>>()?;
    group_ids.sort_by(|a, b| a.members().cmp(b.members()));

    Ok((verified_ids, group_ids))
}
