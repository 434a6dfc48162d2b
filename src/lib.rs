//! `lshcull`: near-duplicate photo detection without all-pairs comparison.
//!
//! Perceptual fingerprints are turned into feature sets, signed with MinHash,
//! bucketed with LSH banding, checked against the exact Hamming distance and
//! finally collapsed into duplicate groups.

pub mod config;
pub mod core;
pub mod services;

pub use crate::config::{ConfigError, DedupConfig};
pub use crate::core::{
    CandidatePair, DedupError, DedupOutcome, DedupPipeline, DuplicateGroup, Fingerprint,
    FingerprintStore, VerifiedPair,
};
