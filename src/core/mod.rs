pub mod error;
pub mod features;
pub mod fingerprint;
pub mod group;
pub mod lsh;
pub mod minhash;
pub mod pipeline;
pub mod verify;

pub use error::DedupError;
pub use features::{FeatureSet, encode};
pub use fingerprint::{Fingerprint, FingerprintStore};
pub use group::{DuplicateGroup, build_groups};
pub use lsh::{CandidatePair, LshIndex, LshParams};
pub use minhash::{HashFunctionFamily, Signature};
pub use pipeline::{DedupOutcome, DedupPipeline, ItemFailure, candidate_ids, verify_candidates};
pub use verify::{VerifiedPair, Verifier};
