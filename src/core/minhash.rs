//! MinHash signatures over fingerprint feature sets.
//!
//! Each hash function is `h(x) = (a*x + b) mod p`. The probability that two sets
//! share the same minimum under one function approximates their Jaccard
//! similarity, so the fraction of agreeing signature positions estimates it.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::error::{DedupError, Result};
use super::features::FeatureSet;

/// Mersenne prime `2^31 - 1`.
pub const DEFAULT_PRIME: u64 = (1 << 31) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashFunction {
    pub a: u64,
    pub b: u64,
}

impl HashFunction {
    fn apply(&self, x: u64, prime: u64) -> u64 {
        // u128 keeps a*x + b exact for any 64-bit prime.
        ((self.a as u128 * x as u128 + self.b as u128) % prime as u128) as u64
    }
}

/// A fixed family of `K` hash functions, shared read-only by every signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashFunctionFamily {
    prime: u64,
    functions: Vec<HashFunction>,
}

impl HashFunctionFamily {
    pub fn generate<R: Rng + ?Sized>(num_hashes: usize, prime: u64, rng: &mut R) -> Result<Self> {
        if num_hashes == 0 {
            return Err(DedupError::config("number of hash functions must be >= 1"));
        }
        if !is_prime(prime) {
            return Err(DedupError::config(format!("modulus {} is not prime", prime)));
        }

        let functions = (0..num_hashes)
            .map(|_| HashFunction {
                a: rng.gen_range(1..prime),
                b: rng.gen_range(0..prime),
            })
            .collect();

        Ok(Self { prime, functions })
    }

    pub fn from_seed(num_hashes: usize, prime: u64, seed: u64) -> Result<Self> {
        Self::generate(num_hashes, prime, &mut StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy(num_hashes: usize, prime: u64) -> Result<Self> {
        Self::generate(num_hashes, prime, &mut StdRng::from_entropy())
    }

    pub fn prime(&self) -> u64 {
        self.prime
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn functions(&self) -> &[HashFunction] {
        &self.functions
    }

    /// Minimum hashed value per function over the feature set.
    pub fn sign(&self, features: &FeatureSet) -> Result<Signature> {
        if features.is_empty() {
            return Err(DedupError::EmptyFeatureSet);
        }

        let values = self
            .functions
            .iter()
            .map(|h| {
                features
                    .iter()
                    .map(|x| h.apply(x as u64, self.prime))
                    .min()
                    .unwrap_or(u64::MAX)
            })
            .collect();

        Ok(Signature { values })
    }

    /// Sign every feature set in parallel. Results keep input order and a
    /// failure only affects its own slot.
    pub fn sign_batch(&self, feature_sets: &[FeatureSet]) -> Vec<Result<Signature>> {
        feature_sets.par_iter().map(|set| self.sign(set)).collect()
    }
}

/// Deterministic Miller-Rabin, exact for every `u64`.
pub fn is_prime(n: u64) -> bool {
    const BASES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

    if n < 2 {
        return false;
    }
    for &p in &BASES {
        if n % p == 0 {
            return n == p;
        }
    }

    let mul_mod = |a: u64, b: u64| (a as u128 * b as u128 % n as u128) as u64;
    let pow_mod = |mut base: u64, mut exp: u64| {
        let mut acc = 1;
        while exp > 0 {
            if exp & 1 == 1 {
                acc = mul_mod(acc, base);
            }
            base = mul_mod(base, base);
            exp >>= 1;
        }
        acc
    };

    let s = (n - 1).trailing_zeros();
    let d = (n - 1) >> s;
    'witness: for &a in &BASES {
        let mut x = pow_mod(a, d);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..s {
            x = mul_mod(x, x);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    values: Vec<u64>,
}

impl Signature {
    pub fn from_values(values: Vec<u64>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[u64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Fraction of positions where both signatures agree.
    pub fn estimated_similarity(&self, other: &Signature) -> f64 {
        if self.values.len() != other.values.len() || self.values.is_empty() {
            return 0.0;
        }
        let matches = self
            .values
            .iter()
            .zip(other.values.iter())
            .filter(|(a, b)| a == b)
            .count();
        matches as f64 / self.values.len() as f64
    }
}
