//! Fixed-width perceptual fingerprints and the store that owns them.
//!
//! A fingerprint is treated as an opaque bit vector of `width` bits. The store
//! hands out dense indices in insertion order; every later stage works on those
//! indices and only maps back to identifiers when producing output.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use super::error::{DedupError, Result};

/// Widest fingerprint the store accepts.
pub const MAX_FINGERPRINT_BITS: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    bits: u64,
    width: u32,
}

impl Fingerprint {
    pub fn new(bits: u64, width: u32) -> Result<Self> {
        if width == 0 || width > MAX_FINGERPRINT_BITS {
            return Err(DedupError::config(format!(
                "fingerprint width must be in 1..={}, got {}",
                MAX_FINGERPRINT_BITS, width
            )));
        }
        if width < MAX_FINGERPRINT_BITS && bits >> width != 0 {
            return Err(DedupError::FingerprintOverflow { value: bits, width });
        }
        Ok(Self { bits, width })
    }

    pub fn bits(&self) -> u64 {
        self.bits
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn is_set(&self, position: u32) -> bool {
        position < self.width && (self.bits >> position) & 1 == 1
    }

    /// Number of bit positions where the two fingerprints differ.
    pub fn hamming_distance(&self, other: &Fingerprint) -> u32 {
        (self.bits ^ other.bits).count_ones()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.width.div_ceil(4) as usize;
        write!(f, "{:0digits$x}", self.bits, digits = digits)
    }
}

/// Ordered `(id, fingerprint)` records with unique identifiers.
#[derive(Debug, Clone)]
pub struct FingerprintStore<I> {
    width: u32,
    ids: Vec<I>,
    fingerprints: Vec<Fingerprint>,
    positions: HashMap<I, usize>,
}

impl<I> FingerprintStore<I>
where
    I: Clone + Eq + Hash + fmt::Display,
{
    pub fn new(width: u32) -> Result<Self> {
        // Validates the width the same way a fingerprint would.
        Fingerprint::new(0, width)?;
        Ok(Self {
            width,
            ids: Vec::new(),
            fingerprints: Vec::new(),
            positions: HashMap::new(),
        })
    }

    /// Build a store from raw `(id, bits)` records, rejecting the first bad one.
    pub fn from_records<T>(width: u32, records: T) -> Result<Self>
    where
        T: IntoIterator<Item = (I, u64)>,
    {
        let mut store = Self::new(width)?;
        for (id, bits) in records {
            store.insert(id, Fingerprint::new(bits, width)?)?;
        }
        Ok(store)
    }

    /// Append a record and return its dense index.
    pub fn insert(&mut self, id: I, fingerprint: Fingerprint) -> Result<usize> {
        if fingerprint.width() != self.width {
            return Err(DedupError::WidthMismatch {
                expected: self.width,
                found: fingerprint.width(),
            });
        }
        if self.positions.contains_key(&id) {
            return Err(DedupError::DuplicateIdentifier { id: id.to_string() });
        }

        let index = self.ids.len();
        self.positions.insert(id.clone(), index);
        self.ids.push(id);
        self.fingerprints.push(fingerprint);
        Ok(index)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn id(&self, index: usize) -> Option<&I> {
        self.ids.get(index)
    }

    pub fn fingerprint(&self, index: usize) -> Option<&Fingerprint> {
        self.fingerprints.get(index)
    }

    pub fn position(&self, id: &I) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn get(&self, id: &I) -> Option<&Fingerprint> {
        self.position(id).map(|index| &self.fingerprints[index])
    }

    pub fn fingerprints(&self) -> &[Fingerprint] {
        &self.fingerprints
    }

    pub fn iter(&self) -> impl Iterator<Item = (&I, &Fingerprint)> {
        self.ids.iter().zip(self.fingerprints.iter())
    }

    /// Exact Hamming distance between two stored items, by dense index.
    pub fn distance(&self, a: usize, b: usize) -> Option<u32> {
        let fa = self.fingerprints.get(a)?;
        let fb = self.fingerprints.get(b)?;
        Some(fa.hamming_distance(fb))
    }
}
