use super::fingerprint::Fingerprint;

/// Set bit positions of a fingerprint, sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FeatureSet {
    positions: Vec<u32>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn contains(&self, position: u32) -> bool {
        self.positions.binary_search(&position).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.positions.iter().copied()
    }

    pub fn intersection_len(&self, other: &FeatureSet) -> usize {
        self.iter().filter(|&p| other.contains(p)).count()
    }

    pub fn symmetric_difference_len(&self, other: &FeatureSet) -> usize {
        self.len() + other.len() - 2 * self.intersection_len(other)
    }

    /// Exact Jaccard similarity. Two empty sets are identical.
    pub fn jaccard(&self, other: &FeatureSet) -> f64 {
        let intersection = self.intersection_len(other);
        let union = self.len() + other.len() - intersection;
        if union == 0 {
            return 1.0;
        }
        intersection as f64 / union as f64
    }
}

/// Turn a fingerprint into the set of its set bit positions.
pub fn encode(fingerprint: &Fingerprint) -> FeatureSet {
    FeatureSet {
        positions: (0..fingerprint.width())
            .filter(|&p| fingerprint.is_set(p))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_picks_set_bits() {
        let fp = Fingerprint::new(0b1010_0001, 8).unwrap();
        let set = encode(&fp);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 5, 7]);
        assert!(set.contains(5));
        assert!(!set.contains(1));
    }

    #[test]
    fn test_zero_fingerprint_is_empty() {
        let fp = Fingerprint::new(0, 64).unwrap();
        assert!(encode(&fp).is_empty());
    }

    #[test]
    fn test_jaccard() {
        let a = encode(&Fingerprint::new(0b1111, 4).unwrap());
        let b = encode(&Fingerprint::new(0b1110, 4).unwrap());
        assert!((a.jaccard(&b) - 0.75).abs() < f64::EPSILON);
        assert_eq!(FeatureSet::default().jaccard(&FeatureSet::default()), 1.0);
    }

    proptest! {
        #[test]
        fn symmetric_difference_equals_hamming_distance(x in any::<u64>(), y in any::<u64>()) {
            let fx = Fingerprint::new(x, 64).unwrap();
            let fy = Fingerprint::new(y, 64).unwrap();
            let d = fx.hamming_distance(&fy) as usize;
            prop_assert_eq!(encode(&fx).symmetric_difference_len(&encode(&fy)), d);
        }
    }
}
