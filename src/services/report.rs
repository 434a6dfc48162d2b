use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::config::DedupConfig;
use crate::core::group::DuplicateGroup;
use crate::core::pipeline::{DedupOutcome, DedupPipeline, ItemFailure};
use crate::core::verify::VerifiedPair;
use crate::services::perceptual::DecodeFailure;

/// Similarities at which the LSH candidate curve is sampled in reports.
const CURVE_POINTS: [f64; 5] = [0.5, 0.6, 0.7, 0.8, 0.9];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetStats {
    pub total_items: usize,
    pub unique_items: usize,
    pub items_with_duplicates: usize,
    pub duplicate_groups: usize,
    pub duplicate_pairs: usize,
    /// Percentage of items that belong to a group.
    pub duplicate_rate: f64,
}

impl DatasetStats {
    /// Each group counts once towards `unique_items`.
    pub fn compute<T>(
        total_items: usize,
        verified: &[VerifiedPair<T>],
        groups: &[DuplicateGroup<T>],
    ) -> Self {
        let items_with_duplicates: usize = groups.iter().map(|g| g.len()).sum();
        let duplicate_rate = if total_items == 0 {
            0.0
        } else {
            items_with_duplicates as f64 / total_items as f64 * 100.0
        };

        Self {
            total_items,
            unique_items: (total_items + groups.len()).saturating_sub(items_with_duplicates),
            items_with_duplicates,
            duplicate_groups: groups.len(),
            duplicate_pairs: verified.len(),
            duplicate_rate,
        }
    }
}

impl fmt::Display for DatasetStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total images:           {}", self.total_items)?;
        writeln!(f, "Unique images:          {}", self.unique_items)?;
        writeln!(f, "Images with duplicates: {}", self.items_with_duplicates)?;
        writeln!(f, "Verified pairs:         {}", self.duplicate_pairs)?;
        writeln!(f, "Duplicate groups:       {}", self.duplicate_groups)?;
        writeln!(f, "Duplicate rate:         {:.2}%", self.duplicate_rate)
    }
}

/// `Group N: k duplicates -> a, b, ...`, one line per group, 1-based.
pub struct GroupListing<'a>(pub &'a [DuplicateGroup<String>]);

impl fmt::Display for GroupListing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, group) in self.0.iter().enumerate() {
            writeln!(
                f,
                "Group {}: {} duplicates -> {}",
                i + 1,
                group.len(),
                group.members().join(", ")
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CurvePoint {
    pub similarity: f64,
    pub probability: f64,
}

/// Everything a `duplicates scan` produced, ready to print or save as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub generated_at: DateTime<Local>,
    pub config: DedupConfig,
    pub rows_per_band: usize,
    pub lsh_threshold: f64,
    /// Chance that a pair of the given Jaccard similarity becomes a candidate.
    pub candidate_curve: Vec<CurvePoint>,
    pub stats: DatasetStats,
    pub candidate_pairs: usize,
    pub verified: Vec<VerifiedPair<String>>,
    pub groups: Vec<DuplicateGroup<String>>,
    pub failures: Vec<ItemFailure<String>>,
    pub decode_failures: Vec<DecodeFailure>,
}

impl ScanReport {
    /// `hashed_items` counts the fingerprints the pipeline saw. Files that
    /// failed to decode still count towards the dataset total.
    pub fn new(
        pipeline: &DedupPipeline,
        hashed_items: usize,
        outcome: DedupOutcome<String>,
        decode_failures: Vec<DecodeFailure>,
    ) -> Self {
        let params = pipeline.params();
        let total_items = hashed_items + decode_failures.len();
        let stats = DatasetStats::compute(total_items, &outcome.verified, &outcome.groups);
        let candidate_curve = CURVE_POINTS
            .iter()
            .map(|&similarity| CurvePoint {
                similarity,
                probability: params.candidate_probability(similarity),
            })
            .collect();

        Self {
            generated_at: Local::now(),
            config: pipeline.config().clone(),
            rows_per_band: params.rows_per_band(),
            lsh_threshold: params.threshold(),
            candidate_curve,
            stats,
            candidate_pairs: outcome.candidates.len(),
            verified: outcome.verified,
            groups: outcome.groups,
            failures: outcome.failures,
            decode_failures,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "LSH: K={} B={} R={} (threshold ≈ {:.3}), Hamming ≤ {}",
            self.config.num_hashes,
            self.config.num_bands,
            self.rows_per_band,
            self.lsh_threshold,
            self.config.hamming_threshold
        )?;
        for point in &self.candidate_curve {
            writeln!(
                f,
                "  P(candidate | s={:.1}) = {:.3}",
                point.similarity, point.probability
            )?;
        }
        writeln!(f, "Candidate pairs:        {}", self.candidate_pairs)?;
        write!(f, "{}", self.stats)?;
        if !self.failures.is_empty() {
            writeln!(f, "Skipped items:          {}", self.failures.len())?;
        }
        if !self.decode_failures.is_empty() {
            writeln!(f, "Undecodable files:      {}", self.decode_failures.len())?;
        }
        if !self.groups.is_empty() {
            writeln!(f)?;
            write!(f, "{}", GroupListing(&self.groups))?;
        }
        Ok(())
    }
}
