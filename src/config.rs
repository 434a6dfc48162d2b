//! Run configuration for the duplicate-detection pipeline.
//!
//! Every tuning knob is explicit: there is no `Default`, callers (the CLI, or a
//! JSON file passed with `--config`) must state each one.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::error::{DedupError, Result as DedupResult};
use crate::core::fingerprint::MAX_FINGERPRINT_BITS;
use crate::core::lsh::LshParams;
use crate::core::minhash::{DEFAULT_PRIME, is_prime};

fn default_prime() -> u64 {
    DEFAULT_PRIME
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Fingerprint width `N` in bits.
    pub fingerprint_bits: u32,
    /// Signature length `K`.
    pub num_hashes: usize,
    /// Number of LSH bands `B`; must divide `num_hashes`.
    pub num_bands: usize,
    /// Largest accepted Hamming distance, inclusive.
    pub hamming_threshold: u32,
    #[serde(default = "default_prime")]
    pub prime: u64,
    /// Fixed seed for the hash family. `None` draws one from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl DedupConfig {
    pub fn validate(&self) -> DedupResult<LshParams> {
        if self.fingerprint_bits == 0 || self.fingerprint_bits > MAX_FINGERPRINT_BITS {
            return Err(DedupError::config(format!(
                "fingerprint_bits must be in 1..={}, got {}",
                MAX_FINGERPRINT_BITS, self.fingerprint_bits
            )));
        }
        if !is_prime(self.prime) {
            return Err(DedupError::config(format!("prime {} is not prime", self.prime)));
        }
        // Feature values run up to N - 1 and must stay below p.
        if self.prime < self.fingerprint_bits as u64 {
            return Err(DedupError::config(format!(
                "prime {} must exceed every bit position of a {}-bit fingerprint",
                self.prime, self.fingerprint_bits
            )));
        }
        LshParams::new(self.num_hashes, self.num_bands)
    }

    /// Rows per band `R = K / B`, once the config is known to be valid.
    pub fn rows_per_band(&self) -> DedupResult<usize> {
        self.validate().map(|params| params.rows_per_band())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        let config: DedupConfig = serde_json::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {0:?}: {1}")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Invalid config JSON in {0:?}: {1}")]
    Parse(PathBuf, #[source] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] DedupError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config() -> DedupConfig {
        DedupConfig {
            fingerprint_bits: 64,
            num_hashes: 100,
            num_bands: 20,
            hamming_threshold: 6,
            prime: DEFAULT_PRIME,
            seed: Some(1),
        }
    }

    #[test]
    fn test_valid_config() {
        let params = config().validate().unwrap();
        assert_eq!(params.num_bands(), 20);
        assert_eq!(config().rows_per_band().unwrap(), 5);
    }

    #[test]
    fn test_rejects_misaligned_bands() {
        let cfg = DedupConfig {
            num_bands: 30,
            ..config()
        };
        assert!(matches!(cfg.validate(), Err(DedupError::Configuration(_))));
    }

    #[test]
    fn test_rejects_bad_width_and_prime() {
        for cfg in [
            DedupConfig {
                fingerprint_bits: 0,
                ..config()
            },
            DedupConfig {
                fingerprint_bits: 128,
                ..config()
            },
            DedupConfig {
                prime: 100,
                ..config()
            },
            DedupConfig {
                prime: 61,
                ..config()
            },
        ] {
            assert!(
                matches!(cfg.validate(), Err(DedupError::Configuration(_))),
                "{cfg:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_load_applies_optional_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"fingerprint_bits": 64, "num_hashes": 40, "num_bands": 8, "hamming_threshold": 4}"#,
        )
        .unwrap();

        let loaded = DedupConfig::load(&path).unwrap();
        assert_eq!(loaded.prime, DEFAULT_PRIME);
        assert_eq!(loaded.seed, None);
        assert_eq!(loaded.rows_per_band().unwrap(), 5);
    }

    #[test]
    fn test_load_rejects_missing_field_and_invalid_values() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.json");
        fs::write(&missing, r#"{"fingerprint_bits": 64, "num_hashes": 40}"#).unwrap();
        assert!(matches!(
            DedupConfig::load(&missing),
            Err(ConfigError::Parse(..))
        ));

        let invalid = temp_dir.path().join("invalid.json");
        fs::write(
            &invalid,
            r#"{"fingerprint_bits": 64, "num_hashes": 40, "num_bands": 7, "hamming_threshold": 4}"#,
        )
        .unwrap();
        assert!(matches!(
            DedupConfig::load(&invalid),
            Err(ConfigError::Invalid(DedupError::Configuration(_)))
        ));
    }

    #[test]
    fn test_serialized_config_loads_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("saved.json");
        fs::write(&path, serde_json::to_string_pretty(&config()).unwrap()).unwrap();
        assert_eq!(DedupConfig::load(&path).unwrap(), config());
    }
}
