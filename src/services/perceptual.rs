use image::ImageReader;
use image_hasher::{HashAlg, Hasher, HasherConfig, ImageHash};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use walkdir::WalkDir;

use crate::core::error::DedupError;
use crate::core::fingerprint::{Fingerprint, FingerprintStore, MAX_FINGERPRINT_BITS};

/// Default pHash side length (8x8 = 64 bits).
pub const DEFAULT_HASH_SIZE: u32 = 8;

#[derive(Debug, Error)]
pub enum PerceptualError {
    #[error("Invalid path: {path}")]
    InvalidPath { path: String },

    #[error("Hash size {size} gives more than {max} bits", max = MAX_FINGERPRINT_BITS)]
    InvalidHashSize { size: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Fingerprint error: {0}")]
    Fingerprint(#[from] DedupError),
}

/// Image that produced a fingerprint. `name` is the path relative to the
/// scanned directory and serves as the item identifier.
#[derive(Debug, Clone)]
pub struct HashedImage {
    pub name: String,
    pub fingerprint: Fingerprint,
}

/// Image file that was found but could not be decoded or hashed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodeFailure {
    pub name: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct DirectoryHashes {
    pub images: Vec<HashedImage>,
    pub failures: Vec<DecodeFailure>,
}

impl DirectoryHashes {
    /// Every image file found, decodable or not.
    pub fn files_found(&self) -> usize {
        self.images.len() + self.failures.len()
    }

    /// Split into the fingerprint store and the files that did not hash.
    pub fn into_parts(
        self,
        width: u32,
    ) -> Result<(FingerprintStore<String>, Vec<DecodeFailure>), DedupError> {
        let mut store = FingerprintStore::new(width)?;
        for image in self.images {
            store.insert(image.name, image.fingerprint)?;
        }
        Ok((store, self.failures))
    }
}

/// Computes DCT mean hashes (pHash) of images as fixed-width fingerprints.
pub struct PerceptualService {
    hash_size: u32,
    hasher: Hasher,
    supported_formats: HashSet<&'static str>,
}

impl PerceptualService {
    pub fn new(hash_size: u32) -> Result<Self, PerceptualError> {
        if hash_size == 0 || hash_size * hash_size > MAX_FINGERPRINT_BITS {
            return Err(PerceptualError::InvalidHashSize { size: hash_size });
        }

        let hasher = HasherConfig::new()
            .hash_size(hash_size, hash_size)
            .hash_alg(HashAlg::Mean)
            .preproc_dct()
            .to_hasher();

        Ok(Self {
            hash_size,
            hasher,
            supported_formats: ["jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp"]
                .into_iter()
                .collect(),
        })
    }

    /// Fingerprint width in bits.
    pub fn fingerprint_bits(&self) -> u32 {
        self.hash_size * self.hash_size
    }

    pub fn is_supported_format(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.supported_formats.contains(ext.to_lowercase().as_str()))
    }

    pub fn compute_fingerprint(&self, path: &Path) -> Result<Fingerprint, PerceptualError> {
        let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
        let hash = self.hasher.hash_image(&img);
        Ok(Fingerprint::new(hash_bits(&hash), self.fingerprint_bits())?)
    }

    /// Recursively walk `dir`, returning supported image paths in sorted order.
    pub fn scan_directory(&self, dir: &Path) -> Result<Vec<PathBuf>, PerceptualError> {
        if !dir.is_dir() {
            return Err(PerceptualError::InvalidPath {
                path: dir.to_string_lossy().to_string(),
            });
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(progress_style("{spinner:.green} {msg}"));
        spinner.set_message("Scanning for images…");
        spinner.enable_steady_tick(Duration::from_millis(100));

        let mut images = Vec::new();
        for entry in WalkDir::new(dir).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry under {}: {}", dir.display(), e);
                    continue;
                }
            };
            let path = entry.path();
            if path.is_file() && self.is_supported_format(path) {
                images.push(path.to_path_buf());
            }
            spinner.tick();
        }
        images.sort();

        spinner.finish_with_message(format!("Found {} images", images.len()));
        Ok(images)
    }

    /// Fingerprint every image under `dir` in parallel. Undecodable files are
    /// logged and listed in `failures`; they never abort the scan.
    pub fn hash_directory(&self, dir: &Path) -> Result<DirectoryHashes, PerceptualError> {
        let paths = self.scan_directory(dir)?;

        let progress = ProgressBar::new(paths.len() as u64);
        progress.set_style(progress_style("{bar:40.cyan/blue} {pos}/{len} {msg}"));
        progress.set_message("hashing");

        let results: Vec<_> = paths
            .par_iter()
            .map(|path| {
                let result = self.compute_fingerprint(path);
                progress.inc(1);
                (path, result)
            })
            .collect();
        progress.finish_and_clear();

        let mut hashes = DirectoryHashes::default();
        for (path, result) in results {
            match result {
                Ok(fingerprint) => hashes.images.push(HashedImage {
                    name: relative_name(dir, path),
                    fingerprint,
                }),
                Err(e) => {
                    log::warn!("Error on {}: {}", path.display(), e);
                    hashes.failures.push(DecodeFailure {
                        name: relative_name(dir, path),
                        error: e.to_string(),
                    });
                }
            }
        }

        log::info!(
            "Hashed {} images in {} ({} failed)",
            hashes.images.len(),
            dir.display(),
            hashes.failures.len()
        );
        Ok(hashes)
    }
}

fn progress_style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Hash bytes are packed least-significant bit first, so bit `k` of the hash
/// becomes bit `k` of the integer.
fn hash_bits(hash: &ImageHash) -> u64 {
    hash.as_bytes()
        .iter()
        .take(8)
        .enumerate()
        .fold(0u64, |acc, (i, byte)| acc | (u64::from(*byte) << (8 * i)))
}

fn relative_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_image(
        path: &Path,
        width: u32,
        height: u32,
        shift: u32,
    ) -> Result<(), Box<dyn std::error::Error>> {
        use image::{ImageBuffer, Rgb};

        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let intensity = (((x + shift) * 7 + y * 3) % 256) as u8;
            Rgb([intensity, intensity / 2, 255 - intensity])
        });

        img.save(path)?;
        Ok(())
    }

    #[test]
    fn test_rejects_oversized_hash() {
        assert!(matches!(
            PerceptualService::new(9),
            Err(PerceptualError::InvalidHashSize { size: 9 })
        ));
        assert!(matches!(
            PerceptualService::new(0),
            Err(PerceptualError::InvalidHashSize { size: 0 })
        ));
        assert_eq!(PerceptualService::new(8).unwrap().fingerprint_bits(), 64);
        assert_eq!(PerceptualService::new(4).unwrap().fingerprint_bits(), 16);
    }

    #[test]
    fn test_supported_format_detection() {
        let service = PerceptualService::new(DEFAULT_HASH_SIZE).unwrap();
        assert!(service.is_supported_format(Path::new("a.jpg")));
        assert!(service.is_supported_format(Path::new("a.PNG")));
        assert!(!service.is_supported_format(Path::new("a.txt")));
        assert!(!service.is_supported_format(Path::new("noext")));
    }

    #[test]
    fn test_identical_images_same_fingerprint() {
        let temp_dir = TempDir::new().unwrap();
        let file1 = temp_dir.path().join("one.png");
        let file2 = temp_dir.path().join("two.png");
        create_test_image(&file1, 64, 64, 0).unwrap();
        create_test_image(&file2, 64, 64, 0).unwrap();

        let service = PerceptualService::new(DEFAULT_HASH_SIZE).unwrap();
        let fp1 = service.compute_fingerprint(&file1).unwrap();
        let fp2 = service.compute_fingerprint(&file2).unwrap();

        assert_eq!(fp1.width(), 64);
        assert_eq!(fp1.hamming_distance(&fp2), 0);
    }

    #[test]
    fn test_small_hash_fits_width() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("small.png");
        create_test_image(&file, 32, 32, 3).unwrap();

        let service = PerceptualService::new(3).unwrap();
        let fp = service.compute_fingerprint(&file).unwrap();
        assert_eq!(fp.width(), 9);
        assert!(fp.bits() < 1 << 9);
    }

    #[test]
    fn test_invalid_directory() {
        let service = PerceptualService::new(DEFAULT_HASH_SIZE).unwrap();
        let result = service.scan_directory(Path::new("/definitely/not/here"));
        assert!(matches!(result, Err(PerceptualError::InvalidPath { .. })));
    }

    #[test]
    fn test_hash_directory_skips_corrupt_files() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("nested")).unwrap();
        create_test_image(&temp_dir.path().join("b.png"), 48, 48, 0).unwrap();
        create_test_image(&temp_dir.path().join("nested/a.png"), 48, 48, 5).unwrap();
        fs::write(temp_dir.path().join("broken.jpg"), b"not an image").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), b"ignored").unwrap();

        let service = PerceptualService::new(DEFAULT_HASH_SIZE).unwrap();
        let hashes = service.hash_directory(temp_dir.path()).unwrap();

        let names: Vec<_> = hashes.images.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["b.png", "nested/a.png"]);
        assert_eq!(hashes.failures.len(), 1);
        assert_eq!(hashes.failures[0].name, "broken.jpg");
        assert_eq!(hashes.files_found(), 3);

        let (store, failures) = hashes.into_parts(service.fingerprint_bits()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(failures.len(), 1);
        assert!(store.get(&"b.png".to_string()).is_some());
    }

    #[test]
    fn test_scan_report_counts_undecodable_files() {
        use crate::config::DedupConfig;
        use crate::core::minhash::DEFAULT_PRIME;
        use crate::core::pipeline::DedupPipeline;
        use crate::services::report::ScanReport;

        let temp_dir = TempDir::new().unwrap();
        create_test_image(&temp_dir.path().join("a.png"), 48, 48, 0).unwrap();
        create_test_image(&temp_dir.path().join("b.png"), 48, 48, 0).unwrap();
        fs::write(temp_dir.path().join("c.jpg"), b"truncated").unwrap();
        fs::write(temp_dir.path().join("d.jpg"), b"truncated").unwrap();

        let service = PerceptualService::new(DEFAULT_HASH_SIZE).unwrap();
        let hashes = service.hash_directory(temp_dir.path()).unwrap();
        assert_eq!(hashes.files_found(), 4);
        let (store, failures) = hashes.into_parts(service.fingerprint_bits()).unwrap();

        let pipeline = DedupPipeline::new(DedupConfig {
            fingerprint_bits: service.fingerprint_bits(),
            num_hashes: 100,
            num_bands: 20,
            hamming_threshold: 6,
            prime: DEFAULT_PRIME,
            seed: Some(1),
        })
        .unwrap();
        let outcome = pipeline.run(&store).unwrap();
        let report = ScanReport::new(&pipeline, store.len(), outcome, failures);

        assert_eq!(report.stats.total_items, 4);
        assert_eq!(report.stats.items_with_duplicates, 2);
        assert_eq!(report.stats.unique_items, 3);
        assert!((report.stats.duplicate_rate - 50.0).abs() < 1e-9);
        let names: Vec<_> = report.decode_failures.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["c.jpg", "d.jpg"]);
    }
}
