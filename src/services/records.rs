//! CSV records passed between the stages of a run.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::error::DedupError;
use crate::core::fingerprint::{Fingerprint, FingerprintStore};
use crate::core::group::DuplicateGroup;
use crate::core::lsh::CandidatePair;
use crate::core::verify::VerifiedPair;

const HASH_HEADER: &[&str] = &["filename", "phash_int"];
const CANDIDATE_HEADER: &[&str] = &["image1", "image2"];
const VERIFIED_HEADER: &[&str] = &["image1", "image2", "hamming_distance", "verified"];
const GROUP_HEADER: &[&str] = &["group_id", "duplicate_count", "images"];

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{path:?} has no `{column}` column")]
    MissingColumn { path: PathBuf, column: String },

    #[error("Unknown filename in candidates: {name}")]
    UnknownFilename { name: String },

    #[error(transparent)]
    Fingerprint(#[from] DedupError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashRecord {
    pub filename: String,
    pub phash_int: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub image1: String,
    pub image2: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedRecord {
    pub image1: String,
    pub image2: String,
    pub hamming_distance: u32,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub group_id: String,
    pub duplicate_count: usize,
    pub images: String,
}

impl GroupRecord {
    /// `number` is 1-based.
    pub fn from_group(number: usize, group: &DuplicateGroup<String>) -> Self {
        Self {
            group_id: format!("Group_{}", number),
            duplicate_count: group.len(),
            images: group.members().join("; "),
        }
    }
}

/// `<stem>_<YYYYmmdd_HHMMSS>.<ext>` next to `path`.
pub fn backup_path(path: &Path, timestamp: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "records".to_string());
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, timestamp, ext.to_string_lossy()),
        None => format!("{}_{}", stem, timestamp),
    };
    path.with_file_name(name)
}

/// Create `path`, or a timestamped sibling when the original is locked.
fn create_output(path: &Path) -> Result<(File, PathBuf), RecordError> {
    match File::create(path) {
        Ok(file) => Ok((file, path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            let fallback = backup_path(path, &Local::now().format("%Y%m%d_%H%M%S").to_string());
            log::warn!(
                "Permission denied writing {}, saving to {} instead",
                path.display(),
                fallback.display()
            );
            let file = File::create(&fallback).map_err(|source| RecordError::Io {
                path: fallback.clone(),
                source,
            })?;
            Ok((file, fallback))
        }
        Err(source) => Err(RecordError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Header is always written, even with no rows. Returns the path actually used.
fn write_rows<R>(path: &Path, header: &[&str], rows: R) -> Result<PathBuf, RecordError>
where
    R: IntoIterator,
    R::Item: Serialize,
{
    let (file, written) = create_output(path)?;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    writer.write_record(header)?;
    let mut count = 0usize;
    for row in rows {
        writer.serialize(row)?;
        count += 1;
    }
    writer.flush().map_err(|source| RecordError::Io {
        path: written.clone(),
        source,
    })?;
    log::debug!("Wrote {} rows to {}", count, written.display());
    Ok(written)
}

fn open_reader(path: &Path, columns: &[&str]) -> Result<csv::Reader<File>, RecordError> {
    let file = File::open(path).map_err(|source| RecordError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::Reader::from_reader(file);
    let headers = reader.headers()?.clone();
    for column in columns {
        if !headers.iter().any(|h| h.trim() == *column) {
            return Err(RecordError::MissingColumn {
                path: path.to_path_buf(),
                column: column.to_string(),
            });
        }
    }
    Ok(reader)
}

pub fn write_hashes<'a, I>(path: &Path, hashes: I) -> Result<PathBuf, RecordError>
where
    I: IntoIterator<Item = (&'a String, &'a Fingerprint)>,
{
    let rows = hashes.into_iter().map(|(name, fp)| HashRecord {
        filename: name.clone(),
        phash_int: fp.bits(),
    });
    write_rows(path, HASH_HEADER, rows)
}

/// Load `hashes.csv` into a store of `width`-bit fingerprints.
pub fn read_hashes(path: &Path, width: u32) -> Result<FingerprintStore<String>, RecordError> {
    let mut reader = open_reader(path, HASH_HEADER)?;
    let mut store = FingerprintStore::new(width)?;
    for row in reader.deserialize() {
        let record: HashRecord = row?;
        store.insert(record.filename, Fingerprint::new(record.phash_int, width)?)?;
    }
    log::info!("Loaded {} hashes from {}", store.len(), path.display());
    Ok(store)
}

pub fn write_candidates(
    path: &Path,
    candidates: &[CandidatePair<String>],
) -> Result<PathBuf, RecordError> {
    let rows = candidates.iter().map(|pair| CandidateRecord {
        image1: pair.first().clone(),
        image2: pair.second().clone(),
    });
    write_rows(path, CANDIDATE_HEADER, rows)
}

/// Rows naming the same image twice are dropped; order and duplicates are
/// normalized away.
pub fn read_candidates(path: &Path) -> Result<BTreeSet<CandidatePair<String>>, RecordError> {
    let mut reader = open_reader(path, CANDIDATE_HEADER)?;
    let mut pairs = BTreeSet::new();
    for row in reader.deserialize() {
        let record: CandidateRecord = row?;
        pairs.extend(CandidatePair::new(record.image1, record.image2));
    }
    Ok(pairs)
}

/// Map filename pairs onto store indices. A name missing from the store is
/// an error rather than a silent skip.
pub fn resolve_candidates(
    store: &FingerprintStore<String>,
    pairs: &BTreeSet<CandidatePair<String>>,
) -> Result<BTreeSet<CandidatePair<usize>>, RecordError> {
    let lookup = |name: &String| {
        store
            .position(name)
            .ok_or_else(|| RecordError::UnknownFilename { name: name.clone() })
    };

    let mut resolved = BTreeSet::new();
    for pair in pairs {
        resolved.extend(CandidatePair::new(lookup(pair.first())?, lookup(pair.second())?));
    }
    Ok(resolved)
}

pub fn write_verified(
    path: &Path,
    verified: &[VerifiedPair<String>],
) -> Result<PathBuf, RecordError> {
    let rows = verified.iter().map(|pair| VerifiedRecord {
        image1: pair.first.clone(),
        image2: pair.second.clone(),
        hamming_distance: pair.distance,
        verified: true,
    });
    write_rows(path, VERIFIED_HEADER, rows)
}

pub fn write_groups(
    path: &Path,
    groups: &[DuplicateGroup<String>],
) -> Result<PathBuf, RecordError> {
    let rows = groups
        .iter()
        .enumerate()
        .map(|(i, group)| GroupRecord::from_group(i + 1, group));
    write_rows(path, GROUP_HEADER, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn store() -> FingerprintStore<String> {
        FingerprintStore::from_records(
            8,
            [
                ("a.jpg".to_string(), 0b1111_0000),
                ("b.jpg".to_string(), 0b1111_0001),
                ("c.jpg".to_string(), 0b0000_1111),
            ],
        )
        .unwrap()
    }

    fn pair(a: &str, b: &str) -> CandidatePair<String> {
        CandidatePair::new(a.to_string(), b.to_string()).unwrap()
    }

    #[test]
    fn test_hashes_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("hashes.csv");
        let original = store();

        let written = write_hashes(&path, original.iter()).unwrap();
        assert_eq!(written, path);

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("filename,phash_int\n"));
        assert!(content.contains("b.jpg,241\n"));

        let loaded = read_hashes(&path, 8).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.get(&"c.jpg".to_string()).unwrap().bits(), 0b0000_1111);
    }

    #[test]
    fn test_read_hashes_rejects_wide_value_and_duplicates() {
        let temp_dir = TempDir::new().unwrap();
        let wide = temp_dir.path().join("wide.csv");
        fs::write(&wide, "filename,phash_int\nx.jpg,256\n").unwrap();
        assert!(matches!(
            read_hashes(&wide, 8),
            Err(RecordError::Fingerprint(DedupError::FingerprintOverflow { .. }))
        ));

        let dup = temp_dir.path().join("dup.csv");
        fs::write(&dup, "filename,phash_int\nx.jpg,1\nx.jpg,2\n").unwrap();
        assert!(matches!(
            read_hashes(&dup, 8),
            Err(RecordError::Fingerprint(DedupError::DuplicateIdentifier { .. }))
        ));
    }

    #[test]
    fn test_missing_column() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.csv");
        fs::write(&path, "name,hash\nx.jpg,1\n").unwrap();
        match read_hashes(&path, 8) {
            Err(RecordError::MissingColumn { column, .. }) => assert_eq!(column, "filename"),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn test_candidates_normalized_on_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("candidates.csv");
        fs::write(
            &path,
            "image1,image2\nb.jpg,a.jpg\na.jpg,b.jpg\nc.jpg,c.jpg\nc.jpg,a.jpg\n",
        )
        .unwrap();

        let pairs = read_candidates(&path).unwrap();
        let expected: BTreeSet<_> = [pair("a.jpg", "b.jpg"), pair("a.jpg", "c.jpg")].into();
        assert_eq!(pairs, expected);

        let resolved = resolve_candidates(&store(), &pairs).unwrap();
        let expected: BTreeSet<_> = [
            CandidatePair::new(0, 1).unwrap(),
            CandidatePair::new(0, 2).unwrap(),
        ]
        .into();
        assert_eq!(resolved, expected);
    }

    #[test]
    fn test_resolve_unknown_filename() {
        let pairs: BTreeSet<_> = [pair("a.jpg", "zzz.jpg")].into();
        match resolve_candidates(&store(), &pairs) {
            Err(RecordError::UnknownFilename { name }) => assert_eq!(name, "zzz.jpg"),
            other => panic!("expected UnknownFilename, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_outputs_keep_header() {
        let temp_dir = TempDir::new().unwrap();
        let candidates = temp_dir.path().join("candidates.csv");
        let verified = temp_dir.path().join("verified.csv");
        let groups = temp_dir.path().join("groups.csv");

        write_candidates(&candidates, &[]).unwrap();
        write_verified(&verified, &[]).unwrap();
        write_groups(&groups, &[]).unwrap();

        assert_eq!(fs::read_to_string(&candidates).unwrap(), "image1,image2\n");
        assert_eq!(
            fs::read_to_string(&verified).unwrap(),
            "image1,image2,hamming_distance,verified\n"
        );
        assert_eq!(
            fs::read_to_string(&groups).unwrap(),
            "group_id,duplicate_count,images\n"
        );
    }

    #[test]
    fn test_verified_and_group_rows() {
        let temp_dir = TempDir::new().unwrap();
        let verified_path = temp_dir.path().join("verified.csv");
        let groups_path = temp_dir.path().join("groups.csv");

        let verified = vec![VerifiedPair {
            first: "a.jpg".to_string(),
            second: "b.jpg".to_string(),
            distance: 1,
        }];
        write_verified(&verified_path, &verified).unwrap();
        assert_eq!(
            fs::read_to_string(&verified_path).unwrap(),
            "image1,image2,hamming_distance,verified\na.jpg,b.jpg,1,true\n"
        );

        let groups = crate::core::group::build_groups(&verified);
        write_groups(&groups_path, &groups).unwrap();
        assert_eq!(
            fs::read_to_string(&groups_path).unwrap(),
            "group_id,duplicate_count,images\nGroup_1,2,a.jpg; b.jpg\n"
        );
    }

    #[test]
    fn test_backup_path_naming() {
        assert_eq!(
            backup_path(Path::new("/out/duplicate_groups.csv"), "20240102_030405"),
            PathBuf::from("/out/duplicate_groups_20240102_030405.csv")
        );
        assert_eq!(
            backup_path(Path::new("report"), "20240102_030405"),
            PathBuf::from("report_20240102_030405")
        );
    }

    #[test]
    fn test_unwritable_directory_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing_dir").join("out.csv");
        assert!(matches!(
            write_candidates(&path, &[]),
            Err(RecordError::Io { .. })
        ));
    }
}
