use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DedupError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Fingerprint has no set bits; cannot compute a MinHash signature")]
    EmptyFeatureSet,

    #[error("Duplicate item identifier: {id}")]
    DuplicateIdentifier { id: String },

    #[error("Fingerprint {value:#x} does not fit in {width} bits")]
    FingerprintOverflow { value: u64, width: u32 },

    #[error("Fingerprint width mismatch: expected {expected} bits, found {found}")]
    WidthMismatch { expected: u32, found: u32 },

    #[error("Signature length mismatch: expected {expected}, found {found}")]
    SignatureLength { expected: usize, found: usize },
}

impl DedupError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        DedupError::Configuration(message.into())
    }
}

pub type Result<T> = std::result::Result<T, DedupError>;
