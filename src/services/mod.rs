pub mod perceptual;
pub mod records;
pub mod report;

pub use perceptual::{
    DEFAULT_HASH_SIZE, DecodeFailure, DirectoryHashes, PerceptualError, PerceptualService,
};
pub use records::RecordError;
pub use report::{DatasetStats, GroupListing, ScanReport};
