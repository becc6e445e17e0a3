pub mod cache;
pub mod fingerprint;

pub use cache::{FileMetadata, MetadataCache};
pub use fingerprint::{Fingerprint, FingerprintEngine, PreScreen, BUFFER_SIZE};
