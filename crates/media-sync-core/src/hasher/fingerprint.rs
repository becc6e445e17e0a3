use super::cache::MetadataCache;
use crate::error::FileError;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

pub const BUFFER_SIZE: usize = 64 * 1024; // 64KB
pub const FINGERPRINT_LEN: usize = blake3::OUT_LEN;

/// BLAKE3 digest of a file's full contents.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    pub fn from_bytes(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Fingerprint(bytes)
    }

    pub fn of_bytes(data: &[u8]) -> Self {
        Fingerprint(*blake3::hash(data).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }
}

impl FromStr for Fingerprint {
    type Err = blake3::HexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        blake3::Hash::from_hex(s.trim()).map(|h| Fingerprint(*h.as_bytes()))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..16])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreScreen {
    DefinitelyDifferent,
    PossiblyEqual,
}

/// Streams files through BLAKE3 with a fixed buffer, so memory use does not
/// grow with file size.
pub struct FingerprintEngine {
    cache: Arc<MetadataCache>,
    hashes_computed: AtomicU64,
    bytes_hashed: AtomicU64,
}

impl FingerprintEngine {
    pub fn new(cache: Arc<MetadataCache>) -> Self {
        Self {
            cache,
            hashes_computed: AtomicU64::new(0),
            bytes_hashed: AtomicU64::new(0),
        }
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    pub fn compute_fingerprint(&self, path: &Path) -> Result<Fingerprint, FileError> {
        let file = File::open(path).map_err(|e| FileError::read(path, e))?;
        let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut hasher = blake3::Hasher::new();
        let mut total = 0u64;

        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(FileError::read(path, e)),
            };
            hasher.update(&buffer[..read]);
            total += read as u64;
        }

        self.hashes_computed.fetch_add(1, Ordering::Relaxed);
        self.bytes_hashed.fetch_add(total, Ordering::Relaxed);
        trace!("Hashed {} ({} bytes)", path.display(), total);
        Ok(Fingerprint(*hasher.finalize().as_bytes()))
    }

    /// Compare cached sizes. Different sizes can never hash equal, so the
    /// caller may skip fingerprinting; equal sizes still need a full hash.
    pub fn quick_pre_screen(&self, a: &Path, b: &Path) -> Result<PreScreen, FileError> {
        let a = self.cache.get_or_compute(a)?;
        let b = self.cache.get_or_compute(b)?;
        if a.length != b.length {
            Ok(PreScreen::DefinitelyDifferent)
        } else {
            Ok(PreScreen::PossiblyEqual)
        }
    }

    /// Pre-screen, then hash only if sizes match.
    pub fn same_content(&self, a: &Path, b: &Path) -> Result<bool, FileError> {
        match self.quick_pre_screen(a, b)? {
            PreScreen::DefinitelyDifferent => Ok(false),
            PreScreen::PossiblyEqual => {
                Ok(self.compute_fingerprint(a)? == self.compute_fingerprint(b)?)
            }
        }
    }

    pub fn hashes_computed(&self) -> u64 {
        self.hashes_computed.load(Ordering::Relaxed)
    }

    pub fn bytes_hashed(&self) -> u64 {
        self.bytes_hashed.load(Ordering::Relaxed)
    }
}
