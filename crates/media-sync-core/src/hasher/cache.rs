use crate::classify::normalize_extension;
use crate::error::FileError;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tracing::{debug, trace};

/// Cheap-to-recompute file attributes, shared read-only between callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub path: PathBuf,
    pub name: String,
    /// Lower-cased, without the leading dot.
    pub extension: String,
    pub length: u64,
    pub last_write_time: SystemTime,
}

impl FileMetadata {
    pub fn from_path(path: &Path) -> Result<Self, FileError> {
        let metadata = fs::metadata(path).map_err(|e| FileError::read(path, e))?;
        if !metadata.is_file() {
            return Err(FileError::NotFound(path.to_path_buf()));
        }
        let last_write_time = metadata
            .modified()
            .map_err(|e| FileError::read(path, e))?;

        Ok(FileMetadata {
            path: path.to_path_buf(),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            extension: path
                .extension()
                .map(|e| normalize_extension(&e.to_string_lossy()))
                .unwrap_or_default(),
            length: metadata.len(),
            last_write_time,
        })
    }

    pub fn stem(&self) -> &str {
        match self.name.rfind('.') {
            Some(idx) if idx > 0 => &self.name[..idx],
            _ => &self.name,
        }
    }
}

/// Bounded path → metadata cache with insertion-order eviction.
///
/// Lookups go straight to the concurrent map. Inserts take the queue lock so
/// the map and the eviction order never disagree, and the entry count never
/// exceeds `capacity`.
pub struct MetadataCache {
    capacity: usize,
    entries: DashMap<PathBuf, Arc<FileMetadata>>,
    order: Mutex<VecDeque<PathBuf>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MetadataCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get_or_compute(&self, path: &Path) -> Result<Arc<FileMetadata>, FileError> {
        if let Some(entry) = self.entries.get(path) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!("Metadata cache hit for {}", path.display());
            return Ok(Arc::clone(entry.value()));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        // Stat outside the lock; a missing file is reported, never cached.
        let metadata = Arc::new(FileMetadata::from_path(path)?);

        let mut order = self.order.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = self.entries.get(path) {
            // Another worker inserted it while we were stat'ing.
            return Ok(Arc::clone(existing.value()));
        }
        while self.entries.len() >= self.capacity {
            match order.pop_front() {
                Some(oldest) => {
                    if self.entries.remove(&oldest).is_some() {
                        trace!("Evicted {} from metadata cache", oldest.display());
                    }
                }
                None => break,
            }
        }
        self.entries
            .insert(path.to_path_buf(), Arc::clone(&metadata));
        order.push_back(path.to_path_buf());

        Ok(metadata)
    }

    /// Drop the entry for `path` so the next lookup re-stats the file.
    pub fn refresh(&self, path: &Path) {
        let mut order = self.order.lock().unwrap_or_else(|e| e.into_inner());
        if self.entries.remove(path).is_some() {
            order.retain(|p| p != path);
        }
    }

    pub fn clear(&self) {
        let mut order = self.order.lock().unwrap_or_else(|e| e.into_inner());
        self.entries.clear();
        order.clear();
        debug!("Metadata cache cleared");
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
