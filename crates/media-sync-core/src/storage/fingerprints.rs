use super::settings::{keys, SettingsStore, LIST_SEPARATOR};
use crate::error::Error;
use crate::hasher::Fingerprint;
use crate::index::DuplicateIndex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Loads and saves the accepted-fingerprint list through the settings store.
///
/// The list is stored under `Hashes` as `|`-joined hex digests. When a save
/// fails, the snapshot can be parked in an emergency file whose path is
/// recorded under `EmergencySave`; the next load unions it back in.
pub struct FingerprintStore {
    settings: Arc<dyn SettingsStore>,
}

impl FingerprintStore {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }

    /// Never fails: an absent or corrupt list yields an empty index.
    pub fn load(&self) -> DuplicateIndex {
        let stored = match self.settings.read_setting(keys::HASHES) {
            Ok(Some(value)) => parse_list(&value).unwrap_or_else(|| {
                warn!("Stored fingerprint list is corrupt, starting with an empty index");
                Vec::new()
            }),
            Ok(None) => {
                debug!("No stored fingerprints, first run");
                Vec::new()
            }
            Err(e) => {
                warn!("Could not read stored fingerprints, starting empty: {}", e);
                Vec::new()
            }
        };

        let index = DuplicateIndex::from_fingerprints(stored);

        if let Some(path) = self.emergency_path() {
            match fs::read_to_string(&path).ok().and_then(|text| parse_list(&text)) {
                Some(recovered) => {
                    let before = index.len();
                    recovered.into_iter().for_each(|fp| index.add(fp));
                    info!(
                        "Recovered {} fingerprints from emergency snapshot {}",
                        index.len() - before,
                        path.display()
                    );
                }
                None => warn!("Emergency snapshot {} is unreadable, ignoring", path.display()),
            }
        }

        info!("Loaded {} known fingerprints", index.len());
        index
    }

    /// Rewrite the stored list with the full snapshot. On success any pending
    /// emergency snapshot is retired.
    pub fn save(&self, index: &DuplicateIndex) -> Result<(), Error> {
        let value = format_list(&index.snapshot());
        self.settings
            .write_setting(keys::HASHES, &value)
            .map_err(|e| Error::Persistence(e.to_string()))?;

        if let Some(path) = self.emergency_path() {
            if let Err(e) = fs::remove_file(&path) {
                debug!("Could not remove emergency snapshot {}: {}", path.display(), e);
            }
            if let Err(e) = self.settings.remove_setting(keys::EMERGENCY_SAVE) {
                warn!("Could not clear emergency snapshot setting: {}", e);
            }
        }
        debug!("Persisted {} fingerprints", index.len());
        Ok(())
    }

    /// Park the snapshot in `path` so it survives a failed save.
    pub fn save_emergency(&self, index: &DuplicateIndex, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, format_list(&index.snapshot()))
            .map_err(|e| Error::Persistence(e.to_string()))?;
        if let Err(e) = self
            .settings
            .write_setting(keys::EMERGENCY_SAVE, &path.to_string_lossy())
        {
            warn!("Emergency snapshot written but not recorded: {}", e);
        }
        warn!("Fingerprint snapshot parked in {}", path.display());
        Ok(())
    }

    fn emergency_path(&self) -> Option<PathBuf> {
        self.settings
            .read_setting(keys::EMERGENCY_SAVE)
            .ok()
            .flatten()
            .map(PathBuf::from)
    }
}

pub fn format_list(fingerprints: &[Fingerprint]) -> String {
    fingerprints
        .iter()
        .map(Fingerprint::to_hex)
        .collect::<Vec<_>>()
        .join(&LIST_SEPARATOR.to_string())
}

/// `None` if any entry fails to parse.
pub fn parse_list(value: &str) -> Option<Vec<Fingerprint>> {
    value
        .split(LIST_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<Fingerprint>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemorySettingsStore;
    use tempfile::tempdir;

    fn fp(n: u8) -> Fingerprint {
        Fingerprint::of_bytes(&[n])
    }

    #[test]
    fn test_missing_list_loads_empty() {
        let store = FingerprintStore::new(Arc::new(MemorySettingsStore::new()));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_corrupt_list_loads_empty() {
        let settings = Arc::new(MemorySettingsStore::new());
        settings
            .write_setting(keys::HASHES, &format!("{}|garbage!!", fp(1).to_hex()))
            .unwrap();
        let store = FingerprintStore::new(settings);
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_then_load_preserves_order() {
        let settings = Arc::new(MemorySettingsStore::new());
        let store = FingerprintStore::new(settings);
        let index = DuplicateIndex::from_fingerprints([fp(3), fp(1), fp(2)]);

        store.save(&index).unwrap();
        assert_eq!(store.load().snapshot(), vec![fp(3), fp(1), fp(2)]);
    }

    #[test]
    fn test_emergency_snapshot_is_unioned_then_retired() {
        let tmp = tempdir().unwrap();
        let settings = Arc::new(MemorySettingsStore::new());
        let store = FingerprintStore::new(settings.clone());

        store.save(&DuplicateIndex::from_fingerprints([fp(1)])).unwrap();
        let emergency = tmp.path().join("emergency.txt");
        store
            .save_emergency(&DuplicateIndex::from_fingerprints([fp(1), fp(2)]), &emergency)
            .unwrap();

        let loaded = store.load();
        assert_eq!(loaded.snapshot(), vec![fp(1), fp(2)]);

        store.save(&loaded).unwrap();
        assert!(!emergency.exists());
        assert_eq!(settings.read_setting(keys::EMERGENCY_SAVE).unwrap(), None);
    }
}
