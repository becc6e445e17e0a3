use crate::error::Error;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

pub mod keys {
    pub const HASHES: &str = "Hashes";
    pub const NAMING_LIST: &str = "NamingList";
    pub const NAMING_INCLUDE: &str = "NamingInclude";
    pub const EMERGENCY_SAVE: &str = "EmergencySave";
    pub const SOURCE_FOLDER: &str = "SourceFolder";
    pub const DESTINATION_FOLDER: &str = "DestinationFolder";
    pub const REJECT_FOLDER: &str = "RejectFolder";
}

/// Separator for list-valued settings.
pub const LIST_SEPARATOR: char = '|';

/// Flat string key/value settings owned by the host application.
pub trait SettingsStore: Send + Sync {
    /// `None` when the key is absent or empty.
    fn read_setting(&self, key: &str) -> Result<Option<String>, Error>;
    fn write_setting(&self, key: &str, value: &str) -> Result<(), Error>;
    fn remove_setting(&self, key: &str) -> Result<(), Error>;

    fn read_list(&self, key: &str) -> Result<Vec<String>, Error> {
        Ok(self
            .read_setting(key)?
            .map(|value| split_list(&value))
            .unwrap_or_default())
    }

    fn write_list(&self, key: &str, values: &[String]) -> Result<(), Error> {
        self.write_setting(key, &join_list(values))
    }
}

pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(LIST_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub fn join_list(values: &[String]) -> String {
    values.join(&LIST_SEPARATOR.to_string())
}

/// Settings kept as a TOML table on disk. Every write rewrites the file via a
/// temporary sibling and a rename.
pub struct TomlSettingsStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl TomlSettingsStore {
    /// Open `path`. A missing file starts empty; an unreadable one is logged
    /// and also starts empty so a damaged settings file never blocks a run.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(text) => match toml::from_str::<BTreeMap<String, String>>(&text) {
                Ok(values) => values,
                Err(e) => {
                    warn!("Settings file {} is corrupt, starting empty: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No settings file at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(Error::Io(e)),
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &BTreeMap<String, String>) -> Result<(), Error> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let text = toml::to_string(values)?;
        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SettingsStore for TomlSettingsStore {
    fn read_setting(&self, key: &str) -> Result<Option<String>, Error> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).filter(|v| !v.is_empty()).cloned())
    }

    fn write_setting(&self, key: &str, value: &str) -> Result<(), Error> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        self.flush(&values)
    }

    fn remove_setting(&self, key: &str) -> Result<(), Error> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        if values.remove(key).is_some() {
            self.flush(&values)?;
        }
        Ok(())
    }
}

/// In-process settings, for tests and embedding hosts.
#[derive(Default)]
pub struct MemorySettingsStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn read_setting(&self, key: &str) -> Result<Option<String>, Error> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).filter(|v| !v.is_empty()).cloned())
    }

    fn write_setting(&self, key: &str, value: &str) -> Result<(), Error> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_setting(&self, key: &str) -> Result<(), Error> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_toml_store_persists_between_opens() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("settings.toml");

        let store = TomlSettingsStore::open(&path).unwrap();
        assert_eq!(store.read_setting(keys::SOURCE_FOLDER).unwrap(), None);
        store.write_setting(keys::SOURCE_FOLDER, "/photos/in").unwrap();
        store
            .write_list(keys::NAMING_LIST, &["thumb".to_string(), "copy".to_string()])
            .unwrap();

        let reopened = TomlSettingsStore::open(&path).unwrap();
        assert_eq!(
            reopened.read_setting(keys::SOURCE_FOLDER).unwrap().as_deref(),
            Some("/photos/in")
        );
        assert_eq!(reopened.read_list(keys::NAMING_LIST).unwrap(), vec!["thumb", "copy"]);
    }

    #[test]
    fn test_corrupt_toml_starts_empty() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("settings.toml");
        fs::write(&path, "this is = = not toml [[[").unwrap();

        let store = TomlSettingsStore::open(&path).unwrap();
        assert_eq!(store.read_setting(keys::HASHES).unwrap(), None);
    }

    #[test]
    fn test_empty_values_read_as_absent() {
        let store = MemorySettingsStore::new();
        store.write_setting(keys::REJECT_FOLDER, "").unwrap();
        assert_eq!(store.read_setting(keys::REJECT_FOLDER).unwrap(), None);
        assert!(store.read_list(keys::NAMING_LIST).unwrap().is_empty());
    }

    #[test]
    fn test_split_list_drops_blank_entries() {
        assert_eq!(split_list("a| |b||"), vec!["a", "b"]);
    }
}
