use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

use media_sync_core::hasher::Fingerprint;
use media_sync_core::storage::{
    keys, FingerprintStore, MemorySettingsStore, SettingsStore, TomlSettingsStore,
};
use media_sync_core::{AppConfig, Error, RunState, SilentReporter, SyncEngine, SyncOptions};

fn write_images(dir: &Path, count: usize) {
    fs::create_dir_all(dir).unwrap();
    for i in 0..count {
        fs::write(dir.join(format!("IMG_{:04}.jpg", i)), format!("image {}", i)).unwrap();
    }
}

fn sequential_config() -> AppConfig {
    AppConfig {
        max_workers: Some(1),
        ..AppConfig::default()
    }
}

/// Accepts every key except the fingerprint list.
#[derive(Default)]
struct HashesRejectingStore {
    inner: MemorySettingsStore,
}

impl SettingsStore for HashesRejectingStore {
    fn read_setting(&self, key: &str) -> Result<Option<String>, Error> {
        self.inner.read_setting(key)
    }

    fn write_setting(&self, key: &str, value: &str) -> Result<(), Error> {
        if key == keys::HASHES {
            return Err(Error::Settings("disk full".to_string()));
        }
        self.inner.write_setting(key, value)
    }

    fn remove_setting(&self, key: &str) -> Result<(), Error> {
        self.inner.remove_setting(key)
    }
}

#[test]
fn test_corrupt_fingerprint_list_starts_empty() {
    let tmp = tempdir().unwrap();
    let source = tmp.path().join("source");
    let destination = tmp.path().join("dest");
    write_images(&source, 2);

    let settings = Arc::new(MemorySettingsStore::new());
    settings
        .write_setting(keys::HASHES, "not-a-fingerprint|also bad")
        .unwrap();

    let report = SyncEngine::new(sequential_config(), settings.clone())
        .run(&source, &destination, &SyncOptions::default(), &SilentReporter)
        .unwrap();

    assert_eq!(report.statistics.status, RunState::Completed);
    assert_eq!(report.statistics.successful_files, 2);
    assert_eq!(report.known_fingerprints, 2);

    // The bad list is replaced by a clean one.
    let stored = settings.read_setting(keys::HASHES).unwrap().unwrap();
    assert_eq!(stored.split('|').count(), 2);
    for token in stored.split('|') {
        assert!(token.parse::<Fingerprint>().is_ok());
    }
}

#[test]
fn test_corrupt_settings_file_does_not_block_a_run() {
    let tmp = tempdir().unwrap();
    let source = tmp.path().join("source");
    let destination = tmp.path().join("dest");
    let settings_path = tmp.path().join("settings.toml");
    write_images(&source, 1);
    fs::write(&settings_path, "Hashes = [unterminated").unwrap();

    let settings = Arc::new(TomlSettingsStore::open(&settings_path).unwrap());
    let report = SyncEngine::new(sequential_config(), settings)
        .run(&source, &destination, &SyncOptions::default(), &SilentReporter)
        .unwrap();
    assert_eq!(report.statistics.successful_files, 1);

    let reopened = TomlSettingsStore::open(&settings_path).unwrap();
    let stored = FingerprintStore::new(Arc::new(reopened)).load();
    assert_eq!(stored.len(), 1);
}

#[test]
fn test_failed_save_is_a_warning_and_parks_a_snapshot() {
    let tmp = tempdir().unwrap();
    let source = tmp.path().join("source");
    let destination = tmp.path().join("dest");
    write_images(&source, 3);

    let config = AppConfig {
        settings_path: tmp.path().join("state").join("settings.toml"),
        ..sequential_config()
    };
    let emergency = config.settings_path.with_extension("emergency");
    let settings = Arc::new(HashesRejectingStore::default());

    let report = SyncEngine::new(config, settings.clone())
        .run(&source, &destination, &SyncOptions::default(), &SilentReporter)
        .unwrap();

    let stats = &report.statistics;
    assert_eq!(stats.status, RunState::Completed);
    assert_eq!(stats.successful_files, 3);
    assert_eq!(stats.warnings.len(), 1);
    assert!(stats.warnings[0].contains("disk full"));
    assert!(emergency.is_file());
    assert_eq!(
        settings.read_setting(keys::EMERGENCY_SAVE).unwrap(),
        Some(emergency.to_string_lossy().into_owned())
    );

    // A later load recovers the parked fingerprints.
    let recovered = FingerprintStore::new(settings).load();
    assert_eq!(recovered.len(), 3);
}

#[test]
fn test_recovered_snapshot_is_merged_then_retired() {
    let tmp = tempdir().unwrap();
    let source = tmp.path().join("source");
    let destination = tmp.path().join("dest");
    write_images(&source, 2);

    // Park fingerprints of the first image, as a failed earlier run would.
    let parked = Fingerprint::of_bytes(b"image 0");
    let emergency = tmp.path().join("parked.emergency");
    fs::write(&emergency, parked.to_hex()).unwrap();
    let settings = Arc::new(MemorySettingsStore::new());
    settings
        .write_setting(keys::EMERGENCY_SAVE, &emergency.to_string_lossy())
        .unwrap();

    let report = SyncEngine::new(sequential_config(), settings.clone())
        .run(&source, &destination, &SyncOptions::default(), &SilentReporter)
        .unwrap();

    assert_eq!(report.statistics.duplicates_found, 1);
    assert_eq!(report.statistics.successful_files, 1);
    assert_eq!(report.known_fingerprints, 2);
    assert!(!emergency.exists());
    assert_eq!(settings.read_setting(keys::EMERGENCY_SAVE).unwrap(), None);
}
