pub mod fingerprints;
pub mod settings;

pub use fingerprints::FingerprintStore;
pub use settings::{keys, MemorySettingsStore, SettingsStore, TomlSettingsStore};
