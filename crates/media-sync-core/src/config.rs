use crate::classify::{normalize_extension, Category};
use crate::error::Error;
use config::{Config, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

pub const DEFAULT_PARALLEL_THRESHOLD: usize = 10_000;
pub const DEFAULT_CACHE_CAPACITY: usize = 5_000;
pub const DEFAULT_PROGRESS_BATCH: usize = 10;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: Option<PathBuf>,
    pub destination: Option<PathBuf>,
    /// Where duplicates are moved. Defaults to `<destination>/Rejects`.
    pub reject: Option<PathBuf>,
    pub settings_path: PathBuf,
    pub options: SyncOptions,
    pub parallel_threshold: usize,
    /// Upper bound on worker threads. `None` means one per processor.
    pub max_workers: Option<usize>,
    pub cache_capacity: usize,
    pub progress_batch: usize,
    /// Executable used for perceptual duplicate detection, if installed.
    pub detector_command: Option<PathBuf>,
    /// Arguments placed before the request, e.g. the helper script path.
    pub detector_args: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source: None,
            destination: None,
            reject: None,
            settings_path: PathBuf::from("media_sync_settings.toml"),
            options: SyncOptions::default(),
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            max_workers: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            progress_batch: DEFAULT_PROGRESS_BATCH,
            detector_command: None,
            detector_args: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn reject_dir(&self, destination: &Path) -> PathBuf {
        self.reject
            .clone()
            .unwrap_or_else(|| destination.join("Rejects"))
    }
}

/// Per-run selection of what gets synced. Immutable once a run starts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncOptions {
    pub include_images: bool,
    pub include_videos: bool,
    pub include_music: bool,
    pub include_documents: bool,
    pub custom_extensions: Vec<String>,
    /// Case-insensitive substrings; a file whose stem contains one is skipped.
    pub naming_exclusions: Vec<String>,
    /// Words that, when found in a file's cleaned path, label the destination name.
    pub naming_inclusions: Vec<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            include_images: true,
            include_videos: true,
            include_music: false,
            include_documents: false,
            custom_extensions: Vec::new(),
            naming_exclusions: Vec::new(),
            naming_inclusions: Vec::new(),
        }
    }
}

impl SyncOptions {
    pub fn allows(&self, category: Category) -> bool {
        match category {
            Category::Image => self.include_images,
            Category::Video => self.include_videos,
            Category::Music => self.include_music,
            Category::Document => self.include_documents,
            Category::Custom => true,
        }
    }

    pub fn has_custom_extension(&self, extension: &str) -> bool {
        let extension = normalize_extension(extension);
        self.custom_extensions
            .iter()
            .any(|custom| normalize_extension(custom) == extension)
    }

    pub fn is_excluded(&self, file_stem: &str) -> bool {
        let stem = file_stem.to_lowercase();
        self.naming_exclusions
            .iter()
            .map(|pattern| pattern.trim())
            .filter(|pattern| !pattern.is_empty())
            .any(|pattern| stem.contains(&pattern.to_lowercase()))
    }
}

pub fn load_configuration() -> Result<AppConfig, Error> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("MediaSync").required(false))
        .add_source(
            Environment::with_prefix("MEDIA_SYNC")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    Ok(builder.try_deserialize::<AppConfig>()?)
}

/// Reject empty, relative, and parent-traversing directory paths.
pub fn validate_directory_path(path: &Path) -> Result<(), Error> {
    let invalid = |reason: &str| Error::InvalidPath {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    if path.as_os_str().is_empty() {
        return Err(invalid("path cannot be empty"));
    }
    if !path.is_absolute() {
        return Err(invalid("path must be absolute"));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(invalid("path must not contain '..'"));
    }
    if path.is_file() {
        return Err(invalid("path is a file, not a directory"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_include_images_and_videos_only() {
        let options = SyncOptions::default();
        assert!(options.allows(Category::Image));
        assert!(options.allows(Category::Video));
        assert!(!options.allows(Category::Music));
        assert!(!options.allows(Category::Document));
    }

    #[test]
    fn test_exclusion_is_case_insensitive_substring() {
        let options = SyncOptions {
            naming_exclusions: vec!["Thumb".to_string(), "  ".to_string()],
            ..SyncOptions::default()
        };
        assert!(options.is_excluded("IMG_thumbnail_01"));
        assert!(options.is_excluded("THUMB"));
        assert!(!options.is_excluded("holiday"));
    }

    #[test]
    fn test_custom_extension_ignores_dot_and_case() {
        let options = SyncOptions {
            custom_extensions: vec![".RAW".to_string(), "cr2".to_string()],
            ..SyncOptions::default()
        };
        assert!(options.has_custom_extension("raw"));
        assert!(options.has_custom_extension(".CR2"));
        assert!(!options.has_custom_extension("nef"));
    }

    #[test]
    fn test_validate_directory_path() {
        assert!(validate_directory_path(Path::new("")).is_err());
        assert!(validate_directory_path(Path::new("relative/dir")).is_err());

        let tmp = tempfile::tempdir().unwrap();
        assert!(validate_directory_path(tmp.path()).is_ok());
        assert!(validate_directory_path(&tmp.path().join("..").join("x")).is_err());
        // Not existing yet is fine; the destination gets created on start.
        assert!(validate_directory_path(&tmp.path().join("new")).is_ok());
    }

    #[test]
    fn test_reject_dir_defaults_under_destination() {
        let config = AppConfig::default();
        assert_eq!(
            config.reject_dir(Path::new("/media/out")),
            PathBuf::from("/media/out/Rejects")
        );
    }
}
