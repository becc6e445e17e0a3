use crate::classify::{classify_with_custom, Category};
use crate::config::SyncOptions;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A file that passed classification and the naming filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub category: Category,
}

#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub candidates: Vec<Candidate>,
    /// Subtrees that could not be read (permission denied and the like).
    pub skipped_dirs: usize,
    /// Files rejected by category, ignore list or naming exclusion.
    pub filtered_files: usize,
}

/// Walk `root` depth-first in name order and keep eligible files. Symlinks are
/// not followed. Directories listed in `prune` (typically the destination and
/// reject folders when they sit inside the source) are not entered.
pub fn enumerate_files(root: &Path, options: &SyncOptions, prune: &[PathBuf]) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir() && prune.iter().any(|p| entry.path() == p))
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let at = err
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                warn!("Skipping unreadable entry {}: {}", at, err);
                outcome.skipped_dirs += 1;
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        match eligible_category(entry.path(), options) {
            Some(category) => outcome.candidates.push(Candidate {
                path: entry.into_path(),
                category,
            }),
            None => outcome.filtered_files += 1,
        }
    }

    debug!(
        "Enumerated {} candidates under {} ({} filtered, {} unreadable)",
        outcome.candidates.len(),
        root.display(),
        outcome.filtered_files,
        outcome.skipped_dirs
    );
    outcome
}

pub fn eligible_category(path: &Path, options: &SyncOptions) -> Option<Category> {
    let extension = path.extension()?.to_string_lossy();
    let category = classify_with_custom(&extension, |ext| options.has_custom_extension(ext))?;
    if !options.allows(category) {
        return None;
    }
    let stem = path.file_stem()?.to_string_lossy();
    if options.is_excluded(&stem) {
        return None;
    }
    Some(category)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_filters_by_category_and_exclusion() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("a.JPG"), "1").unwrap();
        fs::write(root.join("sub/b.mp4"), "2").unwrap();
        fs::write(root.join("song.mp3"), "3").unwrap();
        fs::write(root.join("Thumbs.db"), "4").unwrap();
        fs::write(root.join("IMG_thumb.png"), "5").unwrap();
        fs::write(root.join("noext"), "6").unwrap();

        let options = SyncOptions {
            naming_exclusions: vec!["THUMB".to_string()],
            ..SyncOptions::default()
        };
        let outcome = enumerate_files(root, &options, &[]);

        let names: Vec<String> = outcome
            .candidates
            .iter()
            .map(|c| c.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.JPG", "b.mp4"]);
        assert_eq!(outcome.candidates[1].category, Category::Video);
        assert_eq!(outcome.filtered_files, 4);
    }

    #[test]
    fn test_pruned_directories_are_not_entered() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();
        let out = root.join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(root.join("keep.png"), "k").unwrap();
        fs::write(out.join("already.png"), "a").unwrap();

        let outcome = enumerate_files(root, &SyncOptions::default(), &[out]);
        assert_eq!(outcome.candidates.len(), 1);
        assert!(outcome.candidates[0].path.ends_with("keep.png"));
    }

    #[test]
    fn test_custom_extensions_are_included() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("shot.cr2"), "raw").unwrap();
        let options = SyncOptions {
            custom_extensions: vec![".cr2".to_string()],
            ..SyncOptions::default()
        };
        let outcome = enumerate_files(tmp.path(), &options, &[]);
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].category, Category::Custom);
    }
}
