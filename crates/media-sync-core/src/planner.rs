use crate::classify::Category;
use crate::error::FileError;
use chrono::{DateTime, Datelike, Local, NaiveDateTime, Timelike};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, trace, warn};

const MIN_SEQUENCE_WIDTH: usize = 3;
const MAX_SEQUENCE_WIDTH: usize = 9;

/// Local wall-clock time of a file timestamp, used for folder and name dates.
pub fn local_timestamp(time: SystemTime) -> NaiveDateTime {
    DateTime::<Local>::from(time).naive_local()
}

/// Zero-pad width for sequence numbers in a run of `total` files: the digit
/// count of `total`, kept between 3 and 9.
pub fn sequence_width(total: usize) -> usize {
    let digits = total.max(1).to_string().len();
    digits.clamp(MIN_SEQUENCE_WIDTH, MAX_SEQUENCE_WIDTH)
}

/// Lays out `root/YYYY/YYYY MM/` (plus `YYYY MM Movies/` for videos) and
/// builds `YYYY-MM-DD[ label] NNN.ext` names.
#[derive(Debug, Clone)]
pub struct PathPlanner {
    root: PathBuf,
    total_files: usize,
}

impl PathPlanner {
    pub fn new(root: impl Into<PathBuf>, total_files: usize) -> Self {
        Self {
            root: root.into(),
            total_files,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn month_dir(&self, timestamp: &NaiveDateTime) -> PathBuf {
        let (year, month) = (timestamp.year(), timestamp.month());
        self.root
            .join(format!("{:04}", year))
            .join(format!("{:04} {:02}", year, month))
    }

    pub fn target_dir(&self, category: Category, timestamp: &NaiveDateTime) -> PathBuf {
        let month_dir = self.month_dir(timestamp);
        match category {
            Category::Video => month_dir.join(format!(
                "{:04} {:02} Movies",
                timestamp.year(),
                timestamp.month()
            )),
            _ => month_dir,
        }
    }

    pub fn file_name(
        &self,
        timestamp: &NaiveDateTime,
        sequence: usize,
        extension: &str,
        label: Option<&str>,
    ) -> String {
        let width = sequence_width(self.total_files);
        let label = label
            .filter(|l| !l.trim().is_empty())
            .map(|l| format!(" {}", l.trim()))
            .unwrap_or_default();
        let extension = extension.trim_start_matches('.');
        let ext = if extension.is_empty() {
            String::new()
        } else {
            format!(".{}", extension)
        };
        format!(
            "{}{} {:0width$}{}",
            timestamp.format("%Y-%m-%d"),
            label,
            sequence,
            ext,
            width = width
        )
    }

    pub fn plan_destination(
        &self,
        category: Category,
        timestamp: &NaiveDateTime,
        sequence: usize,
        extension: &str,
    ) -> PathBuf {
        self.plan_labeled(category, timestamp, sequence, extension, None)
    }

    pub fn plan_labeled(
        &self,
        category: Category,
        timestamp: &NaiveDateTime,
        sequence: usize,
        extension: &str,
        label: Option<&str>,
    ) -> PathBuf {
        self.target_dir(category, timestamp)
            .join(self.file_name(timestamp, sequence, extension, label))
    }

    /// Create year, year-month, Favs and Movies folders. Safe to call from
    /// several workers at once; an existing folder counts as success.
    pub fn ensure_folders(&self, timestamp: &NaiveDateTime) -> io::Result<()> {
        let month_dir = self.month_dir(timestamp);
        let prefix = format!("{:04} {:02}", timestamp.year(), timestamp.month());
        for dir in [
            month_dir.join(format!("{} Favs", prefix)),
            month_dir.join(format!("{} Movies", prefix)),
        ] {
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Move `source` to `planned`. If the name is taken, the timestamp's
    /// seconds are spliced in before the extension and the move is retried
    /// once. Returns the final destination.
    pub fn place(
        &self,
        source: &Path,
        planned: &Path,
        timestamp: &NaiveDateTime,
    ) -> Result<PathBuf, FileError> {
        let target = if planned.exists() {
            let alternate = disambiguate(planned, timestamp.second());
            debug!(
                "{} exists, trying {}",
                planned.display(),
                alternate.display()
            );
            if alternate.exists() {
                return Err(FileError::MoveCollision(alternate));
            }
            alternate
        } else {
            planned.to_path_buf()
        };
        move_file(source, &target)?;
        Ok(target)
    }
}

/// `name.ext` → `name-<seconds>.ext`.
pub fn disambiguate(path: &Path, seconds: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}-{}.{}", stem, seconds, ext.to_string_lossy()),
        None => format!("{}-{}", stem, seconds),
    };
    path.with_file_name(name)
}

/// Move a duplicate into `reject_dir` under its original name, numbering it
/// `name (n).ext` if that name is taken.
pub fn place_reject(source: &Path, reject_dir: &Path) -> Result<PathBuf, FileError> {
    fs::create_dir_all(reject_dir).map_err(|e| FileError::Move {
        from: source.to_path_buf(),
        to: reject_dir.to_path_buf(),
        source: e,
    })?;
    let name = source
        .file_name()
        .ok_or_else(|| FileError::NotFound(source.to_path_buf()))?;
    let mut target = reject_dir.join(name);
    let mut n = 1;
    while target.exists() {
        let candidate = Path::new(name);
        let stem = candidate
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let numbered = match candidate.extension() {
            Some(ext) => format!("{} ({}).{}", stem, n, ext.to_string_lossy()),
            None => format!("{} ({})", stem, n),
        };
        target = reject_dir.join(numbered);
        n += 1;
    }
    move_file(source, &target)?;
    Ok(target)
}

/// Rename in place. Only a cross-device rename falls back to copy then
/// delete; if the source cannot be deleted the copy is removed again, so a
/// failed move leaves nothing at `to`.
pub fn move_file(from: &Path, to: &Path) -> Result<(), FileError> {
    let move_err = |e: io::Error| FileError::Move {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source: e,
    };

    match fs::rename(from, to) {
        Ok(()) => {
            trace!("Moved {} -> {}", from.display(), to.display());
            Ok(())
        }
        Err(_) if !from.exists() => Err(FileError::NotFound(from.to_path_buf())),
        Err(rename_err) if is_cross_device(&rename_err) => {
            debug!(
                "{} is on another device, copying to {}",
                from.display(),
                to.display()
            );
            copy_then_remove(from, to).map_err(move_err)
        }
        Err(rename_err) => Err(move_err(rename_err)),
    }
}

pub(crate) fn is_cross_device(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::CrossesDevices
}

fn copy_then_remove(from: &Path, to: &Path) -> io::Result<()> {
    if let Err(copy_err) = fs::copy(from, to) {
        let _ = fs::remove_file(to);
        return Err(copy_err);
    }
    if let Err(remove_err) = fs::remove_file(from) {
        if let Err(e) = fs::remove_file(to) {
            warn!("Could not remove partial copy {}: {}", to.display(), e);
        }
        return Err(remove_err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 7, 4)
            .unwrap()
            .and_hms_opt(13, 45, 9)
            .unwrap()
    }

    #[test]
    fn test_sequence_width_tracks_total() {
        assert_eq!(sequence_width(7), 3);
        assert_eq!(sequence_width(150), 3);
        assert_eq!(sequence_width(1_500), 4);
        assert_eq!(sequence_width(123_456), 6);
        assert_eq!(sequence_width(usize::MAX), 9);
    }

    #[test]
    fn test_image_and_video_layout() {
        let planner = PathPlanner::new("/dest", 7);
        assert_eq!(
            planner.plan_destination(Category::Image, &ts(), 1, "jpg"),
            PathBuf::from("/dest/2021/2021 07/2021-07-04 001.jpg")
        );
        assert_eq!(
            planner.plan_destination(Category::Video, &ts(), 12, ".mp4"),
            PathBuf::from("/dest/2021/2021 07/2021 07 Movies/2021-07-04 012.mp4")
        );
    }

    #[test]
    fn test_planning_is_deterministic() {
        let planner = PathPlanner::new("/dest", 150);
        let a = planner.plan_destination(Category::Image, &ts(), 42, "png");
        let b = planner.plan_destination(Category::Image, &ts(), 42, "png");
        assert_eq!(a, b);
        assert!(a.to_string_lossy().ends_with("2021-07-04 042.png"));

        let wide = PathPlanner::new("/dest", 12_000);
        assert!(wide
            .plan_destination(Category::Image, &ts(), 42, "png")
            .to_string_lossy()
            .ends_with("2021-07-04 00042.png"));
    }

    #[test]
    fn test_label_is_embedded() {
        let planner = PathPlanner::new("/dest", 3);
        assert_eq!(
            planner.file_name(&ts(), 2, "jpg", Some("beach paris")),
            "2021-07-04 beach paris 002.jpg"
        );
    }

    #[test]
    fn test_collision_splices_seconds() {
        let tmp = tempdir().unwrap();
        let planner = PathPlanner::new(tmp.path(), 5);
        planner.ensure_folders(&ts()).unwrap();

        let planned = planner.plan_destination(Category::Image, &ts(), 1, "jpg");
        fs::write(&planned, "already here").unwrap();

        let source = tmp.path().join("incoming.jpg");
        fs::write(&source, "new").unwrap();
        let placed = planner.place(&source, &planned, &ts()).unwrap();

        assert_eq!(placed.file_name().unwrap(), "2021-07-04 001-9.jpg");
        assert_eq!(fs::read_to_string(&planned).unwrap(), "already here");
        assert_eq!(fs::read_to_string(&placed).unwrap(), "new");
        assert!(!source.exists());

        // Both names taken: the retry is spent and the file stays put.
        let again = tmp.path().join("again.jpg");
        fs::write(&again, "third").unwrap();
        let err = planner.place(&again, &planned, &ts()).unwrap_err();
        assert!(matches!(err, FileError::MoveCollision(_)));
        assert!(again.exists());
    }

    #[test]
    fn test_ensure_folders_is_idempotent() {
        let tmp = tempdir().unwrap();
        let planner = PathPlanner::new(tmp.path(), 1);
        planner.ensure_folders(&ts()).unwrap();
        planner.ensure_folders(&ts()).unwrap();

        let month = tmp.path().join("2021").join("2021 07");
        assert!(month.join("2021 07 Favs").is_dir());
        assert!(month.join("2021 07 Movies").is_dir());
    }

    #[test]
    fn test_rejects_are_numbered_not_overwritten() {
        let tmp = tempdir().unwrap();
        let rejects = tmp.path().join("rejects");
        for content in ["one", "two"] {
            let src = tmp.path().join("IMG_1.jpg");
            fs::write(&src, content).unwrap();
            place_reject(&src, &rejects).unwrap();
        }
        assert_eq!(fs::read_to_string(rejects.join("IMG_1.jpg")).unwrap(), "one");
        assert_eq!(fs::read_to_string(rejects.join("IMG_1 (1).jpg")).unwrap(), "two");
    }

    #[test]
    fn test_only_cross_device_errors_fall_back_to_copy() {
        assert!(is_cross_device(&io::Error::from(io::ErrorKind::CrossesDevices)));
        assert!(!is_cross_device(&io::Error::from(io::ErrorKind::PermissionDenied)));
        #[cfg(target_os = "linux")]
        assert!(is_cross_device(&io::Error::from_raw_os_error(18)));
    }

    /// A read-only folder whose files cannot be renamed or deleted. `None`
    /// when permissions are not enforced (running as root).
    #[cfg(unix)]
    fn locked_dir(root: &Path) -> Option<PathBuf> {
        use std::os::unix::fs::PermissionsExt;
        let dir = root.join("locked");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("IMG_1.jpg"), "pinned").unwrap();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o555)).unwrap();
        if fs::write(dir.join("write-check"), "").is_ok() {
            return None;
        }
        Some(dir)
    }

    #[cfg(unix)]
    fn unlock(dir: &Path) {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_rename_leaves_no_copy() {
        let tmp = tempdir().unwrap();
        let Some(locked) = locked_dir(tmp.path()) else {
            return;
        };
        let from = locked.join("IMG_1.jpg");
        let to = tmp.path().join("out.jpg");

        let err = move_file(&from, &to).unwrap_err();
        unlock(&locked);

        assert!(matches!(err, FileError::Move { .. }));
        assert!(from.exists());
        assert!(!to.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_is_removed_when_source_cannot_be_deleted() {
        let tmp = tempdir().unwrap();
        let Some(locked) = locked_dir(tmp.path()) else {
            return;
        };
        let from = locked.join("IMG_1.jpg");
        let to = tmp.path().join("out.jpg");

        let result = copy_then_remove(&from, &to);
        unlock(&locked);

        assert!(result.is_err());
        assert!(from.exists());
        assert!(!to.exists());
    }
}
