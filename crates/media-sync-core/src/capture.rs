use crate::classify::Category;
use crate::planner::local_timestamp;
use chrono::{NaiveDate, NaiveDateTime};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::SystemTime;
use tracing::trace;

/// Date used for a file's folder and name. Images use their EXIF
/// DateTimeOriginal when present; everything else, and images without a
/// usable tag, fall back to the last write time.
pub fn capture_timestamp(path: &Path, category: Category, last_write: SystemTime) -> NaiveDateTime {
    if category == Category::Image {
        if let Some(taken) = date_time_original(path) {
            return taken;
        }
        trace!("No DateTimeOriginal in {}, using mtime", path.display());
    }
    local_timestamp(last_write)
}

/// Reads EXIF tag 36867 (DateTimeOriginal) from the primary image.
pub fn date_time_original(path: &Path) -> Option<NaiveDateTime> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;
    let field = exif.get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY)?;
    let exif::Value::Ascii(ref values) = field.value else {
        return None;
    };
    let raw = values.first()?;
    let dt = exif::DateTime::from_ascii(raw).ok()?;
    NaiveDate::from_ymd_opt(dt.year.into(), dt.month.into(), dt.day.into())?.and_hms_opt(
        dt.hour.into(),
        dt.minute.into(),
        dt.second.into(),
    )
}
