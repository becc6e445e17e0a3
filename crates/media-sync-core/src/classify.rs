use serde::{Deserialize, Serialize};
use std::fmt;

pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "bmp", "gif", "tif", "tiff", "webp", "heic", "heif", "avif", "jxl",
];

pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mov", "mp4", "wmv", "avi", "m4v", "mpg", "mpeg", "webm", "mkv", "flv", "ts", "mts", "3gp",
    "3g2", "ogv", "vob",
];

pub const MUSIC_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "aac", "ogg", "wma", "m4a", "opus"];

pub const DOCUMENT_EXTENSIONS: &[&str] =
    &["pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt"];

/// Never synced, whatever the options say (Windows thumbnail caches).
pub const IGNORED_EXTENSIONS: &[&str] = &["db"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Image,
    Video,
    Music,
    Document,
    Custom,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Category::Image => "image",
            Category::Video => "video",
            Category::Music => "music",
            Category::Document => "document",
            Category::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// Lower-case an extension and drop any leading dot.
pub fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_lowercase()
}

/// Map an extension to one of the fixed categories. Unknown extensions yield
/// `None`; custom extensions are resolved by [`classify_with_custom`].
pub fn classify(extension: &str) -> Option<Category> {
    let extension = normalize_extension(extension);
    let ext = extension.as_str();
    if IMAGE_EXTENSIONS.contains(&ext) {
        Some(Category::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        Some(Category::Video)
    } else if MUSIC_EXTENSIONS.contains(&ext) {
        Some(Category::Music)
    } else if DOCUMENT_EXTENSIONS.contains(&ext) {
        Some(Category::Document)
    } else {
        None
    }
}

pub fn classify_with_custom(extension: &str, is_custom: impl Fn(&str) -> bool) -> Option<Category> {
    if is_ignored(extension) {
        return None;
    }
    classify(extension).or_else(|| is_custom(extension).then_some(Category::Custom))
}

pub fn is_ignored(extension: &str) -> bool {
    IGNORED_EXTENSIONS.contains(&normalize_extension(extension).as_str())
}

fn is_known_extension(ext: &str) -> bool {
    classify(ext).is_some()
}

/// Reduce a (relative) path to the words used for destination labels.
///
/// Lower-cases once, then walks the dot-separated segments a single time,
/// dropping every segment that is a known media extension. Digits, dashes,
/// commas and the dots themselves are removed.
pub fn clean_file_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let mut cleaned = String::with_capacity(lowered.len());

    for (i, segment) in lowered.split('.').enumerate() {
        if i > 0 && is_known_extension(segment) {
            continue;
        }
        cleaned.extend(
            segment
                .chars()
                .filter(|c| !c.is_ascii_digit() && !matches!(c, '-' | ',')),
        );
    }
    cleaned
}

/// Split a cleaned name into distinct words, keeping first-seen order.
pub fn name_words(name: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for word in clean_file_name(name)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        if !words.iter().any(|w| w == word) {
            words.push(word.to_string());
        }
    }
    words
}

/// Build the label embedded in a destination name: the words of `name` that
/// appear in `inclusions`, joined by spaces.
pub fn naming_label(name: &str, inclusions: &[String]) -> Option<String> {
    if inclusions.is_empty() {
        return None;
    }
    let wanted: Vec<String> = inclusions.iter().map(|w| w.trim().to_lowercase()).collect();
    let label: Vec<String> = name_words(name)
        .into_iter()
        .filter(|word| wanted.contains(word))
        .collect();
    (!label.is_empty()).then(|| label.join(" "))
}
