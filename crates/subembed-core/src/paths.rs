//! Path utilities for classifying submitted files by extension and for
//! turning user-supplied names into safe local file names.

use std::path::Path;

/// Video extensions accepted as a session's source.
const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "m4v", "ts", "webm", "mov", "wmv", "flv",
];

/// Subtitle extensions accepted for embedding.
const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "ass", "ssa", "vtt", "sub"];

/// What a submitted document looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Video,
    Subtitle,
    Other,
}

fn extension_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Check if a path has a video file extension.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use subembed_core::paths::is_video_file;
///
/// assert!(is_video_file(Path::new("movie.MKV")));
/// assert!(!is_video_file(Path::new("movie.srt")));
/// ```
pub fn is_video_file(path: &Path) -> bool {
    extension_lower(path)
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Check if a path has a subtitle file extension.
pub fn is_subtitle_file(path: &Path) -> bool {
    extension_lower(path)
        .map(|ext| SUBTITLE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Classify a file name as video, subtitle, or something else.
pub fn classify(path: &Path) -> FileKind {
    if is_video_file(path) {
        FileKind::Video
    } else if is_subtitle_file(path) {
        FileKind::Subtitle
    } else {
        FileKind::Other
    }
}

#[must_use]
pub fn video_extensions() -> &'static [&'static str] {
    VIDEO_EXTENSIONS
}

#[must_use]
pub fn subtitle_extensions() -> &'static [&'static str] {
    SUBTITLE_EXTENSIONS
}

/// Reduce a user-supplied file name to a single safe path component.
///
/// Directory parts are stripped (both `/` and `\` separators), control
/// characters are dropped, and leading dots are removed so the result can
/// never escape or hide inside the session directory. An empty result falls
/// back to `fallback`.
///
/// ```
/// use subembed_core::paths::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name("../../etc/passwd", "file"), "passwd");
/// assert_eq!(sanitize_file_name("C:\\Users\\me\\movie.mkv", "file"), "movie.mkv");
/// assert_eq!(sanitize_file_name("..", "video"), "video");
/// ```
pub fn sanitize_file_name(name: &str, fallback: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let trimmed = cleaned.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}
