//! Structural validation of submitted subtitle files.
//!
//! Validation happens at submission time so a malformed file is rejected
//! before it can break a mux job. The checks are shallow: they confirm the
//! file looks like its declared format and carries at least one cue.

use std::borrow::Cow;

use regex::Regex;
use serde::{Deserialize, Serialize};
use subembed_core::{Error, Result, SubtitleFormat};

macro_rules! regex {
    ($re:literal $(,)?) => {{
        static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| Regex::new($re).expect("static regex"))
    }};
}

/// Summary of an accepted subtitle file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleInfo {
    pub format: SubtitleFormat,
    /// Number of cues (or dialogue lines) found.
    pub cue_count: usize,
    /// Whether invalid UTF-8 had to be replaced while reading.
    pub lossy: bool,
}

/// Decode subtitle bytes, dropping a UTF-8 BOM and replacing invalid
/// sequences. The flag reports whether any replacement happened.
pub fn decode_text(bytes: &[u8]) -> (Cow<'_, str>, bool) {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let text = String::from_utf8_lossy(bytes);
    let lossy = matches!(text, Cow::Owned(_));
    (text, lossy)
}

/// Check that `bytes` is a usable subtitle of the given format.
///
/// `file_name` is only used to label the error.
pub fn validate_subtitle(
    file_name: &str,
    format: SubtitleFormat,
    bytes: &[u8],
) -> Result<SubtitleInfo> {
    let (text, lossy) = decode_text(bytes);
    if lossy {
        tracing::warn!(file = file_name, "subtitle is not valid UTF-8; decoded lossily");
    }

    if text.trim().is_empty() {
        return Err(Error::ingestion(file_name, "the subtitle file is empty"));
    }

    let cue_count = match format {
        SubtitleFormat::Srt => count_srt_cues(&text),
        SubtitleFormat::Vtt => {
            if !text.trim_start().starts_with("WEBVTT") {
                return Err(Error::ingestion(
                    file_name,
                    "WebVTT files must start with a WEBVTT header",
                ));
            }
            count_vtt_cues(&text)
        }
        SubtitleFormat::Ass | SubtitleFormat::Ssa => {
            let has_section = regex!(r"(?im)^\s*\[(script info|events)\]").is_match(&text);
            if !has_section {
                return Err(Error::ingestion(
                    file_name,
                    "no [Script Info] or [Events] section found",
                ));
            }
            count_ass_dialogue(&text)
        }
        SubtitleFormat::MicroDvd => count_microdvd_lines(&text),
    };

    if cue_count == 0 {
        return Err(Error::ingestion(
            file_name,
            format!("no {format} cues found"),
        ));
    }

    Ok(SubtitleInfo {
        format,
        cue_count,
        lossy,
    })
}

fn count_srt_cues(text: &str) -> usize {
    regex!(r"(?m)^\s*\d{1,2}:\d{2}:\d{2}[,.]\d{1,3}\s*-->\s*\d{1,2}:\d{2}:\d{2}[,.]\d{1,3}")
        .find_iter(text)
        .count()
}

fn count_vtt_cues(text: &str) -> usize {
    regex!(r"(?m)^\s*(?:\d{1,2}:)?\d{2}:\d{2}\.\d{3}\s+-->\s+(?:\d{1,2}:)?\d{2}:\d{2}\.\d{3}")
        .find_iter(text)
        .count()
}

fn count_ass_dialogue(text: &str) -> usize {
    regex!(r"(?mi)^\s*dialogue\s*:").find_iter(text).count()
}

fn count_microdvd_lines(text: &str) -> usize {
    regex!(r"(?m)^\s*\{\d+\}\{\d*\}").find_iter(text).count()
}
