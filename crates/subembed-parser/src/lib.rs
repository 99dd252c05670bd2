//! # subembed-parser
//!
//! Pure helpers for subtitle ingestion: inferring a track's language from its
//! file name and checking that a subtitle file is structurally sound.
//!
//! ```
//! use subembed_parser::detect_language;
//!
//! let lang = detect_language("The.Movie.2020.spa.srt", 1);
//! assert_eq!(lang.code, "spa");
//! assert_eq!(lang.display_name, "Spanish");
//! ```

pub mod language;
pub mod subtitle;

pub use language::{detect_language, DetectedLanguage, Language, UNDETERMINED};
pub use subtitle::{decode_text, validate_subtitle, SubtitleInfo};

/// Error type for parsing enum values from strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(pub String);

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "parse error: {}", self.0)
    }
}

impl std::error::Error for ParseError {}
