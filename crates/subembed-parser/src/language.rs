//! Language model and file-name language detection for subtitle tracks.

use serde::{Deserialize, Serialize};

use crate::ParseError;

/// Language of a subtitle track.
///
/// Covers the languages commonly found as tags in subtitle file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    English,
    French,
    German,
    Spanish,
    Italian,
    Portuguese,
    Russian,
    Japanese,
    Korean,
    Chinese,
    Arabic,
    Hindi,
    Turkish,
    Polish,
    Dutch,
    Swedish,
    Norwegian,
    Danish,
    Finnish,
    Czech,
    Hungarian,
    Romanian,
    Bulgarian,
    Greek,
    Hebrew,
    Thai,
    Vietnamese,
    Indonesian,
    Malay,
    Filipino,
    Ukrainian,
    Croatian,
    Serbian,
    Slovenian,
    Slovak,
    Lithuanian,
    Latvian,
    Estonian,
    Bengali,
    Tamil,
    Telugu,
    Punjabi,
    Marathi,
    Gujarati,
    Kannada,
    Malayalam,
    Persian,
    Urdu,
    Swahili,
    Latin,
    Catalan,
}

impl Language {
    /// ISO 639-2/B three-letter code, the form Matroska and MP4 muxers expect.
    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "eng",
            Language::French => "fre",
            Language::German => "ger",
            Language::Spanish => "spa",
            Language::Italian => "ita",
            Language::Portuguese => "por",
            Language::Russian => "rus",
            Language::Japanese => "jpn",
            Language::Korean => "kor",
            Language::Chinese => "chi",
            Language::Arabic => "ara",
            Language::Hindi => "hin",
            Language::Turkish => "tur",
            Language::Polish => "pol",
            Language::Dutch => "dut",
            Language::Swedish => "swe",
            Language::Norwegian => "nor",
            Language::Danish => "dan",
            Language::Finnish => "fin",
            Language::Czech => "cze",
            Language::Hungarian => "hun",
            Language::Romanian => "rum",
            Language::Bulgarian => "bul",
            Language::Greek => "gre",
            Language::Hebrew => "heb",
            Language::Thai => "tha",
            Language::Vietnamese => "vie",
            Language::Indonesian => "ind",
            Language::Malay => "may",
            Language::Filipino => "fil",
            Language::Ukrainian => "ukr",
            Language::Croatian => "hrv",
            Language::Serbian => "srp",
            Language::Slovenian => "slv",
            Language::Slovak => "slo",
            Language::Lithuanian => "lit",
            Language::Latvian => "lav",
            Language::Estonian => "est",
            Language::Bengali => "ben",
            Language::Tamil => "tam",
            Language::Telugu => "tel",
            Language::Punjabi => "pan",
            Language::Marathi => "mar",
            Language::Gujarati => "guj",
            Language::Kannada => "kan",
            Language::Malayalam => "mal",
            Language::Persian => "per",
            Language::Urdu => "urd",
            Language::Swahili => "swa",
            Language::Latin => "lat",
            Language::Catalan => "cat",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Language::English => "English",
            Language::French => "French",
            Language::German => "German",
            Language::Spanish => "Spanish",
            Language::Italian => "Italian",
            Language::Portuguese => "Portuguese",
            Language::Russian => "Russian",
            Language::Japanese => "Japanese",
            Language::Korean => "Korean",
            Language::Chinese => "Chinese",
            Language::Arabic => "Arabic",
            Language::Hindi => "Hindi",
            Language::Turkish => "Turkish",
            Language::Polish => "Polish",
            Language::Dutch => "Dutch",
            Language::Swedish => "Swedish",
            Language::Norwegian => "Norwegian",
            Language::Danish => "Danish",
            Language::Finnish => "Finnish",
            Language::Czech => "Czech",
            Language::Hungarian => "Hungarian",
            Language::Romanian => "Romanian",
            Language::Bulgarian => "Bulgarian",
            Language::Greek => "Greek",
            Language::Hebrew => "Hebrew",
            Language::Thai => "Thai",
            Language::Vietnamese => "Vietnamese",
            Language::Indonesian => "Indonesian",
            Language::Malay => "Malay",
            Language::Filipino => "Filipino",
            Language::Ukrainian => "Ukrainian",
            Language::Croatian => "Croatian",
            Language::Serbian => "Serbian",
            Language::Slovenian => "Slovenian",
            Language::Slovak => "Slovak",
            Language::Lithuanian => "Lithuanian",
            Language::Latvian => "Latvian",
            Language::Estonian => "Estonian",
            Language::Bengali => "Bengali",
            Language::Tamil => "Tamil",
            Language::Telugu => "Telugu",
            Language::Punjabi => "Punjabi",
            Language::Marathi => "Marathi",
            Language::Gujarati => "Gujarati",
            Language::Kannada => "Kannada",
            Language::Malayalam => "Malayalam",
            Language::Persian => "Persian",
            Language::Urdu => "Urdu",
            Language::Swahili => "Swahili",
            Language::Latin => "Latin",
            Language::Catalan => "Catalan",
        };
        f.write_str(name)
    }
}

/// Every alias (ISO 639-1, 639-2/B, 639-2/T, English name) in lowercase.
static ALIASES: phf::Map<&'static str, Language> = phf::phf_map! {
    "english" => Language::English, "en" => Language::English, "eng" => Language::English,
    "french" => Language::French, "fr" => Language::French, "fra" => Language::French, "fre" => Language::French,
    "german" => Language::German, "de" => Language::German, "deu" => Language::German, "ger" => Language::German,
    "spanish" => Language::Spanish, "es" => Language::Spanish, "spa" => Language::Spanish, "esp" => Language::Spanish,
    "italian" => Language::Italian, "it" => Language::Italian, "ita" => Language::Italian,
    "portuguese" => Language::Portuguese, "pt" => Language::Portuguese, "por" => Language::Portuguese,
    "russian" => Language::Russian, "ru" => Language::Russian, "rus" => Language::Russian,
    "japanese" => Language::Japanese, "ja" => Language::Japanese, "jpn" => Language::Japanese, "jap" => Language::Japanese,
    "korean" => Language::Korean, "ko" => Language::Korean, "kor" => Language::Korean,
    "chinese" => Language::Chinese, "zh" => Language::Chinese, "zho" => Language::Chinese, "chi" => Language::Chinese,
    "arabic" => Language::Arabic, "ar" => Language::Arabic, "ara" => Language::Arabic,
    "hindi" => Language::Hindi, "hi" => Language::Hindi, "hin" => Language::Hindi,
    "turkish" => Language::Turkish, "tr" => Language::Turkish, "tur" => Language::Turkish,
    "polish" => Language::Polish, "pl" => Language::Polish, "pol" => Language::Polish,
    "dutch" => Language::Dutch, "nl" => Language::Dutch, "nld" => Language::Dutch, "dut" => Language::Dutch,
    "swedish" => Language::Swedish, "sv" => Language::Swedish, "swe" => Language::Swedish,
    "norwegian" => Language::Norwegian, "no" => Language::Norwegian, "nor" => Language::Norwegian,
    "danish" => Language::Danish, "da" => Language::Danish, "dan" => Language::Danish,
    "finnish" => Language::Finnish, "fi" => Language::Finnish, "fin" => Language::Finnish,
    "czech" => Language::Czech, "cs" => Language::Czech, "ces" => Language::Czech, "cze" => Language::Czech,
    "hungarian" => Language::Hungarian, "hu" => Language::Hungarian, "hun" => Language::Hungarian,
    "romanian" => Language::Romanian, "ro" => Language::Romanian, "ron" => Language::Romanian, "rum" => Language::Romanian,
    "bulgarian" => Language::Bulgarian, "bg" => Language::Bulgarian, "bul" => Language::Bulgarian,
    "greek" => Language::Greek, "el" => Language::Greek, "ell" => Language::Greek, "gre" => Language::Greek,
    "hebrew" => Language::Hebrew, "he" => Language::Hebrew, "heb" => Language::Hebrew,
    "thai" => Language::Thai, "th" => Language::Thai, "tha" => Language::Thai,
    "vietnamese" => Language::Vietnamese, "vi" => Language::Vietnamese, "vie" => Language::Vietnamese,
    "indonesian" => Language::Indonesian, "id" => Language::Indonesian, "ind" => Language::Indonesian,
    "malay" => Language::Malay, "ms" => Language::Malay, "msa" => Language::Malay, "may" => Language::Malay,
    "filipino" => Language::Filipino, "fil" => Language::Filipino, "tl" => Language::Filipino, "tgl" => Language::Filipino,
    "ukrainian" => Language::Ukrainian, "uk" => Language::Ukrainian, "ukr" => Language::Ukrainian,
    "croatian" => Language::Croatian, "hr" => Language::Croatian, "hrv" => Language::Croatian,
    "serbian" => Language::Serbian, "sr" => Language::Serbian, "srp" => Language::Serbian,
    "slovenian" => Language::Slovenian, "sl" => Language::Slovenian, "slv" => Language::Slovenian,
    "slovak" => Language::Slovak, "sk" => Language::Slovak, "slk" => Language::Slovak, "slo" => Language::Slovak,
    "lithuanian" => Language::Lithuanian, "lt" => Language::Lithuanian, "lit" => Language::Lithuanian,
    "latvian" => Language::Latvian, "lv" => Language::Latvian, "lav" => Language::Latvian,
    "estonian" => Language::Estonian, "et" => Language::Estonian, "est" => Language::Estonian,
    "bengali" => Language::Bengali, "bn" => Language::Bengali, "ben" => Language::Bengali,
    "tamil" => Language::Tamil, "ta" => Language::Tamil, "tam" => Language::Tamil,
    "telugu" => Language::Telugu, "te" => Language::Telugu, "tel" => Language::Telugu,
    "punjabi" => Language::Punjabi, "pa" => Language::Punjabi, "pan" => Language::Punjabi,
    "marathi" => Language::Marathi, "mr" => Language::Marathi, "mar" => Language::Marathi,
    "gujarati" => Language::Gujarati, "gu" => Language::Gujarati, "guj" => Language::Gujarati,
    "kannada" => Language::Kannada, "kn" => Language::Kannada, "kan" => Language::Kannada,
    "malayalam" => Language::Malayalam, "ml" => Language::Malayalam, "mal" => Language::Malayalam,
    "persian" => Language::Persian, "fa" => Language::Persian, "fas" => Language::Persian, "per" => Language::Persian, "farsi" => Language::Persian,
    "urdu" => Language::Urdu, "ur" => Language::Urdu, "urd" => Language::Urdu,
    "swahili" => Language::Swahili, "sw" => Language::Swahili, "swa" => Language::Swahili,
    "latin" => Language::Latin, "la" => Language::Latin, "lat" => Language::Latin,
    "catalan" => Language::Catalan, "ca" => Language::Catalan, "cat" => Language::Catalan,
};

/// Aliases that are also ordinary words in file names. These only count as
/// a language tag when they sit right before the extension.
const AMBIGUOUS: &[&str] = &[
    "it", "no", "to", "he", "hi", "id", "la", "de", "el", "pa", "ta", "may", "per", "lit", "dan",
    "ben", "mar", "tam", "pan", "est", "fin", "cat", "ca",
];

impl std::str::FromStr for Language {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALIASES
            .get(s.to_lowercase().as_str())
            .copied()
            .ok_or_else(|| ParseError(format!("invalid language: {}", s)))
    }
}

/// Code used when no language could be inferred.
pub const UNDETERMINED: &str = "und";

/// Result of inferring a subtitle's language from its file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedLanguage {
    /// ISO 639-2/B code, or `und`.
    pub code: String,
    /// Track title shown by players.
    pub display_name: String,
    /// The recognised language, if any.
    pub language: Option<Language>,
}

impl DetectedLanguage {
    pub fn is_undetermined(&self) -> bool {
        self.language.is_none()
    }
}

fn is_separator(c: char) -> bool {
    matches!(c, '.' | '_' | '-' | '[' | ']' | '(' | ')') || c.is_whitespace()
}

/// Infer the language of a subtitle from its file name.
///
/// The name is split into tokens on `.`, `_`, `-`, brackets and whitespace
/// after dropping the extension. Tokens are looked up case-insensitively and
/// the rightmost recognised one wins. Without a match the code is `und` and
/// the display name is `Track {submission_index}`.
///
/// ```
/// use subembed_parser::detect_language;
///
/// let lang = detect_language("movie.eng.srt", 1);
/// assert_eq!(lang.code, "eng");
/// assert_eq!(lang.display_name, "English");
///
/// let unknown = detect_language("subs.srt", 3);
/// assert_eq!(unknown.code, "und");
/// assert_eq!(unknown.display_name, "Track 3");
/// ```
pub fn detect_language(file_name: &str, submission_index: u32) -> DetectedLanguage {
    let stem = match file_name.rfind('.') {
        Some(pos) if pos > 0 => &file_name[..pos],
        _ => file_name,
    };

    let tokens: Vec<&str> = stem.split(is_separator).filter(|t| !t.is_empty()).collect();

    let found = tokens.iter().enumerate().rev().find_map(|(i, token)| {
        let lower = token.to_lowercase();
        let language = ALIASES.get(lower.as_str())?;
        let adjacent = i + 1 == tokens.len();
        if AMBIGUOUS.contains(&lower.as_str()) && !adjacent {
            return None;
        }
        Some(*language)
    });

    match found {
        Some(language) => DetectedLanguage {
            code: language.code().to_string(),
            display_name: language.to_string(),
            language: Some(language),
        },
        None => DetectedLanguage {
            code: UNDETERMINED.to_string(),
            display_name: format!("Track {submission_index}"),
            language: None,
        },
    }
}
