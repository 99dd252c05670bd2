//! Caption rendering for delivered files.
//!
//! User templates may reference `{file_name}` and `{file_size}`; unknown
//! placeholders are left untouched. Substituted values are never scanned
//! again, so a file name containing `{file_size}` stays literal.

/// Variable substitution context for caption templates.
///
/// # Example
///
/// ```
/// use subembed::caption::CaptionContext;
///
/// let ctx = CaptionContext::for_delivery("movie.mkv", 5 * 1024 * 1024);
/// assert_eq!(ctx.substitute("{file_name} ({file_size})"), "movie.mkv (5.00 MB)");
/// ```
#[derive(Debug, Clone, Default)]
pub struct CaptionContext {
    vars: Vec<(String, String)>,
}

impl CaptionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context carrying `{file_name}` and `{file_size}`.
    pub fn for_delivery(file_name: &str, size: u64) -> Self {
        Self::new()
            .with_var("file_name", file_name)
            .with_var("file_size", &format_megabytes(size))
    }

    /// Set `key`, replacing an earlier value.
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        match self.vars.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.vars.push((key.to_string(), value.to_string())),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Substitute `{varname}` occurrences in one left-to-right pass.
    pub fn substitute(&self, template: &str) -> String {
        let mut result = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            result.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let value = after
                .find('}')
                .and_then(|close| self.get(&after[..close]).map(|v| (close, v)));
            match value {
                Some((close, v)) => {
                    result.push_str(v);
                    rest = &after[close + 1..];
                }
                None => {
                    result.push('{');
                    rest = after;
                }
            }
        }
        result.push_str(rest);
        result
    }
}

/// `size` in mebibytes with two decimals, e.g. `"12.50 MB"`.
pub fn format_megabytes(size: u64) -> String {
    format!("{:.2} MB", size as f64 / (1024.0 * 1024.0))
}

/// Caption for a finished file: the user's template when set, otherwise a
/// summary of the embedded tracks.
pub fn render_caption(template: Option<&str>, file_name: &str, size: u64, tracks: usize) -> String {
    match template {
        Some(t) => CaptionContext::for_delivery(file_name, size).substitute(t),
        None => format!(
            "Processed successfully!\n\nSubtitles: {tracks} track(s) embedded\nSize: {}\nFile: {file_name}",
            format_megabytes(size)
        ),
    }
}
