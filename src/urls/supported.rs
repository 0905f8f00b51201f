//! Media-type pattern to URL regex matching.

use std::collections::BTreeMap;

use regex::Regex;

/// Declarative map from media-type patterns to URL regexes.
///
/// Keys are media types (`application/pdf`), prefix wildcards (`image/*`)
/// or catch-alls (`*`, `*/*`).
#[derive(Debug, Clone, Default)]
pub struct SupportedUrls {
    patterns: BTreeMap<String, Vec<Regex>>,
}

impl SupportedUrls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add regexes for a media-type pattern.
    #[must_use]
    pub fn with(mut self, media_type: impl Into<String>, regexes: impl IntoIterator<Item = Regex>) -> Self {
        self.insert(media_type, regexes);
        self
    }

    pub fn insert(&mut self, media_type: impl Into<String>, regexes: impl IntoIterator<Item = Regex>) {
        self.patterns
            .entry(media_type.into().to_lowercase())
            .or_default()
            .extend(regexes);
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> impl Iterator<Item = (&str, &[Regex])> {
        self.patterns.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Whether the vendor can fetch `url` for a file of `media_type` itself.
    pub fn is_supported(&self, media_type: &str, url: &str) -> bool {
        is_url_supported(media_type, url, self)
    }
}

/// Whether `url` is natively supported for `media_type`.
///
/// Both inputs are compared lower-cased. A pattern of `*` or `*/*` applies
/// to every media type; any other pattern applies to media types starting
/// with the pattern minus its `*`. The URL is supported when any regex of
/// any applicable pattern matches it.
pub fn is_url_supported(media_type: &str, url: &str, supported: &SupportedUrls) -> bool {
    let url = url.to_lowercase();
    let media_type = media_type.to_lowercase();

    supported
        .patterns
        .iter()
        .filter(|(pattern, _)| {
            let prefix = if pattern.as_str() == "*" || pattern.as_str() == "*/*" {
                String::new()
            } else {
                pattern.replacen('*', "", 1)
            };
            media_type.starts_with(&prefix)
        })
        .flat_map(|(_, regexes)| regexes.iter())
        .any(|regex| regex.is_match(&url))
}
