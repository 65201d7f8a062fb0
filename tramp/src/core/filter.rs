//! Message normalization and ignore-list filtering for observed logs.

use std::sync::LazyLock;

use crate::core::types::Severity;

/// Substrings (case-insensitive) that mark an order-dependent desync report.
pub const DESYNC_MARKERS: &[&str] = &["desync", "out of sync"];

static MARKUP_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"</?(?:b|i|u|color|size|material|quad|sprite|noparse)(?:=[^>]*)?>")
        .unwrap()
});

/// Remove rich-text decoration tags (`<color=#f00>`, `<b>`, ...) from a message.
pub fn strip_markup(message: &str) -> String {
    MARKUP_RE.replace_all(message, "").into_owned()
}

/// True if the message reports a desync that needs the next outcome to diagnose.
pub fn is_desync(message: &str) -> bool {
    let lowered = message.to_lowercase();
    DESYNC_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Severity-specific ignore lists (substring match).
///
/// Exceptions are never filtered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl LogFilter {
    pub fn new(warnings: Vec<String>, errors: Vec<String>) -> Self {
        Self { warnings, errors }
    }

    pub fn is_ignored(&self, severity: Severity, message: &str) -> bool {
        let list = match severity {
            Severity::Warning => &self.warnings,
            Severity::Error => &self.errors,
            Severity::Info | Severity::Exception => return false,
        };
        list.iter()
            .any(|needle| !needle.is_empty() && message.contains(needle.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_rich_text_tags() {
        let raw = "<color=#ff0000><b>Spin failed</b></color> after <i>3</i> tries";
        assert_eq!(strip_markup(raw), "Spin failed after 3 tries");
    }

    #[test]
    fn leaves_comparisons_alone() {
        assert_eq!(strip_markup("balance < 0 and bet > max"), "balance < 0 and bet > max");
    }

    #[test]
    fn detects_desync_markers_case_insensitively() {
        assert!(is_desync("Reel DESYNC detected on stop 3"));
        assert!(is_desync("client out of sync with server"));
        assert!(!is_desync("reel stopped"));
    }

    #[test]
    fn ignore_lists_are_severity_specific() {
        let filter = LogFilter::new(vec!["shader".to_string()], vec!["timeout retry".to_string()]);
        assert!(filter.is_ignored(Severity::Warning, "missing shader variant"));
        assert!(!filter.is_ignored(Severity::Error, "missing shader variant"));
        assert!(filter.is_ignored(Severity::Error, "network timeout retry 2"));
        assert!(!filter.is_ignored(Severity::Exception, "network timeout retry 2"));
    }

    #[test]
    fn empty_needles_never_match() {
        let filter = LogFilter::new(vec![String::new()], Vec::new());
        assert!(!filter.is_ignored(Severity::Warning, "anything"));
    }
}
