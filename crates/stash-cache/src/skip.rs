//! Commit message marker that skips a restore.

use regex::Regex;
use std::sync::LazyLock;

/// "cache skip" or "skip cache" in any case. Bare words need whitespace
/// between them; inside brackets they may also be written as one word.
static SKIP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[(?:cache\s*skip|skip\s*cache)\]|(?:cache\s+skip|skip\s+cache)").unwrap()
});

/// Marker found in `message`, if the restore should be skipped.
pub fn skip_marker(message: &str) -> Option<&str> {
    SKIP_PATTERN.find(message).map(|m| m.as_str())
}

/// Whether `message` asks to skip the restore.
pub fn should_skip(message: &str) -> bool {
    skip_marker(message).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bracketed_marker() {
        assert_eq!(skip_marker("please [cache skip] this run"), Some("[cache skip]"));
        assert!(should_skip("fix build [SKIP  CACHE]"));
    }

    #[test]
    fn test_bracketed_compact_marker() {
        assert_eq!(skip_marker("fix deps [cacheskip]"), Some("[cacheskip]"));
        assert!(should_skip("[SKIPCACHE] bump lockfile"));
        assert!(should_skip("[Cache Skip]"));
    }

    #[test]
    fn test_bare_marker_any_case() {
        assert_eq!(skip_marker("SKIP CACHE now"), Some("SKIP CACHE"));
        assert!(should_skip("Cache\tSkip"));
    }

    #[test]
    fn test_bare_words_must_be_separated() {
        assert!(!should_skip("cacheskip"));
        assert!(!should_skip("skipcache"));
        assert!(!should_skip("[cacheskip"));
        assert!(!should_skip("update cache keys"));
        assert!(!should_skip(""));
    }
}
