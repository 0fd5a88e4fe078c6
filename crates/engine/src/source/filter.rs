//! Pre-parse line filter built on the ripgrep matcher engine.
//!
//! Applied to raw lines before format matching, so excluded traffic
//! never pays the template-match cost.

use std::sync::atomic::{AtomicU64, Ordering};

use grep_matcher::Matcher;
use grep_regex::{RegexMatcher, RegexMatcherBuilder};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid pre-filter pattern: {0}")]
    InvalidRegex(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Keep lines matching the pattern.
    Include,
    /// Keep lines NOT matching the pattern.
    Exclude,
}

pub struct LineFilter {
    matcher: RegexMatcher,
    mode: FilterMode,
    scanned: AtomicU64,
    passed: AtomicU64,
}

impl LineFilter {
    pub fn new(pattern: &str, mode: FilterMode) -> Result<Self, FilterError> {
        let matcher = RegexMatcherBuilder::new()
            .multi_line(false)
            .build(pattern)
            .map_err(|e| FilterError::InvalidRegex(e.to_string()))?;
        Ok(Self {
            matcher,
            mode,
            scanned: AtomicU64::new(0),
            passed: AtomicU64::new(0),
        })
    }

    /// Whether the line passes the filter; updates scan counters.
    #[inline]
    pub fn matches(&self, line: &str) -> bool {
        self.scanned.fetch_add(1, Ordering::Relaxed);

        let hit = self.matcher.is_match(line.as_bytes()).unwrap_or(false);
        let keep = match self.mode {
            FilterMode::Include => hit,
            FilterMode::Exclude => !hit,
        };
        if keep {
            self.passed.fetch_add(1, Ordering::Relaxed);
        }
        keep
    }

    /// `(lines scanned, lines passed)` since construction.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.scanned.load(Ordering::Relaxed),
            self.passed.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_include_mode() {
        let filter = LineFilter::new("POST", FilterMode::Include).expect("valid pattern");
        assert!(filter.matches("10.0.0.1 - - \"POST /api HTTP/1.1\" 200 12"));
        assert!(!filter.matches("10.0.0.1 - - \"GET /index HTTP/1.1\" 200 12"));
    }

    #[test]
    fn test_exclude_mode() {
        let filter = LineFilter::new("/healthz", FilterMode::Exclude).expect("valid pattern");
        assert!(!filter.matches("10.0.0.1 - - \"GET /healthz HTTP/1.1\" 200 2"));
        assert!(filter.matches("10.0.0.1 - - \"GET /app HTTP/1.1\" 200 2"));
    }

    #[test]
    fn test_regex_pattern() {
        let filter = LineFilter::new(r#"" (4|5)\d\d "#, FilterMode::Include).expect("valid pattern");
        assert!(filter.matches("1.2.3.4 - - \"GET /x HTTP/1.1\" 404 0 \"-\" \"-\""));
        assert!(!filter.matches("1.2.3.4 - - \"GET /x HTTP/1.1\" 200 0 \"-\" \"-\""));
    }

    #[test]
    fn test_stats_tracking() {
        let filter = LineFilter::new("keep", FilterMode::Include).expect("valid pattern");
        filter.matches("keep me");
        filter.matches("drop me");
        filter.matches("keep me too");

        let (scanned, passed) = filter.stats();
        assert_eq!(scanned, 3);
        assert_eq!(passed, 2);
    }

    #[test]
    fn test_invalid_pattern_is_setup_error() {
        assert!(LineFilter::new("[unclosed", FilterMode::Include).is_err());
    }
}
