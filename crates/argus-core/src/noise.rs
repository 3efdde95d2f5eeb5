//! Noise filtering for diff hunks.
//!
//! Page furniture churns without meaning: copyright years tick over,
//! "Last updated" stamps move on every deploy. A changed line is noise when
//! nothing meaningful remains after the configured patterns are removed.
//! The filter is a strategy seam so pattern sets can evolve without touching
//! the detector's comparison logic.

use regex::Regex;

use crate::error::MonitorError;

/// Judges whether a single changed line is page-furniture noise.
pub trait NoiseFilter: Send + Sync {
    fn is_noise(&self, line: &str) -> bool;
}

/// Regex-list noise filter.
///
/// A line is noise when stripping every pattern match leaves only
/// whitespace. The default set covers the usual volatile furniture: bare
/// years, copyright notices, update stamps, and numeric dates.
#[derive(Debug)]
pub struct PatternNoiseFilter {
    patterns: Vec<Regex>,
}

impl PatternNoiseFilter {
    /// Build a filter from raw pattern strings.
    pub fn new<I, S>(patterns: I) -> Result<Self, MonitorError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                Regex::new(p.as_ref())
                    .map_err(|e| MonitorError::Config(format!("invalid noise pattern: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Default pattern set for regulatory documentation pages.
    pub fn default_patterns() -> Vec<&'static str> {
        vec![
            r"\d{4}",                    // years
            r"(?i)copyright.*\d{4}",     // copyright notices
            r"(?i)last updated:.*",      // update stamps
            r"(?i)updated on:.*",        // update stamps
            r"\d{1,2}/\d{1,2}/\d{2,4}",  // numeric dates
            r"\d{1,2}-\d{1,2}-\d{2,4}",  // numeric dates
        ]
    }
}

impl Default for PatternNoiseFilter {
    fn default() -> Self {
        // The built-in patterns are known-valid.
        Self::new(Self::default_patterns()).expect("default noise patterns must compile")
    }
}

impl NoiseFilter for PatternNoiseFilter {
    fn is_noise(&self, line: &str) -> bool {
        let mut remainder = line.to_string();
        for pattern in &self.patterns {
            remainder = pattern.replace_all(&remainder, "").into_owned();
        }
        remainder.trim().is_empty()
    }
}

/// A filter that treats nothing as noise. Useful for tests and for sources
/// where every edit matters.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepAllFilter;

impl NoiseFilter for KeepAllFilter {
    fn is_noise(&self, _line: &str) -> bool {
        false
    }
}
