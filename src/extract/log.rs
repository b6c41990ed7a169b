//! Simulator error-log scanner.
//!
//! Severity markers look like `   ** Warning ** ...`, `   ** Severe  ** ...`
//! and `   **  Fatal  ** ...`; a failed run also ends with
//! `EnergyPlus Terminated--Fatal Error Detected`. Continuation lines
//! (`**   ~~~   **`) are ignored.

use std::fs;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::artifacts::{ArtifactKind, ArtifactSet};
use crate::config::DiagnosticsPolicy;
use crate::error::ExtractError;

static FATAL_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\*\*\s*Fatal\s*\*\*|Terminated--Fatal").expect("fatal marker regex")
});

static WARNING_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\*\*\s*(Warning|Severe)\s*\*\*").expect("warning marker regex")
});

/// What the error log says about the run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogOutcome {
    /// Lines carrying a fatal marker.
    pub fatal_errors: Vec<String>,
    /// Lines carrying a warning or severe marker (bounded).
    pub warnings: Vec<String>,
    /// Warning/severe lines seen in total, including those not kept.
    pub warning_count: usize,
    /// Leading slice of the raw log, bounded by character count.
    pub raw_excerpt: String,
}

impl LogOutcome {
    pub fn has_fatal(&self) -> bool {
        !self.fatal_errors.is_empty()
    }
}

/// Scans the run's error log for severity markers.
#[derive(Debug, Clone)]
pub struct LogExtractor {
    excerpt_chars: usize,
    max_warnings: usize,
}

impl LogExtractor {
    pub fn new(policy: &DiagnosticsPolicy) -> Self {
        Self {
            excerpt_chars: policy.log_excerpt_chars,
            max_warnings: policy.max_log_warnings,
        }
    }

    /// Reads the first error log of the run, if any.
    ///
    /// # Errors
    ///
    /// Returns an `ExtractError` if the log exists but cannot be read.
    pub fn scan(&self, artifacts: &ArtifactSet) -> Result<LogOutcome, ExtractError> {
        let Some(artifact) = artifacts.first_of_kind(ArtifactKind::ErrorLog) else {
            return Ok(LogOutcome::default());
        };
        let bytes = fs::read(&artifact.path).map_err(|e| ExtractError::io(&artifact.path, e))?;
        let text = String::from_utf8_lossy(&bytes);
        let outcome = self.scan_text(&text);
        debug!(
            file = %artifact.file_name(),
            fatal = outcome.fatal_errors.len(),
            warnings = outcome.warning_count,
            "scanned error log"
        );
        Ok(outcome)
    }

    /// Scans log text already in memory.
    pub fn scan_text(&self, text: &str) -> LogOutcome {
        let mut outcome = LogOutcome {
            raw_excerpt: text.chars().take(self.excerpt_chars).collect(),
            ..LogOutcome::default()
        };

        for line in text.lines() {
            let line = line.trim();
            if FATAL_MARKER.is_match(line) {
                outcome.fatal_errors.push(line.to_string());
            } else if WARNING_MARKER.is_match(line) {
                outcome.warning_count += 1;
                if outcome.warnings.len() < self.max_warnings {
                    outcome.warnings.push(line.to_string());
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN_LOG: &str = "\
Program Version,EnergyPlus, Version 9.6.0
   ** Warning ** GetHTSurfaceData: Surfaces with interface to Ground found
   **   ~~~   ** Please review the Ground Temperatures
   ** Severe  ** CheckUsedConstructions: There are 2 nominally unused constructions
   ************* EnergyPlus Completed Successfully-- 1 Warning; 1 Severe Errors
";

    const FATAL_LOG: &str = "\
   ** Severe  ** Node connection error
   **  Fatal  ** Preceding condition causes termination.
   ************* EnergyPlus Terminated--Fatal Error Detected. 0 Warning; 1 Severe Errors
";

    fn extractor() -> LogExtractor {
        LogExtractor::new(&DiagnosticsPolicy::default())
    }

    #[test]
    fn clean_log_has_warnings_but_no_fatal() {
        let outcome = extractor().scan_text(CLEAN_LOG);
        assert!(!outcome.has_fatal());
        assert_eq!(outcome.warning_count, 2);
        assert!(outcome.warnings[0].starts_with("** Warning **"));
    }

    #[test]
    fn fatal_marker_and_terminal_line_are_fatal() {
        let outcome = extractor().scan_text(FATAL_LOG);
        assert!(outcome.has_fatal());
        assert_eq!(outcome.fatal_errors.len(), 2);
        assert_eq!(outcome.warning_count, 1);
    }

    #[test]
    fn excerpt_and_warning_list_are_bounded() {
        let policy = DiagnosticsPolicy {
            log_excerpt_chars: 10,
            max_log_warnings: 1,
        };
        let outcome = LogExtractor::new(&policy).scan_text(CLEAN_LOG);
        assert_eq!(outcome.raw_excerpt.chars().count(), 10);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warning_count, 2);
    }

    #[test]
    fn missing_log_is_empty_outcome() {
        let set = ArtifactSet::from_artifacts("/run", Vec::new());
        let outcome = extractor().scan(&set).expect("no log is not an error");
        assert_eq!(outcome, LogOutcome::default());
    }
}
