//! Configuration and constants for the profiler.

use crate::provider::SortKey;
use crate::utils::error::ConfigError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default file the tabular export is written to
pub const DEFAULT_OUTPUT_FILE: &str = "prof.txt";

/// Current JSON report schema version
pub const REPORT_SCHEMA_VERSION: &str = "1.0.0";

/// Leading column name of every exported header row
pub const PHASE_COLUMN: &str = "phase";

/// Column headers following the phase column
pub const STAT_COLUMNS: &[&str] = &[
    "ncalls",
    "pcalls",
    "tottime",
    "cumtime",
    "filename:lineno(function)",
];

/// Profiler configuration
///
/// Passed to `PhaseStack::with_config`; there are no process-wide defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Where `PhaseStack::export` writes the tabular report
    pub output_path: PathBuf,

    /// Row ordering inside each phase block
    pub sort_key: SortKey,

    /// Optional JSON report written alongside the tabular export
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_report: Option<PathBuf>,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from(DEFAULT_OUTPUT_FILE),
            sort_key: SortKey::default(),
            json_report: None,
        }
    }
}

impl ProfilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    pub fn with_sort_key(mut self, sort_key: SortKey) -> Self {
        self.sort_key = sort_key;
        self
    }

    pub fn with_json_report(mut self, path: impl Into<PathBuf>) -> Self {
        self.json_report = Some(path.into());
        self
    }

    /// Load configuration from a JSON file
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Loading profiler config from: {}", path.display());

        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = ProfilerConfig::default();
        assert_eq!(config.output_path, PathBuf::from("prof.txt"));
        assert_eq!(config.sort_key, SortKey::Cumulative);
        assert!(config.json_report.is_none());
    }

    #[test]
    fn test_builder() {
        let config = ProfilerConfig::new()
            .with_output_path("out/stats.tsv")
            .with_sort_key(SortKey::Time)
            .with_json_report("out/stats.json");

        assert_eq!(config.output_path, PathBuf::from("out/stats.tsv"));
        assert_eq!(config.sort_key, SortKey::Time);
        assert_eq!(config.json_report, Some(PathBuf::from("out/stats.json")));
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "sort_key": "ncalls" }}"#).unwrap();

        let config = ProfilerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.sort_key, SortKey::Ncalls);
        assert_eq!(config.output_path, PathBuf::from(DEFAULT_OUTPUT_FILE));
    }

    #[test]
    fn test_from_file_invalid() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "sort_key": "bogus" }}"#).unwrap();

        let result = ProfilerConfig::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::InvalidFormat(_))));
    }

    #[test]
    fn test_from_file_missing() {
        let result = ProfilerConfig::from_file("/nonexistent/profiler.json");
        assert!(matches!(result, Err(ConfigError::ReadFailed(_))));
    }
}
