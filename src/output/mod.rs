//! Output writers for captured phase statistics.
//!
//! This module handles writing data to disk in two formats:
//! - Tab-delimited per-phase statistics (the export file)
//! - JSON reports with timings and statistics

pub mod json;
pub mod tsv;

// Re-export main functions
pub use json::{read_report, write_report, PhaseReport, PhaseSummary};
pub use tsv::StatsExporter;

use crate::utils::error::ExportError;
use log::debug;
use std::path::Path;

/// Validate that output path is writable and create its parent directories
///
/// **Private** - shared by the writers in this module
fn prepare_output_path(path: &Path) -> Result<(), ExportError> {
    if path.as_os_str().is_empty() {
        return Err(ExportError::InvalidPath("Path is empty".to_string()));
    }

    // Check if we're trying to overwrite a directory
    if path.is_dir() {
        return Err(ExportError::InvalidPath(format!(
            "Path is a directory: {}",
            path.display()
        )));
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("Creating parent directories: {}", parent.display());
            std::fs::create_dir_all(parent).map_err(|e| {
                ExportError::InvalidPath(format!(
                    "Cannot create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    Ok(())
}
