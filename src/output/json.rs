//! JSON phase report writer.
//!
//! Writes the timings and statistics of every phase to a single JSON file
//! for tools that prefer structured input over the tab-delimited export.

use super::prepare_output_path;
use crate::provider::ProfileStats;
use crate::utils::config::REPORT_SCHEMA_VERSION;
use crate::utils::error::ExportError;
use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Duration;

/// Top-level report structure written to JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseReport {
    /// Schema version for compatibility checking
    pub version: String,

    /// Timestamp when the report was generated (RFC 3339)
    pub generated_at: String,

    /// Phases in first-seen order
    pub phases: Vec<PhaseSummary>,
}

/// One phase of the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub name: String,

    /// Accumulated wall-clock time over all brackets
    pub seconds: f64,

    /// Completed start/end pairs
    pub brackets: u32,

    pub stats: ProfileStats,
}

impl PhaseReport {
    /// Build a report stamped with the current time
    pub fn from_phases<'a>(
        phases: impl IntoIterator<Item = (&'a str, Duration, u32, ProfileStats)>,
    ) -> Self {
        let phases = phases
            .into_iter()
            .map(|(name, elapsed, brackets, stats)| PhaseSummary {
                name: name.to_string(),
                seconds: elapsed.as_secs_f64(),
                brackets,
                stats,
            })
            .collect();

        Self {
            version: REPORT_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now().to_rfc3339(),
            phases,
        }
    }

    pub fn phase(&self, name: &str) -> Option<&PhaseSummary> {
        self.phases.iter().find(|p| p.name == name)
    }
}

/// Write a report to a JSON file
///
/// **Public** - main entry point for JSON output
///
/// # Errors
/// * `ExportError::WriteFailed` - I/O error during write
/// * `ExportError::SerializationFailed` - JSON serialization error
/// * `ExportError::InvalidPath` - Path cannot be created or is invalid
pub fn write_report(
    report: &PhaseReport,
    output_path: impl AsRef<Path>,
) -> Result<(), ExportError> {
    let output_path = output_path.as_ref();

    info!("Writing phase report to: {}", output_path.display());

    prepare_output_path(output_path)?;

    let file = File::create(output_path).map_err(ExportError::WriteFailed)?;
    let writer = BufWriter::new(file);

    serde_json::to_writer_pretty(writer, report).map_err(ExportError::SerializationFailed)?;

    info!("Phase report written ({} phase(s))", report.phases.len());

    Ok(())
}

/// Read a report from a JSON file
///
/// **Public** - useful for comparing runs and testing
///
/// # Errors
/// * `ExportError::ReadFailed` - input file cannot be opened
/// * `ExportError::SerializationFailed` - not a valid report
pub fn read_report(input_path: impl AsRef<Path>) -> Result<PhaseReport, ExportError> {
    let input_path = input_path.as_ref();

    debug!("Reading phase report from: {}", input_path.display());

    let file = File::open(input_path).map_err(ExportError::ReadFailed)?;

    let report: PhaseReport =
        serde_json::from_reader(file).map_err(ExportError::SerializationFailed)?;

    debug!(
        "Report loaded: version {}, {} phase(s)",
        report.version,
        report.phases.len()
    );

    Ok(report)
}
