//! Tab-delimited export of per-phase statistics.
//!
//! Every phase contributes one block: two comment header lines, a column
//! header with a leading `phase` column, then one row per call site tagged
//! with the phase name. Blocks are concatenated in first-seen phase order.
//! Rows come from the structured statistics, not from rendered text.
//!
//! Example block:
//! ```text
//! # 3 function calls in 0.012 seconds
//! # Ordered by: cumulative time
//! phase	ncalls	pcalls	tottime	cumtime	filename:lineno(function)
//! load	3	3	0.012000	0.012000	src/io.rs:14(read_chunk)
//! ```

use super::prepare_output_path;
use crate::provider::{CallSiteStats, ProfileStats, SortKey};
use crate::utils::config::{PHASE_COLUMN, STAT_COLUMNS};
use crate::utils::error::ExportError;
use log::{debug, info};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Writes captured statistics of all phases into one file
///
/// **Public** - used by `PhaseStack::export`
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsExporter {
    sort_key: SortKey,
}

impl StatsExporter {
    pub fn new(sort_key: SortKey) -> Self {
        Self { sort_key }
    }

    pub fn sort_key(&self) -> SortKey {
        self.sort_key
    }

    /// Write every phase block to `output_path`
    ///
    /// The file is created or truncated. All blocks are validated before
    /// anything is written.
    ///
    /// # Errors
    /// * `ExportError::MalformedStatistics` - a name or row cannot be written as one TSV row
    /// * `ExportError::InvalidPath` - path is empty, a directory, or its parent cannot be created
    /// * `ExportError::WriteFailed` - I/O error during write
    pub fn write_to_file(
        &self,
        phases: &[(String, ProfileStats)],
        output_path: impl AsRef<Path>,
    ) -> Result<(), ExportError> {
        let output_path = output_path.as_ref();

        info!("Writing phase statistics to: {}", output_path.display());

        validate_phases(phases)?;
        prepare_output_path(output_path)?;

        let file = File::create(output_path).map_err(ExportError::WriteFailed)?;
        let mut writer = BufWriter::new(file);

        for (phase, stats) in phases {
            write_block(&mut writer, phase, stats, self.sort_key)
                .map_err(ExportError::WriteFailed)?;
        }

        writer.flush().map_err(ExportError::WriteFailed)?;

        info!(
            "Phase statistics written ({} phase(s), {} row(s))",
            phases.len(),
            phases.iter().map(|(_, s)| s.rows.len()).sum::<usize>()
        );

        Ok(())
    }

    /// Same text as `write_to_file`, in memory
    pub fn render_report(&self, phases: &[(String, ProfileStats)]) -> Result<String, ExportError> {
        validate_phases(phases)?;

        let mut buf = Vec::new();
        for (phase, stats) in phases {
            write_block(&mut buf, phase, stats, self.sort_key)?;
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Reject anything that would break the row structure of the file
///
/// **Private** - internal validation
fn validate_phases(phases: &[(String, ProfileStats)]) -> Result<(), ExportError> {
    for (phase, stats) in phases {
        let malformed = |reason: String| ExportError::MalformedStatistics {
            phase: phase.clone(),
            reason,
        };

        if has_separator(phase) {
            return Err(malformed("phase name contains a tab or line break".to_string()));
        }

        for row in &stats.rows {
            let identifier = row.site.identifier();
            if has_separator(&identifier) {
                return Err(malformed(format!(
                    "identifier {:?} contains a tab or line break",
                    identifier
                )));
            }
            if row.pcalls > row.ncalls {
                return Err(malformed(format!(
                    "{} has {} primitive calls but only {} calls",
                    identifier, row.pcalls, row.ncalls
                )));
            }
        }
    }
    Ok(())
}

fn has_separator(text: &str) -> bool {
    text.contains(['\t', '\n', '\r'])
}

/// Write one phase block
///
/// **Private** - internal formatting
fn write_block<W: Write>(
    out: &mut W,
    phase: &str,
    stats: &ProfileStats,
    sort_key: SortKey,
) -> io::Result<()> {
    debug!("Formatting {} row(s) for phase '{}'", stats.rows.len(), phase);

    writeln!(out, "# {}", stats.summary_line())?;
    writeln!(out, "# Ordered by: {}", sort_key.description())?;
    writeln!(out, "{}\t{}", PHASE_COLUMN, STAT_COLUMNS.join("\t"))?;

    for row in stats.sorted_rows(sort_key) {
        writeln!(out, "{}\t{}", phase, format_row(row))?;
    }

    Ok(())
}

fn format_row(row: &CallSiteStats) -> String {
    format!(
        "{}\t{}\t{:.6}\t{:.6}\t{}",
        row.ncalls,
        row.pcalls,
        row.tottime.as_secs_f64(),
        row.cumtime.as_secs_f64(),
        row.site
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::CallSite;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn row(function: &str, ncalls: u64, pcalls: u64, cum_ms: u64) -> CallSiteStats {
        CallSiteStats {
            site: CallSite::new("src/lib.rs", 3, function),
            ncalls,
            pcalls,
            tottime: Duration::from_millis(cum_ms / 2),
            cumtime: Duration::from_millis(cum_ms),
        }
    }

    fn phases() -> Vec<(String, ProfileStats)> {
        vec![
            (
                "load".to_string(),
                ProfileStats::from_rows(vec![row("read", 2, 2, 10), row("open", 1, 1, 20)]),
            ),
            (
                "solve".to_string(),
                ProfileStats::from_rows(vec![row("step", 4, 1, 100)]),
            ),
        ]
    }

    #[test]
    fn test_render_report() {
        let text = StatsExporter::new(SortKey::Cumulative)
            .render_report(&phases())
            .unwrap();

        let expected = "\
# 3 function calls in 0.015 seconds
# Ordered by: cumulative time
phase\tncalls\tpcalls\ttottime\tcumtime\tfilename:lineno(function)
load\t1\t1\t0.010000\t0.020000\tsrc/lib.rs:3(open)
load\t2\t2\t0.005000\t0.010000\tsrc/lib.rs:3(read)
# 4 function calls (1 primitive calls) in 0.050 seconds
# Ordered by: cumulative time
phase\tncalls\tpcalls\ttottime\tcumtime\tfilename:lineno(function)
solve\t4\t1\t0.050000\t0.100000\tsrc/lib.rs:3(step)
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_sort_key_changes_row_order() {
        let text = StatsExporter::new(SortKey::Calls)
            .render_report(&phases())
            .unwrap();
        let load_rows: Vec<&str> = text.lines().filter(|l| l.starts_with("load\t")).collect();
        assert!(load_rows[0].ends_with("(read)"));
        assert!(text.contains("# Ordered by: call count"));
    }

    #[test]
    fn test_empty_phase_has_header_only() {
        let phases = vec![("idle".to_string(), ProfileStats::default())];
        let text = StatsExporter::default().render_report(&phases).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().nth(2).unwrap().starts_with("phase\t"));
    }

    #[test]
    fn test_no_phases_writes_empty_file() {
        let temp_file = NamedTempFile::new().unwrap();
        StatsExporter::default()
            .write_to_file(&[], temp_file.path())
            .unwrap();
        assert_eq!(std::fs::read_to_string(temp_file.path()).unwrap(), "");
    }

    #[test]
    fn test_write_truncates_existing_file() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "stale content\n").unwrap();

        StatsExporter::default()
            .write_to_file(&phases(), temp_file.path())
            .unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(!content.contains("stale"));
        assert!(!content.lines().any(|l| l.is_empty()));
    }

    #[test]
    fn test_malformed_phase_name() {
        let phases = vec![("bad\tname".to_string(), ProfileStats::default())];
        let result = StatsExporter::default().render_report(&phases);
        assert!(matches!(result, Err(ExportError::MalformedStatistics { .. })));
    }

    #[test]
    fn test_malformed_row_counts() {
        let phases = vec![(
            "load".to_string(),
            ProfileStats::from_rows(vec![row("read", 1, 3, 10)]),
        )];
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "untouched").unwrap();

        let result = StatsExporter::default().write_to_file(&phases, temp_file.path());
        assert!(matches!(
            result,
            Err(ExportError::MalformedStatistics { phase, .. }) if phase == "load"
        ));
        assert_eq!(std::fs::read_to_string(temp_file.path()).unwrap(), "untouched");
    }
}
