//! Structured per-call-site statistics produced by a provider.
//!
//! A `ProfileStats` is what one capture yields: one row per distinct call
//! site with call counts and own/cumulative time. Rows can be ordered by any
//! `SortKey` and rendered as a pstats-style text table.

use crate::utils::error::ParseError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::time::Duration;

/// Source location of an instrumented call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallSite {
    pub file: String,
    pub line: u32,
    pub function: String,
}

impl CallSite {
    pub fn new(file: impl Into<String>, line: u32, function: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            function: function.into(),
        }
    }

    /// `file:line(function)`, the identifier column of every report
    pub fn identifier(&self) -> String {
        format!("{}:{}({})", self.file, self.line, self.function)
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}({})", self.file, self.line, self.function)
    }
}

/// Accumulated statistics for one call site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSiteStats {
    pub site: CallSite,

    /// Total number of calls, recursive ones included
    pub ncalls: u64,

    /// Calls that were not recursive at entry
    pub pcalls: u64,

    /// Time spent in the call site itself, excluding instrumented children
    #[serde(with = "secs")]
    pub tottime: Duration,

    /// Time including children, counted once per outermost invocation
    #[serde(with = "secs")]
    pub cumtime: Duration,
}

impl CallSiteStats {
    pub fn new(site: CallSite) -> Self {
        Self {
            site,
            ncalls: 0,
            pcalls: 0,
            tottime: Duration::ZERO,
            cumtime: Duration::ZERO,
        }
    }

    pub fn is_recursive(&self) -> bool {
        self.ncalls != self.pcalls
    }
}

/// Statistics object for a single capture
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileStats {
    pub rows: Vec<CallSiteStats>,
    pub total_calls: u64,
    pub primitive_calls: u64,
    #[serde(with = "secs")]
    pub total_time: Duration,
}

impl ProfileStats {
    /// Build statistics from rows, computing the totals
    pub fn from_rows(rows: Vec<CallSiteStats>) -> Self {
        let total_calls = rows.iter().map(|r| r.ncalls).sum();
        let primitive_calls = rows.iter().map(|r| r.pcalls).sum();
        let total_time = rows.iter().map(|r| r.tottime).sum();

        Self {
            rows,
            total_calls,
            primitive_calls,
            total_time,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Look up the row for a function name
    pub fn row(&self, function: &str) -> Option<&CallSiteStats> {
        self.rows.iter().find(|r| r.site.function == function)
    }

    /// Rows ordered by `key`, ties broken by identifier
    pub fn sorted_rows(&self, key: SortKey) -> Vec<&CallSiteStats> {
        let mut rows: Vec<&CallSiteStats> = self.rows.iter().collect();
        rows.sort_by(|a, b| {
            key.compare(a, b)
                .then_with(|| a.site.identifier().cmp(&b.site.identifier()))
        });
        rows
    }

    /// One-line summary used as the first header of every report
    pub fn summary_line(&self) -> String {
        if self.total_calls == self.primitive_calls {
            format!(
                "{} function calls in {:.3} seconds",
                self.total_calls,
                self.total_time.as_secs_f64()
            )
        } else {
            format!(
                "{} function calls ({} primitive calls) in {:.3} seconds",
                self.total_calls,
                self.primitive_calls,
                self.total_time.as_secs_f64()
            )
        }
    }

    /// Render a pstats-style text table sorted by `key`
    pub fn render<W: Write>(&self, key: SortKey, out: &mut W) -> io::Result<()> {
        writeln!(out, "         {}", self.summary_line())?;
        writeln!(out)?;
        writeln!(out, "   Ordered by: {}", key.description())?;
        writeln!(out)?;
        writeln!(
            out,
            "   ncalls  tottime  percall  cumtime  percall filename:lineno(function)"
        )?;

        for row in self.sorted_rows(key) {
            let calls = if row.is_recursive() {
                format!("{}/{}", row.ncalls, row.pcalls)
            } else {
                row.ncalls.to_string()
            };
            writeln!(
                out,
                "{:>9} {:>8.3} {:>8.3} {:>8.3} {:>8.3} {}",
                calls,
                row.tottime.as_secs_f64(),
                per_call(row.tottime, row.ncalls),
                row.cumtime.as_secs_f64(),
                per_call(row.cumtime, row.pcalls),
                row.site
            )?;
        }

        writeln!(out)?;
        Ok(())
    }

    /// Rendered text as a `String`
    pub fn render_to_string(&self, key: SortKey) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.render(key, &mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

fn per_call(time: Duration, calls: u64) -> f64 {
    if calls == 0 {
        0.0
    } else {
        time.as_secs_f64() / calls as f64
    }
}

/// Row ordering for rendered and exported statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Calls,
    #[default]
    Cumulative,
    Filename,
    Ncalls,
    Pcalls,
    Line,
    Name,
    Nfl,
    Stdname,
    Time,
}

impl SortKey {
    pub const ALL: [SortKey; 10] = [
        SortKey::Calls,
        SortKey::Cumulative,
        SortKey::Filename,
        SortKey::Ncalls,
        SortKey::Pcalls,
        SortKey::Line,
        SortKey::Name,
        SortKey::Nfl,
        SortKey::Stdname,
        SortKey::Time,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Calls => "calls",
            SortKey::Cumulative => "cumulative",
            SortKey::Filename => "filename",
            SortKey::Ncalls => "ncalls",
            SortKey::Pcalls => "pcalls",
            SortKey::Line => "line",
            SortKey::Name => "name",
            SortKey::Nfl => "nfl",
            SortKey::Stdname => "stdname",
            SortKey::Time => "time",
        }
    }

    /// Human-readable form used in the `Ordered by` header
    pub fn description(&self) -> &'static str {
        match self {
            SortKey::Calls | SortKey::Ncalls => "call count",
            SortKey::Cumulative => "cumulative time",
            SortKey::Filename => "file name",
            SortKey::Pcalls => "primitive call count",
            SortKey::Line => "line number",
            SortKey::Name => "function name",
            SortKey::Nfl => "name/file/line",
            SortKey::Stdname => "standard name",
            SortKey::Time => "internal time",
        }
    }

    fn compare(&self, a: &CallSiteStats, b: &CallSiteStats) -> Ordering {
        match self {
            SortKey::Calls | SortKey::Ncalls => b.ncalls.cmp(&a.ncalls),
            SortKey::Pcalls => b.pcalls.cmp(&a.pcalls),
            SortKey::Cumulative => b.cumtime.cmp(&a.cumtime),
            SortKey::Time => b.tottime.cmp(&a.tottime),
            SortKey::Filename => a.site.file.cmp(&b.site.file),
            SortKey::Line => a.site.line.cmp(&b.site.line),
            SortKey::Name => a.site.function.cmp(&b.site.function),
            SortKey::Nfl => a
                .site
                .function
                .cmp(&b.site.function)
                .then_with(|| a.site.file.cmp(&b.site.file))
                .then_with(|| a.site.line.cmp(&b.site.line)),
            SortKey::Stdname => a.site.identifier().cmp(&b.site.identifier()),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        SortKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == wanted)
            .ok_or_else(|| ParseError::UnknownSortKey(s.to_string()))
    }
}

/// Serialize `Duration` as fractional seconds
pub(crate) mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom(format!("invalid duration {}", secs)));
        }
        Ok(Duration::from_nanos((secs * 1e9).round() as u64))
    }
}
