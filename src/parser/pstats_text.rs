//! Parse pstats-style statistics text back into `ProfileStats`.
//!
//! Providers that can only hand over rendered text (an external profiler's
//! dump, or `ProfileStats::render` output) are read through here so the
//! exporter always works on structured rows.
//!
//! Expected layout:
//! ```text
//!          11 function calls (5 primitive calls) in 0.075 seconds
//!
//!    Ordered by: cumulative time
//!
//!    ncalls  tottime  percall  cumtime  percall filename:lineno(function)
//!       7/1    0.005    0.001    0.080    0.080 src/work.rs:20(walk)
//!         1    0.000    0.000    0.000    0.000 {built-in method sleep}
//! ```

use crate::provider::{CallSite, CallSiteStats, ProfileStats};
use crate::utils::error::ParseError;
use log::debug;
use std::time::Duration;

/// Leading numeric columns of a data row; the identifier is the rest
const NUMERIC_COLUMNS: usize = 5;

const OPENERS: [char; 4] = ['(', '[', '{', '<'];
const CLOSERS: [char; 4] = [')', ']', '}', '>'];

/// Parse rendered statistics text
///
/// **Public** - main entry point for text input
///
/// Lines before the column header other than the summary line are
/// ignored. Every non-blank line after it must be a data row.
///
/// # Errors
/// * `ParseError::MalformedStatistics` - missing column header, short row, bad numbers
pub fn parse_stats_text(text: &str) -> Result<ProfileStats, ParseError> {
    let mut summary: Option<Summary> = None;
    let mut in_rows = false;
    let mut rows = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if in_rows {
            rows.push(parse_row(trimmed).map_err(|reason| {
                ParseError::MalformedStatistics(format!("line {}: {}", line_no + 1, reason))
            })?);
        } else if trimmed.starts_with("ncalls") {
            in_rows = true;
        } else if trimmed.contains("function calls") {
            summary = Some(parse_summary(trimmed).map_err(|reason| {
                ParseError::MalformedStatistics(format!("line {}: {}", line_no + 1, reason))
            })?);
        }
    }

    if !in_rows {
        return Err(ParseError::MalformedStatistics(
            "column header not found".to_string(),
        ));
    }

    debug!("Parsed {} statistics row(s)", rows.len());

    let mut stats = ProfileStats::from_rows(rows);
    // Rendered row times are rounded, the summary keeps the real totals
    if let Some(summary) = summary {
        stats.total_calls = summary.total_calls;
        stats.primitive_calls = summary.primitive_calls;
        stats.total_time = summary.total_time;
    }
    Ok(stats)
}

/// Rejoin whitespace-split tokens that belong to one bracketed group
///
/// For callers that only hold a row as tokens; `parse_stats_text` reads
/// the identifier from the untokenized line instead. Scans for an opening delimiter and concatenates tokens, separated by a
/// single space, through the matching closing delimiter. An unterminated
/// group is kept as one trailing token.
pub fn merge_grouped_tokens<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut merged = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for token in tokens {
        if depth == 0 {
            current = token.to_string();
        } else {
            current.push(' ');
            current.push_str(token);
        }

        for c in token.chars() {
            if OPENERS.contains(&c) {
                depth += 1;
            } else if CLOSERS.contains(&c) {
                depth = depth.saturating_sub(1);
            }
        }

        if depth == 0 {
            merged.push(std::mem::take(&mut current));
        }
    }

    if depth > 0 {
        merged.push(current);
    }

    merged
}

struct Summary {
    total_calls: u64,
    primitive_calls: u64,
    total_time: Duration,
}

/// `N function calls [(M primitive calls)] in T seconds`
fn parse_summary(line: &str) -> Result<Summary, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    let total_calls = parse_count(tokens.first().copied())?;
    let primitive_calls = match tokens.iter().position(|t| t.starts_with('(')) {
        Some(i) => parse_count(tokens.get(i).map(|t| t.trim_start_matches('(')))?,
        None => total_calls,
    };
    let total_time = match tokens.iter().position(|t| *t == "in") {
        Some(i) => parse_seconds(tokens.get(i + 1).copied())?,
        None => return Err(format!("no total time in summary {:?}", line)),
    };

    Ok(Summary {
        total_calls,
        primitive_calls,
        total_time,
    })
}

/// `ncalls tottime percall cumtime percall identifier`
///
/// The identifier is everything after the numeric columns, so paths with
/// spaces and bracketed groups keep their spacing.
fn parse_row(line: &str) -> Result<CallSiteStats, String> {
    let mut rest = line.trim();
    let mut columns = Vec::with_capacity(NUMERIC_COLUMNS);
    while columns.len() < NUMERIC_COLUMNS && !rest.is_empty() {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        columns.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }

    if columns.len() < NUMERIC_COLUMNS || rest.is_empty() {
        return Err(format!(
            "expected {} numeric columns and an identifier in {:?}",
            NUMERIC_COLUMNS, line
        ));
    }

    let (ncalls, pcalls) = match columns[0].split_once('/') {
        Some((total, primitive)) => (parse_count(Some(total))?, parse_count(Some(primitive))?),
        None => {
            let calls = parse_count(Some(columns[0]))?;
            (calls, calls)
        }
    };

    Ok(CallSiteStats {
        site: parse_identifier(rest),
        ncalls,
        pcalls,
        tottime: parse_seconds(Some(columns[1]))?,
        cumtime: parse_seconds(Some(columns[3]))?,
    })
}

/// Split `file:line(function)`; anything else becomes a built-in site
fn parse_identifier(identifier: &str) -> CallSite {
    if identifier.ends_with(')') {
        for (open, _) in identifier.match_indices('(') {
            let location = &identifier[..open];
            if let Some((file, line)) = location.rsplit_once(':') {
                if let Ok(line) = line.parse::<u32>() {
                    let function = &identifier[open + 1..identifier.len() - 1];
                    return CallSite::new(file, line, function);
                }
            }
        }
    }
    CallSite::new("~", 0, identifier)
}

fn parse_count(token: Option<&str>) -> Result<u64, String> {
    let token = token.ok_or_else(|| "missing count".to_string())?;
    token
        .parse::<u64>()
        .map_err(|_| format!("invalid count {:?}", token))
}

fn parse_seconds(token: Option<&str>) -> Result<Duration, String> {
    let token = token.ok_or_else(|| "missing time".to_string())?;
    match token.parse::<f64>() {
        // Round to whole nanoseconds; rendered times are decimal
        Ok(secs) if secs.is_finite() && secs >= 0.0 => {
            Ok(Duration::from_nanos((secs * 1e9).round() as u64))
        }
        _ => Err(format!("invalid time {:?}", token)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SortKey;
    use pretty_assertions::assert_eq;

    const PSTATS_TEXT: &str = "\
Wed Oct 19 10:00:00 2026    prof.out

         6 function calls (4 primitive calls) in 0.120 seconds

   Ordered by: cumulative time

   ncalls  tottime  percall  cumtime  percall filename:lineno(function)
        1    0.010    0.010    0.120    0.120 run.py:1(<module>)
      3/1    0.060    0.020    0.100    0.100 run.py:5(fib)
        2    0.050    0.025    0.050    0.025 {built-in method time.sleep}
";

    #[test]
    fn test_merge_grouped_tokens() {
        let tokens = "1 0.0 0.0 0.0 0.0 {built-in method time.sleep}".split_whitespace();
        assert_eq!(
            merge_grouped_tokens(tokens),
            vec!["1", "0.0", "0.0", "0.0", "0.0", "{built-in method time.sleep}"]
        );
    }

    #[test]
    fn test_merge_nested_groups() {
        let tokens = "~:0(<method 'append' of 'list' objects>) tail".split_whitespace();
        assert_eq!(
            merge_grouped_tokens(tokens),
            vec!["~:0(<method 'append' of 'list' objects>)", "tail"]
        );
    }

    #[test]
    fn test_merge_unterminated_group() {
        let tokens = "a {open group".split_whitespace();
        assert_eq!(merge_grouped_tokens(tokens), vec!["a", "{open group"]);
    }

    #[test]
    fn test_parse_pstats_text() {
        let stats = parse_stats_text(PSTATS_TEXT).unwrap();

        assert_eq!(stats.rows.len(), 3);
        assert_eq!(stats.total_calls, 6);
        assert_eq!(stats.primitive_calls, 4);
        assert_eq!(stats.total_time, Duration::from_millis(120));

        let fib = stats.row("fib").unwrap();
        assert_eq!(fib.site, CallSite::new("run.py", 5, "fib"));
        assert_eq!((fib.ncalls, fib.pcalls), (3, 1));
        assert_eq!(fib.cumtime, Duration::from_millis(100));

        let sleep = stats.row("{built-in method time.sleep}").unwrap();
        assert_eq!(sleep.site.file, "~");
        assert_eq!(sleep.ncalls, 2);

        assert_eq!(stats.row("<module>").unwrap().site.line, 1);
    }

    #[test]
    fn test_parse_rendered_stats() {
        let rendered_from = ProfileStats::from_rows(vec![CallSiteStats {
            site: CallSite::new("src/ab.rs", 9, "spaced fn"),
            ncalls: 5,
            pcalls: 2,
            tottime: Duration::from_millis(500),
            cumtime: Duration::from_millis(1250),
        }]);

        let parsed = parse_stats_text(&rendered_from.render_to_string(SortKey::Time)).unwrap();
        let row = &parsed.rows[0];
        assert_eq!((row.ncalls, row.pcalls), (5, 2));
        assert_eq!(row.cumtime, Duration::from_millis(1250));
        assert_eq!(parsed.total_calls, 5);
    }

    #[test]
    fn test_identifier_with_spaces() {
        let text = "\
   ncalls  tottime  percall  cumtime  percall filename:lineno(function)
        1    0.001    0.001    0.004    0.004 /Users/me/My Project/run.py:3(main)
        2    0.000    0.000    0.000    0.000 {method 'join' of  'str' objects}
";
        let stats = parse_stats_text(text).unwrap();
        assert_eq!(stats.rows.len(), 2);
        assert_eq!(
            stats.rows[0].site,
            CallSite::new("/Users/me/My Project/run.py", 3, "main")
        );
        assert_eq!(stats.rows[0].cumtime, Duration::from_millis(4));
        assert_eq!(stats.rows[1].site.function, "{method 'join' of  'str' objects}");
    }

    #[test]
    fn test_bad_numeric_column() {
        let text = "   ncalls  tottime  percall  cumtime  percall filename:lineno(function)\n  x  0.1  0.1  0.1  0.1 run.py:1(f)\n";
        assert!(matches!(
            parse_stats_text(text),
            Err(ParseError::MalformedStatistics(_))
        ));
    }

    #[test]
    fn test_missing_header() {
        let result = parse_stats_text("   1 function calls in 0.001 seconds\n");
        assert!(matches!(result, Err(ParseError::MalformedStatistics(_))));
    }

    #[test]
    fn test_short_row() {
        let text = "   ncalls  tottime  percall  cumtime  percall filename:lineno(function)\n  1  0.1\n";
        let result = parse_stats_text(text);
        match result {
            Err(ParseError::MalformedStatistics(reason)) => assert!(reason.contains("line 2")),
            other => panic!("expected malformed statistics, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_profile() {
        let text = "   0 function calls in 0.000 seconds\n\n   ncalls  tottime  percall  cumtime  percall filename:lineno(function)\n";
        let stats = parse_stats_text(text).unwrap();
        assert!(stats.is_empty());
        assert_eq!(stats.total_calls, 0);
    }
}
