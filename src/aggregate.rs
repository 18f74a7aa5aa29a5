//! Turns raw per-test line ranges into per-file coverage aggregates.
//!
//! Input comes from the test pipeline as `(test, file, start_line, line_span)`
//! facts plus a line count per file taken from the source itself. Everything
//! here is pure: no I/O, and the result only depends on the input set, not its
//! order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CoverageError, Result};

/// A contiguous range of lines one test executed in some file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRange {
    pub test: String,
    pub start_line: i64,
    pub line_span: i64,
}

/// A [`TestRange`] tagged with the file it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub file: String,
    #[serde(flatten)]
    pub range: TestRange,
}

/// Raw coverage output of one test run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageTrace {
    /// Total lines per file, from source inspection. Files listed here without
    /// any entry are reported with zero coverage.
    #[serde(default)]
    pub line_counts: BTreeMap<String, i64>,
    #[serde(default)]
    pub entries: Vec<TraceEntry>,
}

/// A normalized entry that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoveredRange {
    pub test_name: String,
    pub start_line: u32,
    pub line_count: u32,
}

/// Counts and normalized entries for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAggregate {
    pub path: String,
    pub line_count: u32,
    pub covered_line_count: u32,
    pub entries: Vec<CoveredRange>,
}

impl FileAggregate {
    /// Build an aggregate from counts supplied by the producer, without any
    /// entries to derive them from.
    pub fn from_counts(path: &str, line_count: i64, covered_line_count: i64) -> Result<Self> {
        let line_count = checked_line_count(path, line_count)?;
        let covered_line_count = u32::try_from(covered_line_count).map_err(|_| {
            CoverageError::invariant(format!(
                "{path}: invalid covered line count {covered_line_count}"
            ))
        })?;
        if covered_line_count > line_count {
            return Err(CoverageError::invariant(format!(
                "{path}: covered line count {covered_line_count} exceeds line count {line_count}"
            )));
        }
        Ok(Self {
            path: path.to_string(),
            line_count,
            covered_line_count,
            entries: Vec::new(),
        })
    }

    /// Check the aggregate before it is written. With `require_entries`, the
    /// covered count must be exactly the union of the entries.
    pub fn validate(&self, require_entries: bool) -> Result<()> {
        if self.path.is_empty() {
            return Err(CoverageError::invariant("empty file path"));
        }
        if self.covered_line_count > self.line_count {
            return Err(CoverageError::invariant(format!(
                "{}: covered line count {} exceeds line count {}",
                self.path, self.covered_line_count, self.line_count
            )));
        }
        if !require_entries {
            return Ok(());
        }
        for entry in &self.entries {
            if entry.line_count == 0 || entry.start_line == 0 {
                return Err(CoverageError::invariant(format!(
                    "{}: degenerate entry {}+{} for {}",
                    self.path, entry.start_line, entry.line_count, entry.test_name
                )));
            }
            let end = entry.start_line.checked_add(entry.line_count - 1);
            if end.map_or(true, |end| end > self.line_count) {
                return Err(CoverageError::invariant(format!(
                    "{}: entry {}+{} for {} runs past line {}",
                    self.path, entry.start_line, entry.line_count, entry.test_name, self.line_count
                )));
            }
        }
        let derived = union_line_count(self.entries.iter().map(|e| (e.start_line, e.line_count)));
        if derived != self.covered_line_count {
            return Err(CoverageError::invariant(format!(
                "{}: entries cover {} lines but {} are recorded",
                self.path, derived, self.covered_line_count
            )));
        }
        Ok(())
    }
}

fn checked_line_count(path: &str, line_count: i64) -> Result<u32> {
    if path.is_empty() {
        return Err(CoverageError::invariant("empty file path"));
    }
    u32::try_from(line_count)
        .map_err(|_| CoverageError::invariant(format!("{path}: invalid line count {line_count}")))
}

/// Aggregate the ranges recorded for a single file.
///
/// Zero-length ranges are dropped. Negative spans, lines before 1, and ranges
/// running past `line_count` are rejected.
pub fn aggregate_file<'a>(
    path: &str,
    line_count: i64,
    ranges: impl IntoIterator<Item = &'a TestRange>,
) -> Result<FileAggregate> {
    let line_count = checked_line_count(path, line_count)?;

    // test name -> inclusive (start, end) ranges
    let mut by_test: BTreeMap<&str, Vec<(u32, u32)>> = BTreeMap::new();
    for range in ranges {
        if range.line_span == 0 {
            warn!(file = path, test = %range.test, "discarding zero-length range");
            continue;
        }
        if range.test.is_empty() {
            return Err(CoverageError::invariant(format!(
                "{path}: range without a test name"
            )));
        }
        if range.line_span < 0 {
            return Err(CoverageError::invariant(format!(
                "{path}: negative span {} for {}",
                range.line_span, range.test
            )));
        }
        if range.start_line < 1 {
            return Err(CoverageError::invariant(format!(
                "{path}: start line {} for {} is before line 1",
                range.start_line, range.test
            )));
        }
        let end = range.start_line.saturating_add(range.line_span - 1);
        if end > i64::from(line_count) {
            return Err(CoverageError::invariant(format!(
                "{path}: {} covers line {end} but the file has {line_count} lines",
                range.test
            )));
        }
        // Both bounds are within 1..=line_count here.
        by_test
            .entry(range.test.as_str())
            .or_default()
            .push((range.start_line as u32, end as u32));
    }

    let mut entries = Vec::new();
    for (test, spans) in by_test {
        for (start, end) in merge(spans) {
            entries.push(CoveredRange {
                test_name: test.to_string(),
                start_line: start,
                line_count: end - start + 1,
            });
        }
    }

    let covered_line_count = union_line_count(entries.iter().map(|e| (e.start_line, e.line_count)));

    Ok(FileAggregate {
        path: path.to_string(),
        line_count,
        covered_line_count,
        entries,
    })
}

/// Aggregate a whole trace, one [`FileAggregate`] per file, ordered by path.
///
/// Every file with entries needs a line count; files with a line count but no
/// entries come out with zero coverage.
pub fn aggregate_trace(trace: &CoverageTrace) -> Result<Vec<FileAggregate>> {
    let mut by_file: BTreeMap<&str, Vec<&TestRange>> = BTreeMap::new();
    for entry in &trace.entries {
        by_file.entry(entry.file.as_str()).or_default().push(&entry.range);
    }

    if let Some(missing) = by_file.keys().find(|f| !trace.line_counts.contains_key(**f)) {
        return Err(CoverageError::invariant(format!(
            "{missing}: no line count supplied"
        )));
    }

    trace
        .line_counts
        .iter()
        .map(|(path, &line_count)| {
            let ranges = by_file.get(path.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            aggregate_file(path, line_count, ranges.iter().copied())
        })
        .collect()
}

/// Merge inclusive `(start, end)` ranges, joining overlapping and adjacent ones.
fn merge(mut ranges: Vec<(u32, u32)>) -> Vec<(u32, u32)> {
    ranges.sort_unstable();
    let mut merged: Vec<(u32, u32)> = Vec::with_capacity(ranges.len());
    for (start, end) in ranges {
        match merged.last_mut() {
            Some(last) if start <= last.1.saturating_add(1) => {
                last.1 = last.1.max(end);
            }
            _ => merged.push((start, end)),
        }
    }
    merged
}

fn inclusive(spans: impl IntoIterator<Item = (u32, u32)>) -> Vec<(u32, u32)> {
    spans
        .into_iter()
        .filter(|&(_, len)| len > 0)
        .map(|(start, len)| (start, start.saturating_add(len - 1)))
        .collect()
}

/// Number of distinct lines covered by a set of `(start_line, length)` spans.
#[must_use]
pub fn union_line_count(spans: impl IntoIterator<Item = (u32, u32)>) -> u32 {
    merge(inclusive(spans))
        .into_iter()
        .map(|(start, end)| end - start + 1)
        .sum()
}

/// The union of `(start_line, length)` spans as ordered, disjoint blocks.
#[must_use]
pub fn covered_blocks(spans: impl IntoIterator<Item = (u32, u32)>) -> Vec<(u32, u32)> {
    merge(inclusive(spans))
        .into_iter()
        .map(|(start, end)| (start, end - start + 1))
        .collect()
}
