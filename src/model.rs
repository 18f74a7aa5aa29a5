//! The persisted coverage tree: a report owns file reports, a file report
//! owns its testwise entries. Children carry their parent's id; the tree is
//! assembled by the `db` module and is read-only once built.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate;
use crate::error::{CoverageError, Result};

/// Compute a coverage rate, returning 0.0 when the total is zero.
#[must_use]
pub fn rate(covered: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        covered as f64 / total as f64
    }
}

/// Whether a report keeps its per-test entries or only the per-file counts.
/// Chosen by whoever produces the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    Full,
    SummaryOnly,
}

impl ReportMode {
    #[must_use]
    pub fn is_full(self) -> bool {
        self == ReportMode::Full
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReportMode::Full => "full",
            ReportMode::SummaryOnly => "summary-only",
        }
    }
}

impl std::fmt::Display for ReportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much of a stored report to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detail {
    /// File reports with counts, no entries.
    Summary,
    /// File reports and all of their entries.
    Full,
}

/// One contiguous line range executed by one test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestwiseCoverageEntry {
    pub id: i64,
    pub file_report_id: i64,
    pub test_name: String,
    pub start_line: u32,
    /// Number of consecutive lines starting at `start_line`.
    pub line_count: u32,
}

impl TestwiseCoverageEntry {
    /// Last covered line (inclusive).
    #[must_use]
    pub fn end_line(&self) -> u32 {
        self.start_line
            .saturating_add(self.line_count.saturating_sub(1))
    }

    #[must_use]
    pub fn covers(&self, line: u32) -> bool {
        line >= self.start_line && line <= self.end_line()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageFileReport {
    pub id: i64,
    pub report_id: i64,
    pub file_path: String,
    pub line_count: u32,
    pub covered_line_count: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub testwise_coverage_entries: Vec<TestwiseCoverageEntry>,
}

impl CoverageFileReport {
    #[must_use]
    pub fn line_rate(&self) -> f64 {
        rate(self.covered_line_count as u64, self.line_count as u64)
    }

    /// Union of all entries as `(start_line, length)` blocks, ordered by line.
    #[must_use]
    pub fn covered_blocks(&self) -> Vec<(u32, u32)> {
        aggregate::covered_blocks(self.spans())
    }

    /// Names of the tests that execute `line`, sorted and deduplicated.
    #[must_use]
    pub fn tests_covering_line(&self, line: u32) -> Vec<&str> {
        let mut tests: Vec<&str> = self
            .testwise_coverage_entries
            .iter()
            .filter(|e| e.covers(line))
            .map(|e| e.test_name.as_str())
            .collect();
        tests.sort_unstable();
        tests.dedup();
        tests
    }

    /// Check the stored counts against the retained entries. Only meaningful
    /// when the entries were kept, i.e. for reports built in full mode.
    pub fn verify(&self) -> Result<()> {
        if self.covered_line_count > self.line_count {
            return Err(CoverageError::invariant(format!(
                "{}: covered line count {} exceeds line count {}",
                self.file_path, self.covered_line_count, self.line_count
            )));
        }
        if let Some(entry) = self
            .testwise_coverage_entries
            .iter()
            .find(|e| e.line_count == 0 || e.start_line == 0 || e.end_line() > self.line_count)
        {
            return Err(CoverageError::invariant(format!(
                "{}: entry {}+{} for {} lies outside lines 1..={}",
                self.file_path, entry.start_line, entry.line_count, entry.test_name, self.line_count
            )));
        }
        let derived = aggregate::union_line_count(self.spans());
        if derived != self.covered_line_count {
            return Err(CoverageError::invariant(format!(
                "{}: entries cover {} lines but {} are recorded",
                self.file_path, derived, self.covered_line_count
            )));
        }
        Ok(())
    }

    fn spans(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.testwise_coverage_entries
            .iter()
            .map(|e| (e.start_line, e.line_count))
    }
}

/// Coverage of one automatic result, across all files it touched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageReport {
    pub id: i64,
    pub result_id: i64,
    /// True when entries were retained at build time.
    pub full: bool,
    pub created_at: DateTime<Utc>,
    pub file_reports: Vec<CoverageFileReport>,
}

impl CoverageReport {
    #[must_use]
    pub fn line_count(&self) -> u64 {
        self.file_reports.iter().map(|f| f.line_count as u64).sum()
    }

    #[must_use]
    pub fn covered_line_count(&self) -> u64 {
        self.file_reports
            .iter()
            .map(|f| f.covered_line_count as u64)
            .sum()
    }

    #[must_use]
    pub fn line_rate(&self) -> f64 {
        rate(self.covered_line_count(), self.line_count())
    }

    pub fn file(&self, path: &str) -> Option<&CoverageFileReport> {
        self.file_reports.iter().find(|f| f.file_path == path)
    }

    /// Drop every entry, keeping the per-file counts.
    #[must_use]
    pub fn without_entries(mut self) -> Self {
        for file in &mut self.file_reports {
            file.testwise_coverage_entries = Vec::new();
        }
        self
    }
}
