use std::path::Path;

use rusqlite::Connection;

use crate::aggregate::{aggregate_trace, CoverageTrace};
use crate::db;
use crate::error::Result;
use crate::model::ReportMode;

/// What a successful ingest produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub report_id: i64,
    pub files: usize,
    pub entries: usize,
    pub line_count: u64,
    pub covered_line_count: u64,
}

/// Parse a JSON coverage trace.
pub fn parse_trace(content: &[u8]) -> Result<CoverageTrace> {
    Ok(serde_json::from_slice(content)?)
}

/// Read a coverage trace file, aggregate it per file, and build the report
/// for `result_id`.
pub fn ingest(
    conn: &mut Connection,
    result_id: i64,
    file_path: &Path,
    mode: ReportMode,
) -> Result<IngestOutcome> {
    let content = std::fs::read(file_path)?;
    let trace = parse_trace(&content)?;
    ingest_trace(conn, result_id, &trace, mode)
}

/// Aggregate an already parsed trace and build the report for `result_id`.
pub fn ingest_trace(
    conn: &mut Connection,
    result_id: i64,
    trace: &CoverageTrace,
    mode: ReportMode,
) -> Result<IngestOutcome> {
    let files = aggregate_trace(trace)?;
    let report_id = db::insert_coverage_report(conn, result_id, &files, mode)?;

    let entries = if mode.is_full() {
        files.iter().map(|f| f.entries.len()).sum()
    } else {
        0
    };
    Ok(IngestOutcome {
        report_id,
        files: files.len(),
        entries,
        line_count: files.iter().map(|f| f.line_count as u64).sum(),
        covered_line_count: files.iter().map(|f| f.covered_line_count as u64).sum(),
    })
}
