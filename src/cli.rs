//! Command handler functions for the twcov CLI.
//!
//! Each `cmd_*` function returns its output as a `String`, making them easy
//! to test without capturing stdout.

use std::fmt::Write;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::debug;

use crate::api;
use crate::auth::Authorizer;
use crate::db::{self, NewResult};
use crate::error::CoverageError;
use crate::lookup::AssessmentType;
use crate::model::{CoverageReport, ReportMode};
use crate::service::CoverageService;

/// Collapse sorted line numbers into "1-3, 7, 9-10".
pub fn format_line_ranges(lines: &[u32]) -> String {
    let mut ranges: Vec<String> = Vec::new();
    let mut iter = lines.iter().copied();
    let Some(first) = iter.next() else {
        return String::new();
    };
    let (mut start, mut end) = (first, first);
    for line in iter {
        if line == end + 1 {
            end = line;
            continue;
        }
        ranges.push(range_label(start, end));
        start = line;
        end = line;
    }
    ranges.push(range_label(start, end));
    ranges.join(", ")
}

fn range_label(start: u32, end: u32) -> String {
    if start == end {
        format!("{start}")
    } else {
        format!("{start}-{end}")
    }
}

pub fn cmd_exercise_add(conn: &mut Connection, title: &str) -> Result<String> {
    let (exercise_id, participation_id) = db::insert_exercise(conn, title)?;
    Ok(format!(
        "Created exercise {exercise_id} '{title}' (solution participation {participation_id})\n"
    ))
}

pub fn cmd_submission_add(
    conn: &Connection,
    participation_id: i64,
    at: Option<DateTime<Utc>>,
) -> Result<String> {
    let at = at.unwrap_or_else(Utc::now);
    let id = db::insert_submission(conn, participation_id, &at)?;
    Ok(format!(
        "Created submission {id} for participation {participation_id} at {}\n",
        db::fmt_ts(&at)
    ))
}

pub fn cmd_result_add(
    conn: &Connection,
    submission_id: i64,
    manual: bool,
    invalid: bool,
    pending: bool,
    completed_at: Option<DateTime<Utc>>,
) -> Result<String> {
    let result = NewResult {
        submission_id,
        assessment_type: if manual {
            AssessmentType::Manual
        } else {
            AssessmentType::Automatic
        },
        completion_date: if pending {
            None
        } else {
            Some(completed_at.unwrap_or_else(Utc::now))
        },
        valid: !invalid,
    };
    let id = db::insert_result(conn, &result)?;
    Ok(format!(
        "Created {} result {id} for submission {submission_id}\n",
        result.assessment_type.as_str()
    ))
}

pub fn cmd_result_delete(conn: &mut Connection, result_id: i64) -> Result<String> {
    db::delete_result(conn, result_id)?;
    Ok(format!("Deleted result {result_id}\n"))
}

pub fn cmd_ingest(
    conn: &mut Connection,
    result_id: i64,
    file: &Path,
    summary_only: bool,
) -> Result<String> {
    let mode = if summary_only {
        ReportMode::SummaryOnly
    } else {
        ReportMode::Full
    };
    let outcome = crate::ingest::ingest(conn, result_id, file, mode)?;
    Ok(format!(
        "Ingested {} → {mode} report {} for result {result_id}: {} files, {} entries, {}/{} lines covered\n",
        file.display(),
        outcome.report_id,
        outcome.files,
        outcome.entries,
        outcome.covered_line_count,
        outcome.line_count,
    ))
}

fn fetch_report(
    conn: &Connection,
    authorizer: &dyn Authorizer,
    exercise_id: i64,
    full: bool,
) -> std::result::Result<CoverageReport, CoverageError> {
    let service = CoverageService::new(conn, authorizer);
    if full {
        service.get_full_report(exercise_id)
    } else {
        service.get_summary_report(exercise_id)
    }
}

/// The latest report as JSON. An absent report prints `null`.
pub fn cmd_report(
    conn: &Connection,
    authorizer: &dyn Authorizer,
    exercise_id: i64,
    full: bool,
) -> Result<String> {
    match fetch_report(conn, authorizer, exercise_id, full) {
        Ok(report) => Ok(format!("{}\n", serde_json::to_string_pretty(&report)?)),
        Err(err) if err.is_not_found() => {
            debug!(exercise_id, reason = %err, "no coverage report");
            Ok("null\n".to_string())
        }
        Err(err) => Err(err.into()),
    }
}

/// HTTP-shaped request: prints the status line, then the JSON body.
pub fn cmd_get(conn: &Connection, authorizer: &dyn Authorizer, path: &str) -> Result<String> {
    let service = CoverageService::new(conn, authorizer);
    let response = api::dispatch(&service, path);
    Ok(format!(
        "{}\n{}\n",
        response.status,
        serde_json::to_string_pretty(&response.body)?
    ))
}

pub fn cmd_files(
    conn: &Connection,
    authorizer: &dyn Authorizer,
    exercise_id: i64,
    sort_by_coverage: bool,
) -> Result<String> {
    let report = match fetch_report(conn, authorizer, exercise_id, false) {
        Ok(report) => report,
        Err(err) if err.is_not_found() => return Ok(format!("{err}\n")),
        Err(err) => return Err(err.into()),
    };

    let mut files: Vec<_> = report.file_reports.iter().collect();
    if sort_by_coverage {
        files.sort_by(|a, b| a.line_rate().total_cmp(&b.line_rate()));
    }

    let mut out = String::new();
    writeln!(
        out,
        "{:<60} {:>8} {:>8} {:>8}",
        "FILE", "LINES", "COVERED", "RATE"
    )
    .unwrap();
    writeln!(out, "{}", "-".repeat(88)).unwrap();

    for f in &files {
        writeln!(
            out,
            "{:<60} {:>8} {:>8} {:>7.1}%",
            f.file_path,
            f.line_count,
            f.covered_line_count,
            f.line_rate() * 100.0
        )
        .unwrap();
    }

    writeln!(out, "{}", "-".repeat(88)).unwrap();
    writeln!(
        out,
        "{:<60} {:>8} {:>8} {:>7.1}%",
        format!("TOTAL (result {})", report.result_id),
        report.line_count(),
        report.covered_line_count(),
        report.line_rate() * 100.0
    )
    .unwrap();
    Ok(out)
}

/// Per-line drill-down: which tests execute each covered line.
pub fn cmd_lines(
    conn: &Connection,
    authorizer: &dyn Authorizer,
    exercise_id: i64,
    file_path: &str,
) -> Result<String> {
    let report = match fetch_report(conn, authorizer, exercise_id, true) {
        Ok(report) => report,
        Err(err) if err.is_not_found() => return Ok(format!("{err}\n")),
        Err(err) => return Err(err.into()),
    };
    let Some(file) = report.file(file_path) else {
        return Ok(format!("No coverage data for '{file_path}'\n"));
    };
    if !report.full {
        return Ok(format!(
            "Report {} keeps counts only: {}/{} lines covered in '{file_path}'\n",
            report.id, file.covered_line_count, file.line_count
        ));
    }

    let mut out = String::new();
    writeln!(out, "{:>6}  TESTS", "LINE").unwrap();
    writeln!(out, "{}", "-".repeat(40)).unwrap();
    let mut uncovered = Vec::new();
    for line in 1..=file.line_count {
        let tests = file.tests_covering_line(line);
        if tests.is_empty() {
            uncovered.push(line);
        } else {
            writeln!(out, "{:>6}  {}", line, tests.join(", ")).unwrap();
        }
    }
    if !uncovered.is_empty() {
        writeln!(out, "\nUncovered lines in '{file_path}':").unwrap();
        writeln!(out, "  {}", format_line_ranges(&uncovered)).unwrap();
        writeln!(out, "  ({} lines)", uncovered.len()).unwrap();
    }
    Ok(out)
}

pub fn cmd_reports(conn: &Connection) -> Result<String> {
    let reports = db::list_reports(conn)?;
    if reports.is_empty() {
        return Ok("No reports in database.\n".to_string());
    }
    let mut out = String::new();
    writeln!(
        out,
        "{:<8} {:<8} {:<14} {:>6}  CREATED",
        "ID", "RESULT", "MODE", "FILES"
    )
    .unwrap();
    writeln!(out, "{}", "-".repeat(70)).unwrap();
    for r in &reports {
        let mode = if r.full {
            ReportMode::Full
        } else {
            ReportMode::SummaryOnly
        };
        writeln!(
            out,
            "{:<8} {:<8} {:<14} {:>6}  {}",
            r.id, r.result_id, mode.as_str(), r.file_count, r.created_at
        )
        .unwrap();
    }
    Ok(out)
}

pub fn cmd_delete_report(conn: &mut Connection, report_id: i64) -> Result<String> {
    let report = db::get_report(conn, report_id)?;
    db::delete_report(conn, report_id)?;
    Ok(format!(
        "Deleted coverage report {report_id} (result {})\n",
        report.result_id
    ))
}
