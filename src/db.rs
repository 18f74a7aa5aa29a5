use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::aggregate::FileAggregate;
use crate::error::{CoverageError, NotFound, Result};
use crate::lookup::{
    AssessmentType, ParticipationLookup, ReportStore, SolutionParticipation, Submission,
    SubmissionResult,
};
use crate::model::{CoverageFileReport, CoverageReport, Detail, ReportMode, TestwiseCoverageEntry};

pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA: &str = include_str!("../schema.sql");

/// How long a writer waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

type MigrationFn = fn(&Connection) -> Result<()>;

/// Forward steps, keyed by the version they migrate from.
const MIGRATIONS: &[(u32, MigrationFn)] = &[];

/// Open (or create) the database at the given path.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
    Ok(conn)
}

/// Ensure the schema is initialized. Safe to call on an already-initialized DB.
/// Performs forward migrations when the on-disk schema version is older than
/// `SCHEMA_VERSION`.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    let version: Option<u32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()?;
    match version {
        None => {
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
        }
        Some(v) if v == SCHEMA_VERSION => {}
        Some(v) if v > SCHEMA_VERSION => {
            return Err(CoverageError::Other(format!(
                "Database schema version {} is newer than this binary supports ({}). \
                 Please upgrade twcov.",
                v, SCHEMA_VERSION
            )));
        }
        Some(v) => migrate(conn, v)?,
    }
    Ok(())
}

/// Apply migrations from `from_version` up to `SCHEMA_VERSION`, one step
/// per version. schema.sql always describes the final state, so new
/// databases skip this entirely.
fn migrate(conn: &Connection, from_version: u32) -> Result<()> {
    for current in from_version..SCHEMA_VERSION {
        let (_, step) = MIGRATIONS
            .iter()
            .find(|(from, _)| *from == current)
            .ok_or_else(|| {
                CoverageError::Other(format!(
                    "No migration path from schema version {} to {}. \
                     Consider deleting the database.",
                    current,
                    current + 1
                ))
            })?;
        info!(from = current, to = current + 1, "migrating database schema");
        step(conn)?;
        conn.execute("UPDATE schema_version SET version = ?1", params![current + 1])?;
    }
    Ok(())
}

/// Timestamps are stored as RFC 3339 with a fixed precision so that text
/// order is chronological order.
pub fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

// ── Exercises, submissions, results ────────────────────────────────────────

/// Create an exercise together with its solution participation.
/// Returns (exercise_id, participation_id).
pub fn insert_exercise(conn: &mut Connection, title: &str) -> Result<(i64, i64)> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO exercise (title, created_at) VALUES (?1, ?2)",
        params![title, fmt_ts(&Utc::now())],
    )?;
    let exercise_id = tx.last_insert_rowid();
    tx.execute(
        "INSERT INTO participation (exercise_id, kind) VALUES (?1, 'solution')",
        params![exercise_id],
    )?;
    let participation_id = tx.last_insert_rowid();
    tx.commit()?;
    Ok((exercise_id, participation_id))
}

pub fn insert_submission(
    conn: &Connection,
    participation_id: i64,
    submission_date: &DateTime<Utc>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO submission (participation_id, submission_date) VALUES (?1, ?2)",
        params![participation_id, fmt_ts(submission_date)],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            CoverageError::Other(format!("Participation {participation_id} does not exist"))
        } else {
            CoverageError::Sqlite(e)
        }
    })?;
    Ok(conn.last_insert_rowid())
}

/// Fields of a result to be recorded for a submission.
#[derive(Debug, Clone)]
pub struct NewResult {
    pub submission_id: i64,
    pub assessment_type: AssessmentType,
    pub completion_date: Option<DateTime<Utc>>,
    pub valid: bool,
}

pub fn insert_result(conn: &Connection, result: &NewResult) -> Result<i64> {
    conn.execute(
        "INSERT INTO result (submission_id, assessment_type, completion_date, valid) \
         VALUES (?1, ?2, ?3, ?4)",
        params![
            result.submission_id,
            result.assessment_type.as_str(),
            result.completion_date.as_ref().map(fmt_ts),
            result.valid,
        ],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            CoverageError::Other(format!(
                "Submission {} does not exist",
                result.submission_id
            ))
        } else {
            CoverageError::Sqlite(e)
        }
    })?;
    Ok(conn.last_insert_rowid())
}

/// Delete a result. Its coverage report, if any, goes first.
pub fn delete_result(conn: &mut Connection, result_id: i64) -> Result<()> {
    let tx = conn.transaction()?;
    let exists: Option<i64> = tx
        .query_row(
            "SELECT id FROM result WHERE id = ?1",
            params![result_id],
            |row| row.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Err(NotFound::Result(result_id).into());
    }

    let report_id: Option<i64> = tx
        .query_row(
            "SELECT id FROM coverage_report WHERE result_id = ?1",
            params![result_id],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(report_id) = report_id {
        delete_report_tx(&tx, report_id)?;
    }

    tx.execute("DELETE FROM result WHERE id = ?1", params![result_id])?;
    tx.commit()?;
    info!(result_id, "deleted result");
    Ok(())
}

// ── Report builder ─────────────────────────────────────────────────────────

/// Persist the coverage tree of one result. All or nothing: any invalid file
/// aggregate or an existing report for `result_id` leaves the database
/// untouched. In summary-only mode the entries are dropped and only the
/// per-file counts are kept. Returns the report id.
pub fn insert_coverage_report(
    conn: &mut Connection,
    result_id: i64,
    files: &[FileAggregate],
    mode: ReportMode,
) -> Result<i64> {
    let mut paths = HashSet::new();
    for file in files {
        file.validate(mode.is_full())?;
        if !paths.insert(file.path.as_str()) {
            return Err(CoverageError::invariant(format!(
                "{}: file listed twice",
                file.path
            )));
        }
    }

    // Take the write lock up front so a concurrent builder for the same
    // result can only lose on the UNIQUE constraint.
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let report_id = insert_coverage_report_tx(&tx, result_id, files, mode)?;
    tx.commit()?;
    info!(result_id, report_id, mode = %mode, files = files.len(), "created coverage report");
    Ok(report_id)
}

fn insert_coverage_report_tx(
    tx: &Transaction,
    result_id: i64,
    files: &[FileAggregate],
    mode: ReportMode,
) -> Result<i64> {
    let exists: Option<i64> = tx
        .query_row(
            "SELECT id FROM result WHERE id = ?1",
            params![result_id],
            |row| row.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Err(NotFound::Result(result_id).into());
    }

    // UNIQUE(result_id) makes creation once-only.
    tx.execute(
        "INSERT INTO coverage_report (result_id, full, created_at) VALUES (?1, ?2, ?3)",
        params![result_id, mode.is_full(), fmt_ts(&Utc::now())],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            CoverageError::ReportAlreadyExists { result_id }
        } else {
            CoverageError::Sqlite(e)
        }
    })?;
    let report_id = tx.last_insert_rowid();

    let mut file_stmt = tx.prepare_cached(
        "INSERT INTO coverage_file_report (report_id, file_path, line_count, covered_line_count) \
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    let mut entry_stmt = tx.prepare_cached(
        "INSERT INTO testwise_coverage_entry (file_report_id, test_name, start_line, line_count) \
         VALUES (?1, ?2, ?3, ?4)",
    )?;

    for file in files {
        file_stmt.execute(params![
            report_id,
            file.path,
            file.line_count,
            file.covered_line_count,
        ])?;
        let file_report_id = tx.last_insert_rowid();

        if mode.is_full() {
            for entry in &file.entries {
                entry_stmt.execute(params![
                    file_report_id,
                    entry.test_name,
                    entry.start_line,
                    entry.line_count,
                ])?;
            }
        }
    }

    Ok(report_id)
}

// ── Query helpers ──────────────────────────────────────────────────────────

fn report_header(row: &Row) -> rusqlite::Result<CoverageReport> {
    let created_at: String = row.get(3)?;
    Ok(CoverageReport {
        id: row.get(0)?,
        result_id: row.get(1)?,
        full: row.get(2)?,
        created_at: parse_ts(3, &created_at)?,
        file_reports: Vec::new(),
    })
}

/// The report for a result, without its file reports.
pub fn get_report_for_result(conn: &Connection, result_id: i64) -> Result<Option<CoverageReport>> {
    Ok(conn
        .query_row(
            "SELECT id, result_id, full, created_at FROM coverage_report WHERE result_id = ?1",
            params![result_id],
            report_header,
        )
        .optional()?)
}

/// A report by id, without its file reports.
pub fn get_report(conn: &Connection, report_id: i64) -> Result<CoverageReport> {
    conn.query_row(
        "SELECT id, result_id, full, created_at FROM coverage_report WHERE id = ?1",
        params![report_id],
        report_header,
    )
    .optional()?
    .ok_or_else(|| NotFound::Report(report_id).into())
}

/// File reports of a report, ordered by path, with empty entry lists.
pub fn get_file_reports(conn: &Connection, report_id: i64) -> Result<Vec<CoverageFileReport>> {
    let mut stmt = conn.prepare(
        "SELECT id, report_id, file_path, line_count, covered_line_count
         FROM coverage_file_report
         WHERE report_id = ?1
         ORDER BY file_path",
    )?;
    let rows = stmt.query_map(params![report_id], |row| {
        Ok(CoverageFileReport {
            id: row.get(0)?,
            report_id: row.get(1)?,
            file_path: row.get(2)?,
            line_count: row.get(3)?,
            covered_line_count: row.get(4)?,
            testwise_coverage_entries: Vec::new(),
        })
    })?;

    let mut result = Vec::new();
    for row in rows {
        result.push(row?);
    }
    Ok(result)
}

fn entry_row(row: &Row) -> rusqlite::Result<TestwiseCoverageEntry> {
    Ok(TestwiseCoverageEntry {
        id: row.get(0)?,
        file_report_id: row.get(1)?,
        test_name: row.get(2)?,
        start_line: row.get(3)?,
        line_count: row.get(4)?,
    })
}

/// Entries of a single file report, ordered by test and start line.
pub fn get_entries(conn: &Connection, file_report_id: i64) -> Result<Vec<TestwiseCoverageEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, file_report_id, test_name, start_line, line_count
         FROM testwise_coverage_entry
         WHERE file_report_id = ?1
         ORDER BY test_name, start_line",
    )?;
    let rows = stmt.query_map(params![file_report_id], entry_row)?;

    let mut result = Vec::new();
    for row in rows {
        result.push(row?);
    }
    Ok(result)
}

/// Attach file reports (and, for `Detail::Full`, their entries) to a report
/// header. Entries are fetched in one query for the whole report.
pub fn hydrate(conn: &Connection, mut report: CoverageReport, detail: Detail) -> Result<CoverageReport> {
    let mut files = get_file_reports(conn, report.id)?;

    if detail == Detail::Full {
        let mut stmt = conn.prepare(
            "SELECT e.id, e.file_report_id, e.test_name, e.start_line, e.line_count
             FROM testwise_coverage_entry e
             JOIN coverage_file_report f ON f.id = e.file_report_id
             WHERE f.report_id = ?1
             ORDER BY e.test_name, e.start_line",
        )?;
        let rows = stmt.query_map(params![report.id], entry_row)?;

        let mut by_file: HashMap<i64, Vec<TestwiseCoverageEntry>> = HashMap::new();
        for row in rows {
            let entry = row?;
            by_file.entry(entry.file_report_id).or_default().push(entry);
        }
        for file in &mut files {
            file.testwise_coverage_entries = by_file.remove(&file.id).unwrap_or_default();
        }
    }

    report.file_reports = files;
    Ok(report)
}

/// Stored report metadata for listings.
#[derive(Debug)]
pub struct ReportInfo {
    pub id: i64,
    pub result_id: i64,
    pub full: bool,
    pub created_at: String,
    pub file_count: u64,
}

/// List all reports in the database, oldest first.
pub fn list_reports(conn: &Connection) -> Result<Vec<ReportInfo>> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.result_id, r.full, r.created_at,
                (SELECT COUNT(*) FROM coverage_file_report WHERE report_id = r.id)
         FROM coverage_report r
         ORDER BY r.created_at, r.id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(ReportInfo {
            id: row.get(0)?,
            result_id: row.get(1)?,
            full: row.get(2)?,
            created_at: row.get(3)?,
            file_count: row.get(4)?,
        })
    })?;
    let mut result = Vec::new();
    for row in rows {
        result.push(row?);
    }
    Ok(result)
}

// ── Deletion ───────────────────────────────────────────────────────────────

fn delete_report_tx(tx: &Transaction, report_id: i64) -> Result<()> {
    tx.execute(
        "DELETE FROM testwise_coverage_entry WHERE file_report_id IN (
             SELECT id FROM coverage_file_report WHERE report_id = ?1
         )",
        params![report_id],
    )?;
    tx.execute(
        "DELETE FROM coverage_file_report WHERE report_id = ?1",
        params![report_id],
    )?;
    tx.execute("DELETE FROM coverage_report WHERE id = ?1", params![report_id])?;
    Ok(())
}

/// Delete a report together with its file reports and their entries.
pub fn delete_report(conn: &mut Connection, report_id: i64) -> Result<()> {
    let tx = conn.transaction()?;
    let exists: Option<i64> = tx
        .query_row(
            "SELECT id FROM coverage_report WHERE id = ?1",
            params![report_id],
            |row| row.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Err(NotFound::Report(report_id).into());
    }
    delete_report_tx(&tx, report_id)?;
    tx.commit()?;
    info!(report_id, "deleted coverage report");
    Ok(())
}

/// Delete one file report and its entries. Sibling file reports stay.
pub fn delete_file_report(conn: &mut Connection, file_report_id: i64) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM testwise_coverage_entry WHERE file_report_id = ?1",
        params![file_report_id],
    )?;
    let deleted = tx.execute(
        "DELETE FROM coverage_file_report WHERE id = ?1",
        params![file_report_id],
    )?;
    if deleted == 0 {
        return Err(NotFound::FileReport(file_report_id).into());
    }
    tx.commit()?;
    debug!(file_report_id, "deleted coverage file report");
    Ok(())
}

// ── Lookup implementations ─────────────────────────────────────────────────

impl ParticipationLookup for Connection {
    fn exercise_exists(&self, exercise_id: i64) -> Result<bool> {
        let count: u32 = self.query_row(
            "SELECT COUNT(*) FROM exercise WHERE id = ?1",
            params![exercise_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn find_solution_participation(
        &self,
        exercise_id: i64,
    ) -> Result<Option<SolutionParticipation>> {
        Ok(self
            .query_row(
                "SELECT id, exercise_id FROM participation
                 WHERE exercise_id = ?1 AND kind = 'solution'",
                params![exercise_id],
                |row| {
                    Ok(SolutionParticipation {
                        id: row.get(0)?,
                        exercise_id: row.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    fn submissions(&self, participation_id: i64) -> Result<Vec<Submission>> {
        let mut stmt = self.prepare(
            "SELECT id, participation_id, submission_date FROM submission
             WHERE participation_id = ?1",
        )?;
        let rows = stmt.query_map(params![participation_id], |row| {
            let date: String = row.get(2)?;
            Ok(Submission {
                id: row.get(0)?,
                participation_id: row.get(1)?,
                submission_date: parse_ts(2, &date)?,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn results(&self, submission_id: i64) -> Result<Vec<SubmissionResult>> {
        let mut stmt = self.prepare(
            "SELECT id, submission_id, assessment_type, completion_date, valid FROM result
             WHERE submission_id = ?1",
        )?;
        let rows = stmt.query_map(params![submission_id], |row| {
            let assessment: String = row.get(2)?;
            let completion: Option<String> = row.get(3)?;
            Ok(SubmissionResult {
                id: row.get(0)?,
                submission_id: row.get(1)?,
                assessment_type: assessment.parse().map_err(|e: CoverageError| {
                    rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
                })?,
                completion_date: completion.as_deref().map(|s| parse_ts(3, s)).transpose()?,
                valid: row.get(4)?,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }
}

impl ReportStore for Connection {
    fn report_for_result(&self, result_id: i64, detail: Detail) -> Result<Option<CoverageReport>> {
        match get_report_for_result(self, result_id)? {
            Some(header) => Ok(Some(hydrate(self, header, detail)?)),
            None => Ok(None),
        }
    }
}
