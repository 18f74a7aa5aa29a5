#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use std::path::PathBuf;
use tempfile::TempDir;

use twcov::aggregate::{aggregate_file, FileAggregate, TestRange};
use twcov::db::{self, NewResult};
use twcov::lookup::AssessmentType;

/// Create a fresh temporary database, returning the connection, dir handle, and db path.
/// The caller must hold onto `TempDir` to keep the temp directory alive.
pub fn setup_db() -> (Connection, TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let conn = db::open(&db_path).unwrap();
    db::init_schema(&conn).unwrap();
    (conn, dir, db_path)
}

pub fn at(minutes: i64) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-05-01T08:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
        + Duration::minutes(minutes)
}

pub fn automatic_result(conn: &Connection, submission_id: i64, minutes: i64, valid: bool) -> i64 {
    db::insert_result(
        conn,
        &NewResult {
            submission_id,
            assessment_type: AssessmentType::Automatic,
            completion_date: Some(at(minutes)),
            valid,
        },
    )
    .unwrap()
}

pub fn range(test: &str, start_line: i64, line_span: i64) -> TestRange {
    TestRange {
        test: test.to_string(),
        start_line,
        line_span,
    }
}

/// `Sort.java` (100 lines, T1 1-40, T2 30-60) and `Util.java` (20 lines, T1 5-9).
pub fn sample_files() -> Vec<FileAggregate> {
    vec![
        aggregate_file(
            "Sort.java",
            100,
            &[range("T1", 1, 40), range("T2", 30, 31)],
        )
        .unwrap(),
        aggregate_file("Util.java", 20, &[range("T1", 5, 5)]).unwrap(),
    ]
}

/// An exercise with one submission and one valid automatic result.
/// Returns (exercise_id, participation_id, submission_id, result_id).
pub fn seed_exercise(conn: &mut Connection) -> (i64, i64, i64, i64) {
    let (exercise_id, participation_id) = db::insert_exercise(conn, "Sorting").unwrap();
    let submission_id = db::insert_submission(conn, participation_id, &at(0)).unwrap();
    let result_id = automatic_result(conn, submission_id, 1, true);
    (exercise_id, participation_id, submission_id, result_id)
}

pub fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .unwrap()
}
