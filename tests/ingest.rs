mod common;

use twcov::error::CoverageError;
use twcov::ingest;
use twcov::lookup::ReportStore;
use twcov::model::{Detail, ReportMode};

const TRACE: &[u8] = br#"{
    "line_counts": {"Sort.java": 100, "Empty.java": 0, "Untested.java": 15},
    "entries": [
        {"file": "Sort.java", "test": "T1", "start_line": 1, "line_span": 40},
        {"file": "Sort.java", "test": "T2", "start_line": 30, "line_span": 31},
        {"file": "Sort.java", "test": "T3", "start_line": 70, "line_span": 0}
    ]
}"#;

/// Full pipeline: read file from disk, aggregate, build the report.
#[test]
fn ingest_trace_file() {
    let (mut conn, dir, _) = common::setup_db();
    let (_, _, _, result_id) = common::seed_exercise(&mut conn);

    let path = dir.path().join("trace.json");
    std::fs::write(&path, TRACE).unwrap();

    let outcome = ingest::ingest(&mut conn, result_id, &path, ReportMode::Full).unwrap();
    assert!(outcome.report_id > 0);
    assert_eq!(outcome.files, 3);
    assert_eq!(outcome.entries, 2);
    assert_eq!(outcome.line_count, 115);
    assert_eq!(outcome.covered_line_count, 60);

    let report = conn
        .report_for_result(result_id, Detail::Full)
        .unwrap()
        .unwrap();
    let sort = report.file("Sort.java").unwrap();
    assert_eq!(sort.covered_line_count, 60);
    // The zero-length T3 range never reaches storage.
    assert!(sort.testwise_coverage_entries.iter().all(|e| e.test_name != "T3"));

    let empty = report.file("Empty.java").unwrap();
    assert_eq!((empty.line_count, empty.covered_line_count), (0, 0));
    let untested = report.file("Untested.java").unwrap();
    assert_eq!(untested.covered_line_count, 0);
}

#[test]
fn ingest_summary_only() {
    let (mut conn, _dir, _) = common::setup_db();
    let (_, _, _, result_id) = common::seed_exercise(&mut conn);

    let trace = ingest::parse_trace(TRACE).unwrap();
    let outcome =
        ingest::ingest_trace(&mut conn, result_id, &trace, ReportMode::SummaryOnly).unwrap();
    assert_eq!(outcome.entries, 0);
    assert_eq!(outcome.covered_line_count, 60);
    assert_eq!(common::count(&conn, "testwise_coverage_entry"), 0);
}

#[test]
fn ingest_rejects_range_past_end_of_file() {
    let (mut conn, dir, _) = common::setup_db();
    let (_, _, _, result_id) = common::seed_exercise(&mut conn);

    let path = dir.path().join("trace.json");
    std::fs::write(
        &path,
        br#"{"line_counts": {"A.java": 10}, "entries": [
            {"file": "A.java", "test": "T1", "start_line": 8, "line_span": 5}
        ]}"#,
    )
    .unwrap();

    let err = ingest::ingest(&mut conn, result_id, &path, ReportMode::Full).unwrap_err();
    assert!(matches!(err, CoverageError::InvariantViolation(_)));
    assert_eq!(common::count(&conn, "coverage_report"), 0);
}

#[test]
fn ingest_rejects_negative_line_count() {
    let (mut conn, _dir, _) = common::setup_db();
    let (_, _, _, result_id) = common::seed_exercise(&mut conn);

    let trace = ingest::parse_trace(br#"{"line_counts": {"A.java": -4}}"#).unwrap();
    let err = ingest::ingest_trace(&mut conn, result_id, &trace, ReportMode::SummaryOnly)
        .unwrap_err();
    assert!(matches!(err, CoverageError::InvariantViolation(_)));
}

#[test]
fn ingest_malformed_json_fails() {
    let (mut conn, dir, _) = common::setup_db();
    let (_, _, _, result_id) = common::seed_exercise(&mut conn);

    let path = dir.path().join("trace.json");
    std::fs::write(&path, b"not json at all").unwrap();
    let err = ingest::ingest(&mut conn, result_id, &path, ReportMode::Full).unwrap_err();
    assert!(matches!(err, CoverageError::Json(_)));

    let missing = dir.path().join("missing.json");
    let err = ingest::ingest(&mut conn, result_id, &missing, ReportMode::Full).unwrap_err();
    assert!(matches!(err, CoverageError::Io(_)));
}

#[test]
fn ingest_twice_for_same_result_fails() {
    let (mut conn, _dir, _) = common::setup_db();
    let (_, _, _, result_id) = common::seed_exercise(&mut conn);

    let trace = ingest::parse_trace(TRACE).unwrap();
    ingest::ingest_trace(&mut conn, result_id, &trace, ReportMode::Full).unwrap();
    let err = ingest::ingest_trace(&mut conn, result_id, &trace, ReportMode::Full).unwrap_err();
    assert!(matches!(err, CoverageError::ReportAlreadyExists { .. }));
}
