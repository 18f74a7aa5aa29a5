mod common;

use twcov::db::{self, NewResult};
use twcov::error::{CoverageError, NotFound};
use twcov::lookup::{AssessmentType, ReportStore};
use twcov::model::{Detail, ReportMode};
use twcov::selector;

fn not_found<T: std::fmt::Debug>(res: twcov::error::Result<T>) -> NotFound {
    match res {
        Err(CoverageError::NotFound(nf)) => nf,
        other => panic!("expected not-found, got {other:?}"),
    }
}

#[test]
fn newer_submission_report_is_selected() {
    let (mut conn, _dir, _) = common::setup_db();
    let (exercise_id, participation_id) = db::insert_exercise(&mut conn, "Sorting").unwrap();

    let s1 = db::insert_submission(&conn, participation_id, &common::at(0)).unwrap();
    let r1 = common::automatic_result(&conn, s1, 1, true);
    let s2 = db::insert_submission(&conn, participation_id, &common::at(10)).unwrap();
    let r2 = common::automatic_result(&conn, s2, 11, true);

    db::insert_coverage_report(&mut conn, r1, &common::sample_files(), ReportMode::Full).unwrap();
    let newer =
        db::insert_coverage_report(&mut conn, r2, &common::sample_files(), ReportMode::Full)
            .unwrap();

    let report = selector::select_report(&conn, exercise_id, Detail::Summary).unwrap();
    assert_eq!(report.id, newer);
    assert_eq!(report.result_id, r2);
}

#[test]
fn invalid_newer_result_falls_back() {
    let (mut conn, _dir, _) = common::setup_db();
    let (exercise_id, participation_id) = db::insert_exercise(&mut conn, "Sorting").unwrap();

    let s1 = db::insert_submission(&conn, participation_id, &common::at(0)).unwrap();
    let r1 = common::automatic_result(&conn, s1, 1, true);
    let s2 = db::insert_submission(&conn, participation_id, &common::at(10)).unwrap();
    common::automatic_result(&conn, s2, 11, false);

    let older =
        db::insert_coverage_report(&mut conn, r1, &common::sample_files(), ReportMode::Full)
            .unwrap();

    let report = selector::select_report(&conn, exercise_id, Detail::Full).unwrap();
    assert_eq!(report.id, older);
}

#[test]
fn submission_order_follows_date_not_insertion() {
    let (mut conn, _dir, _) = common::setup_db();
    let (exercise_id, participation_id) = db::insert_exercise(&mut conn, "Sorting").unwrap();

    // Inserted second, but submitted earlier.
    let late = db::insert_submission(&conn, participation_id, &common::at(30)).unwrap();
    let early = db::insert_submission(&conn, participation_id, &common::at(5)).unwrap();
    common::automatic_result(&conn, late, 31, true);
    common::automatic_result(&conn, early, 6, true);

    let selection = selector::select_result(&conn, exercise_id).unwrap();
    assert_eq!(selection.submission_id, late);
}

#[test]
fn latest_valid_result_of_submission_is_used() {
    let (mut conn, _dir, _) = common::setup_db();
    let (exercise_id, participation_id) = db::insert_exercise(&mut conn, "Sorting").unwrap();
    let s = db::insert_submission(&conn, participation_id, &common::at(0)).unwrap();

    common::automatic_result(&conn, s, 1, true);
    let latest = common::automatic_result(&conn, s, 5, true);
    common::automatic_result(&conn, s, 9, false);
    db::insert_result(
        &conn,
        &NewResult {
            submission_id: s,
            assessment_type: AssessmentType::Manual,
            completion_date: Some(common::at(20)),
            valid: true,
        },
    )
    .unwrap();

    assert_eq!(
        selector::select_result(&conn, exercise_id).unwrap().result_id,
        latest
    );
}

#[test]
fn absence_is_reported_per_step() {
    let (mut conn, _dir, _) = common::setup_db();
    let (exercise_id, participation_id) = db::insert_exercise(&mut conn, "Sorting").unwrap();

    assert_eq!(
        not_found(selector::select_report(&conn, exercise_id, Detail::Full)),
        NotFound::NoSubmission { participation_id }
    );

    let s = db::insert_submission(&conn, participation_id, &common::at(0)).unwrap();
    common::automatic_result(&conn, s, 1, false);
    assert_eq!(
        not_found(selector::select_report(&conn, exercise_id, Detail::Full)),
        NotFound::NoResult { submission_id: s }
    );

    let r = common::automatic_result(&conn, s, 2, true);
    assert_eq!(
        not_found(selector::select_report(&conn, exercise_id, Detail::Full)),
        NotFound::NoReport { result_id: r }
    );

    assert_eq!(
        not_found(selector::select_report(&conn, exercise_id + 1, Detail::Full)),
        NotFound::SolutionParticipation(exercise_id + 1)
    );
}

#[test]
fn report_created_after_selection_does_not_replace_it() {
    let (mut conn, _dir, _) = common::setup_db();
    let (exercise_id, participation_id, submission_id, r1) = common::seed_exercise(&mut conn);
    let first =
        db::insert_coverage_report(&mut conn, r1, &common::sample_files(), ReportMode::Full)
            .unwrap();

    let selection = selector::select_result(&conn, exercise_id).unwrap();

    // A newer result and its report land between selection and fetch.
    let s2 = db::insert_submission(&conn, participation_id, &common::at(60)).unwrap();
    let r2 = common::automatic_result(&conn, s2, 61, true);
    db::insert_coverage_report(&mut conn, r2, &common::sample_files(), ReportMode::Full).unwrap();

    assert_eq!(selection.submission_id, submission_id);
    let report = conn
        .report_for_result(selection.result_id, Detail::Summary)
        .unwrap()
        .unwrap();
    assert_eq!(report.id, first);
}
