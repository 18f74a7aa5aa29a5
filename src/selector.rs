//! Resolves "the" coverage report of an exercise: the report of the latest
//! valid automatic result of the newest solution submission that has one.

use tracing::debug;

use crate::error::{NotFound, Result};
use crate::lookup::{ParticipationLookup, ReportStore, Submission, SubmissionResult};
use crate::model::{CoverageReport, Detail};

/// The result a report was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub exercise_id: i64,
    pub participation_id: i64,
    pub submission_id: i64,
    pub result_id: i64,
}

/// Newest submission first; equal dates fall back to the higher id.
pub fn sort_newest_first(submissions: &mut [Submission]) {
    submissions.sort_by(|a, b| {
        b.submission_date
            .cmp(&a.submission_date)
            .then(b.id.cmp(&a.id))
    });
}

/// The most recently completed valid automatic result, if any.
pub fn latest_valid_result(results: &[SubmissionResult]) -> Option<&SubmissionResult> {
    results
        .iter()
        .filter(|r| r.is_valid_automatic())
        .max_by(|a, b| {
            a.completion_date
                .cmp(&b.completion_date)
                .then(a.id.cmp(&b.id))
        })
}

/// Pick the result whose coverage represents the exercise.
///
/// Only submissions with at least one automatic result are considered. The
/// newest of those that also has a valid result wins. If none qualify the
/// error says which step came up empty.
pub fn select_result<L>(lookup: &L, exercise_id: i64) -> Result<Selection>
where
    L: ParticipationLookup + ?Sized,
{
    let participation = lookup
        .find_solution_participation(exercise_id)?
        .ok_or(NotFound::SolutionParticipation(exercise_id))?;

    let mut submissions = lookup.submissions(participation.id)?;
    sort_newest_first(&mut submissions);

    let mut newest_with_result = None;
    for submission in &submissions {
        let results = lookup.results(submission.id)?;
        if !results.iter().any(SubmissionResult::is_automatic) {
            continue;
        }
        newest_with_result.get_or_insert(submission.id);

        if let Some(result) = latest_valid_result(&results) {
            return Ok(Selection {
                exercise_id,
                participation_id: participation.id,
                submission_id: submission.id,
                result_id: result.id,
            });
        }
        debug!(
            submission_id = submission.id,
            "submission has no valid automatic result, trying older one"
        );
    }

    Err(match newest_with_result {
        None => NotFound::NoSubmission {
            participation_id: participation.id,
        },
        Some(submission_id) => NotFound::NoResult { submission_id },
    }
    .into())
}

/// Resolve the exercise's report, loaded to `detail`.
///
/// The result id is fixed before the report is read, so a report created
/// for a newer result in the meantime cannot take its place.
pub fn select_report<S>(store: &S, exercise_id: i64, detail: Detail) -> Result<CoverageReport>
where
    S: ParticipationLookup + ReportStore + ?Sized,
{
    let selection = select_result(store, exercise_id)?;
    debug!(?selection, "selected result for coverage report");

    store
        .report_for_result(selection.result_id, detail)?
        .ok_or_else(|| {
            NotFound::NoReport {
                result_id: selection.result_id,
            }
            .into()
        })
}
