//! Read interfaces the report selector depends on: exercise/participation
//! bookkeeping on one side, stored coverage reports on the other. The SQLite
//! implementations live in `db`.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{CoverageReport, Detail};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolutionParticipation {
    pub id: i64,
    pub exercise_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub id: i64,
    pub participation_id: i64,
    pub submission_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssessmentType {
    Automatic,
    SemiAutomatic,
    Manual,
}

impl AssessmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentType::Automatic => "automatic",
            AssessmentType::SemiAutomatic => "semi_automatic",
            AssessmentType::Manual => "manual",
        }
    }
}

impl std::str::FromStr for AssessmentType {
    type Err = crate::error::CoverageError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "automatic" => Ok(AssessmentType::Automatic),
            "semi_automatic" => Ok(AssessmentType::SemiAutomatic),
            "manual" => Ok(AssessmentType::Manual),
            _ => Err(crate::error::CoverageError::Other(format!(
                "Unknown assessment type: '{s}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionResult {
    pub id: i64,
    pub submission_id: i64,
    pub assessment_type: AssessmentType,
    /// `None` while the build is still running.
    pub completion_date: Option<DateTime<Utc>>,
    pub valid: bool,
}

impl SubmissionResult {
    #[must_use]
    pub fn is_automatic(&self) -> bool {
        self.assessment_type == AssessmentType::Automatic
    }

    /// A finished, valid, automatic result: the only kind coverage is read from.
    #[must_use]
    pub fn is_valid_automatic(&self) -> bool {
        self.is_automatic() && self.valid && self.completion_date.is_some()
    }
}

pub trait ParticipationLookup {
    fn exercise_exists(&self, exercise_id: i64) -> Result<bool>;

    fn find_solution_participation(&self, exercise_id: i64)
        -> Result<Option<SolutionParticipation>>;

    /// All submissions of a participation, in any order.
    fn submissions(&self, participation_id: i64) -> Result<Vec<Submission>>;

    /// All results of a submission, in any order.
    fn results(&self, submission_id: i64) -> Result<Vec<SubmissionResult>>;
}

pub trait ReportStore {
    /// The report built for `result_id`, loaded to the requested detail.
    fn report_for_result(&self, result_id: i64, detail: Detail) -> Result<Option<CoverageReport>>;
}
