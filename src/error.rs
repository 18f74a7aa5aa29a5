use thiserror::Error;

use crate::auth::Role;

/// Expected absences. These surface to callers as "nothing there" rather
/// than as failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotFound {
    #[error("Exercise {0} not found")]
    Exercise(i64),

    #[error("Exercise {0} has no solution participation")]
    SolutionParticipation(i64),

    #[error("No submission with an automatic result for participation {participation_id}")]
    NoSubmission { participation_id: i64 },

    #[error("No valid automatic result for submission {submission_id}")]
    NoResult { submission_id: i64 },

    #[error("No coverage report for result {result_id}")]
    NoReport { result_id: i64 },

    #[error("Result {0} not found")]
    Result(i64),

    #[error("Coverage report {0} not found")]
    Report(i64),

    #[error("Coverage file report {0} not found")]
    FileReport(i64),
}

#[derive(Error, Debug)]
pub enum CoverageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    NotFound(#[from] NotFound),

    #[error("A coverage report already exists for result {result_id}")]
    ReportAlreadyExists { result_id: i64 },

    #[error("Invalid coverage data: {0}")]
    InvariantViolation(String),

    #[error("Access denied: role {role} required for exercise {exercise_id}")]
    AccessDenied { role: Role, exercise_id: i64 },

    #[error("{0}")]
    Other(String),
}

impl CoverageError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoverageError::NotFound(_))
    }

    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        CoverageError::InvariantViolation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CoverageError>;
