//! The two read operations exposed to callers. Authorization runs first;
//! everything after that is delegated to the selector.

use tracing::debug;

use crate::auth::{Authorizer, Role};
use crate::error::{NotFound, Result};
use crate::lookup::{ParticipationLookup, ReportStore};
use crate::model::{CoverageReport, Detail};
use crate::selector;

/// Role needed to read coverage reports of an exercise.
pub const REQUIRED_ROLE: Role = Role::Editor;

pub struct CoverageService<'a, S: ?Sized, A: ?Sized> {
    store: &'a S,
    authorizer: &'a A,
}

impl<'a, S, A> CoverageService<'a, S, A>
where
    S: ParticipationLookup + ReportStore + ?Sized,
    A: Authorizer + ?Sized,
{
    pub fn new(store: &'a S, authorizer: &'a A) -> Self {
        Self { store, authorizer }
    }

    /// Latest solution coverage report with every file report and entry.
    pub fn get_full_report(&self, exercise_id: i64) -> Result<CoverageReport> {
        debug!(exercise_id, "request to get full coverage report");
        self.authorize(exercise_id)?;
        selector::select_report(self.store, exercise_id, Detail::Full)
    }

    /// Latest solution coverage report with per-file counts only. Entries are
    /// never included, even when the report retained them.
    pub fn get_summary_report(&self, exercise_id: i64) -> Result<CoverageReport> {
        debug!(exercise_id, "request to get coverage report summary");
        self.authorize(exercise_id)?;
        let report = selector::select_report(self.store, exercise_id, Detail::Summary)?;
        Ok(report.without_entries())
    }

    fn authorize(&self, exercise_id: i64) -> Result<()> {
        if !self.store.exercise_exists(exercise_id)? {
            return Err(NotFound::Exercise(exercise_id).into());
        }
        self.authorizer
            .check_has_at_least_role(REQUIRED_ROLE, exercise_id)
    }
}
