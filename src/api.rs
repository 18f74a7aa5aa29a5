//! HTTP-shaped access to the query service: path matching and status codes.
//! Transport is left to the embedder; this only maps a path to a response.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::auth::Authorizer;
use crate::error::{CoverageError, Result};
use crate::lookup::{ParticipationLookup, ReportStore};
use crate::model::CoverageReport;
use crate::service::CoverageService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `GET /programming-exercises/{id}/full-testwise-coverage-report`
    FullReport(i64),
    /// `GET /programming-exercises/{id}/testwise-coverage-report`
    SummaryReport(i64),
}

fn route() -> &'static Regex {
    static ROUTE: OnceLock<Regex> = OnceLock::new();
    ROUTE.get_or_init(|| {
        Regex::new(
            r"^/?(?:api/)?programming-exercises/(\d+)/(full-testwise-coverage-report|testwise-coverage-report)/?$",
        )
        .expect("route pattern is valid")
    })
}

impl Endpoint {
    pub fn parse(path: &str) -> Option<Self> {
        let caps = route().captures(path)?;
        let exercise_id: i64 = caps[1].parse().ok()?;
        match &caps[2] {
            "full-testwise-coverage-report" => Some(Endpoint::FullReport(exercise_id)),
            _ => Some(Endpoint::SummaryReport(exercise_id)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    fn error(status: u16, message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self {
            status,
            body: json!({ "status": status, "message": message }),
        }
    }
}

/// HTTP status for a library error.
#[must_use]
pub fn status_for(err: &CoverageError) -> u16 {
    match err {
        CoverageError::NotFound(_) => 404,
        CoverageError::AccessDenied { .. } => 403,
        CoverageError::ReportAlreadyExists { .. } => 409,
        CoverageError::InvariantViolation(_) => 400,
        _ => 500,
    }
}

fn respond(result: Result<CoverageReport>) -> Response {
    match result.and_then(|report| Ok(serde_json::to_value(report)?)) {
        Ok(body) => Response { status: 200, body },
        Err(err) => {
            let status = status_for(&err);
            if status >= 500 {
                error!(error = %err, "coverage request failed");
            } else {
                debug!(status, error = %err, "coverage request not served");
            }
            Response::error(status, err.to_string())
        }
    }
}

/// Serve a GET request for `path`.
pub fn dispatch<S, A>(service: &CoverageService<'_, S, A>, path: &str) -> Response
where
    S: ParticipationLookup + ReportStore + ?Sized,
    A: Authorizer + ?Sized,
{
    match Endpoint::parse(path) {
        Some(Endpoint::FullReport(id)) => respond(service.get_full_report(id)),
        Some(Endpoint::SummaryReport(id)) => respond(service.get_summary_report(id)),
        None => Response::error(404, format!("No endpoint for {path}")),
    }
}
