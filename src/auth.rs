//! Role checks that gate the report endpoints.

use clap::ValueEnum;

use crate::error::{CoverageError, Result};

/// Course roles, lowest to highest. `Ord` follows privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
pub enum Role {
    Student,
    Tutor,
    Editor,
    Instructor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Tutor => "tutor",
            Role::Editor => "editor",
            Role::Instructor => "instructor",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides whether the caller may act on an exercise. Runs before any
/// coverage lookup.
pub trait Authorizer {
    fn check_has_at_least_role(&self, role: Role, exercise_id: i64) -> Result<()>;
}

/// Grants the same role on every exercise. Used by the CLI, where the role
/// comes from configuration.
#[derive(Debug, Clone, Copy)]
pub struct StaticRole(pub Role);

impl Authorizer for StaticRole {
    fn check_has_at_least_role(&self, role: Role, exercise_id: i64) -> Result<()> {
        if self.0 >= role {
            Ok(())
        } else {
            Err(CoverageError::AccessDenied { role, exercise_id })
        }
    }
}
