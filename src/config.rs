//! Runtime settings shared by every command, resolved from flags and
//! environment variables.

use std::path::PathBuf;

use clap::Args;
use tracing_subscriber::EnvFilter;

use crate::auth::{Role, StaticRole};

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Path to the SQLite database.
    #[arg(long, global = true, env = "TWCOV_DB", default_value = ".twcov.db")]
    pub db: PathBuf,

    /// Role of the caller on every exercise.
    #[arg(long, global = true, env = "TWCOV_ROLE", value_enum, default_value_t = Role::Editor)]
    pub role: Role,

    /// Log filter, e.g. "info" or "twcov=debug".
    #[arg(long = "log", global = true, env = "TWCOV_LOG", default_value = "warn")]
    pub log_filter: String,
}

impl Settings {
    pub fn authorizer(&self) -> StaticRole {
        StaticRole(self.role)
    }

    /// Install the global tracing subscriber, writing to stderr.
    pub fn init_logging(&self) -> anyhow::Result<()> {
        let filter = EnvFilter::try_new(&self.log_filter)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))
    }
}
