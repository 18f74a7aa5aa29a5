use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use twcov::cli;
use twcov::config::Settings;
use twcov::db;

/// twcov — Testwise code coverage reports for programming exercises.
#[derive(Parser)]
#[command(name = "twcov", version, about)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage exercises.
    Exercise {
        #[command(subcommand)]
        action: ExerciseAction,
    },

    /// Manage submissions of a participation.
    Submission {
        #[command(subcommand)]
        action: SubmissionAction,
    },

    /// Manage results of a submission.
    Result {
        #[command(subcommand)]
        action: ResultAction,
    },

    /// Build the coverage report of a result from a JSON coverage trace.
    Ingest {
        /// Path to the coverage trace.
        file: PathBuf,

        /// Result the trace belongs to.
        #[arg(long)]
        result: i64,

        /// Keep only per-file counts, discarding per-test entries.
        #[arg(long)]
        summary_only: bool,
    },

    /// Print the latest solution coverage report of an exercise as JSON.
    Report {
        #[arg(long)]
        exercise: i64,

        /// Include per-test entries.
        #[arg(long)]
        full: bool,
    },

    /// Serve a GET path, e.g. /programming-exercises/1/testwise-coverage-report.
    Get {
        path: String,
    },

    /// List per-file coverage of an exercise's latest report.
    Files {
        #[arg(long)]
        exercise: i64,

        /// Sort by coverage rate ascending (show worst files first).
        #[arg(long)]
        sort_by_coverage: bool,
    },

    /// Show which tests cover each line of a file.
    Lines {
        /// The file path as stored in the report.
        file: String,

        #[arg(long)]
        exercise: i64,
    },

    /// List all coverage reports in the database.
    Reports,

    /// Delete a coverage report with all its file reports and entries.
    DeleteReport {
        id: i64,
    },
}

#[derive(Subcommand)]
enum ExerciseAction {
    /// Create an exercise and its solution participation.
    Add {
        #[arg(long)]
        title: String,
    },
}

#[derive(Subcommand)]
enum SubmissionAction {
    /// Record a submission.
    Add {
        #[arg(long)]
        participation: i64,

        /// Submission time (RFC 3339). Defaults to now.
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

#[derive(Subcommand)]
enum ResultAction {
    /// Record a result.
    Add {
        #[arg(long)]
        submission: i64,

        /// Manual assessment instead of an automatic test run.
        #[arg(long)]
        manual: bool,

        /// Mark the result invalid.
        #[arg(long)]
        invalid: bool,

        /// The build has not completed yet.
        #[arg(long, conflicts_with = "completed_at")]
        pending: bool,

        /// Completion time (RFC 3339). Defaults to now.
        #[arg(long)]
        completed_at: Option<DateTime<Utc>>,
    },

    /// Delete a result and its coverage report.
    Delete {
        id: i64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings;
    settings.init_logging().context("Failed to initialize logging")?;

    let mut conn = db::open(&settings.db).context("Failed to open database")?;
    db::init_schema(&conn).context("Failed to initialize schema")?;
    let authorizer = settings.authorizer();

    let output = match cli.command {
        Commands::Exercise {
            action: ExerciseAction::Add { title },
        } => cli::cmd_exercise_add(&mut conn, &title)?,
        Commands::Submission {
            action: SubmissionAction::Add { participation, at },
        } => cli::cmd_submission_add(&conn, participation, at)?,
        Commands::Result { action } => match action {
            ResultAction::Add {
                submission,
                manual,
                invalid,
                pending,
                completed_at,
            } => cli::cmd_result_add(&conn, submission, manual, invalid, pending, completed_at)?,
            ResultAction::Delete { id } => cli::cmd_result_delete(&mut conn, id)?,
        },
        Commands::Ingest {
            file,
            result,
            summary_only,
        } => cli::cmd_ingest(&mut conn, result, &file, summary_only)?,
        Commands::Report { exercise, full } => {
            cli::cmd_report(&conn, &authorizer, exercise, full)?
        }
        Commands::Get { path } => cli::cmd_get(&conn, &authorizer, &path)?,
        Commands::Files {
            exercise,
            sort_by_coverage,
        } => cli::cmd_files(&conn, &authorizer, exercise, sort_by_coverage)?,
        Commands::Lines { file, exercise } => cli::cmd_lines(&conn, &authorizer, exercise, &file)?,
        Commands::Reports => cli::cmd_reports(&conn)?,
        Commands::DeleteReport { id } => cli::cmd_delete_report(&mut conn, id)?,
    };

    print!("{output}");
    Ok(())
}
