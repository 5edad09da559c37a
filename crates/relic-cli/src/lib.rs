//! Relic CLI Library
//!
//! Command-line adapter over the `relic-import` engine.
//!
//! # Overview
//!
//! - **Import**: start a job, resume it, and inspect its runs (`relic import start|resume|status`)
//! - **Jobs**: list the jobs under the configured jobs directory (`relic jobs`)
//!
//! Every run ends with a JSON summary on stdout. The process exits with
//! [`EXIT_INCOMPLETE`] when the run finished but did not succeed, and with 1
//! on a fatal error.

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod commands;
pub mod config;
pub mod error;
pub mod progress;

pub use config::Config;
pub use error::{CliError, Result};

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Exit code for runs that finished as `import_incomplete` or `validate_failed`
pub const EXIT_INCOMPLETE: i32 = 3;

/// Relic - batch import of digital objects into a repository
#[derive(Parser, Debug)]
#[command(name = "relic")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to relic.yml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run and inspect import jobs
    Import {
        #[command(subcommand)]
        command: ImportCommand,
    },

    /// List known jobs
    Jobs,
}

/// Import subcommands
#[derive(Subcommand, Debug)]
pub enum ImportCommand {
    /// Configure a job and run it
    Start(StartArgs),

    /// Run a job again with its saved configuration
    Resume(ResumeArgs),

    /// Show a job's configuration and runs
    Status {
        /// Job identifier
        #[arg(long)]
        job_id: String,
    },
}

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Job identifier
    #[arg(long)]
    pub job_id: String,

    /// Content model of the items
    #[arg(long)]
    pub model: String,

    /// Container path or URI for new items
    #[arg(long)]
    pub container: Option<String>,

    /// Access class IRI for new items
    #[arg(long)]
    pub access: Option<String>,

    /// Collection IRI new items become members of
    #[arg(long)]
    pub member_of: Option<String>,

    /// Where FILES and ITEM_FILES paths are resolved (directory, zip:, ftp:, sftp:, http(s):)
    #[arg(long)]
    pub binaries_location: Option<String>,

    /// Comma-separated MIME types to extract text from
    #[arg(long)]
    pub extract_text_types: Option<String>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args, Debug)]
pub struct ResumeArgs {
    /// Job identifier
    #[arg(long)]
    pub job_id: String,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Per-run options shared by start and resume
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// CSV metadata to store as the job's source
    #[arg(long)]
    pub import_file: Option<PathBuf>,

    /// Stop after this many rows
    #[arg(long)]
    pub limit: Option<usize>,

    /// Import an evenly spaced sample of the rows
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub percentage: Option<u32>,

    /// Validate every row without writing to the repository
    #[arg(long)]
    pub validate_only: bool,

    /// Write to an in-memory repository instead of the configured one
    #[arg(long)]
    pub dry_run: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_start_arguments() {
        let cli = Cli::try_parse_from([
            "relic",
            "import",
            "start",
            "--job-id",
            "batch-1",
            "--model",
            "Item",
            "--container",
            "/objects",
            "--percentage",
            "25",
            "--dry-run",
        ])
        .unwrap();

        let Commands::Import {
            command: ImportCommand::Start(args),
        } = cli.command
        else {
            panic!("expected import start");
        };
        assert_eq!(args.job_id, "batch-1");
        assert_eq!(args.container.as_deref(), Some("/objects"));
        assert_eq!(args.run.percentage, Some(25));
        assert!(args.run.dry_run);
        assert!(!args.run.validate_only);
    }

    #[test]
    fn test_percentage_range() {
        for bad in ["0", "101", "half"] {
            let parsed = Cli::try_parse_from([
                "relic",
                "import",
                "resume",
                "--job-id",
                "batch-1",
                "--percentage",
                bad,
            ]);
            assert!(parsed.is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["relic", "jobs", "--verbose", "--config", "other.yml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("other.yml")));
    }
}
