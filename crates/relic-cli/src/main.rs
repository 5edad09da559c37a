//! Relic CLI - Main entry point

use clap::Parser;
use relic_cli::{commands, Cli, Commands, Config, ImportCommand, EXIT_INCOMPLETE};
use relic_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { LogLevel::Debug } else { LogLevel::Info };
    let log_config = LogConfig::builder()
        .level(level)
        .output(LogOutput::Console)
        .log_file_prefix("relic-cli")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The CLI works without logging
    let guard = init_logging(&log_config).ok();

    let code = match execute_command(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            1
        },
    };

    // Flush file logs before exiting
    drop(guard);
    process::exit(code);
}

/// Execute the CLI command and return the process exit code
async fn execute_command(cli: Cli) -> relic_cli::Result<i32> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Import { command } => match command {
            ImportCommand::Start(args) => commands::import::start(&config, args).await.map(exit_code),
            ImportCommand::Resume(args) => commands::import::resume(&config, args).await.map(exit_code),
            ImportCommand::Status { job_id } => commands::import::status(&config, &job_id).map(|_| 0),
        },

        Commands::Jobs => commands::jobs::run(&config).map(|_| 0),
    }
}

fn exit_code(outcome: relic_import::RunOutcome) -> i32 {
    if outcome.is_success() {
        0
    } else {
        EXIT_INCOMPLETE
    }
}
