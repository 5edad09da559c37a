//! `relic import` command implementations
//!
//! `start` and `resume` drive one run to completion, render progress on
//! stderr and print the run summary as JSON on stdout.

use crate::commands::job_store;
use crate::config::Config;
use crate::error::Result;
use crate::progress;
use crate::{ResumeArgs, RunArgs, StartArgs};
use relic_import::jobs::{JobSettings, RunExecution, RunOptions};
use relic_import::repository::{HttpRepository, MemoryRepository, Repository};
use relic_import::{RunOutcome, RunSummary};
use tracing::info;

/// Configure a job and run it
pub async fn start(config: &Config, args: StartArgs) -> Result<RunOutcome> {
    let store = job_store(config)?;
    let repo = repository(config, args.run.dry_run)?;
    let settings = JobSettings {
        model: Some(args.model),
        access: args.access,
        member_of: args.member_of,
        container: args.container,
        binaries_location: args.binaries_location,
        extract_text_types: args.extract_text_types,
    };

    let mut job = store.job(&args.job_id)?;
    let execution = job.start(repo.as_ref(), settings, run_options(&args.run))?;
    drive(execution).await
}

/// Run a job again with its saved configuration
pub async fn resume(config: &Config, args: ResumeArgs) -> Result<RunOutcome> {
    let store = job_store(config)?;
    let repo = repository(config, args.run.dry_run)?;

    let mut job = store.job(&args.job_id)?;
    let execution = job.resume(repo.as_ref(), run_options(&args.run))?;
    drive(execution).await
}

/// Print a job's configuration, completed count and runs
pub fn status(config: &Config, job_id: &str) -> Result<()> {
    let store = job_store(config)?;
    let job = store.get_job(job_id)?;

    println!("Job:       {}", job.id());
    println!("Directory: {}", job.dir().display());
    println!("Completed: {}", job.completed().len());
    println!();
    println!("Configuration:");
    for line in serde_yaml::to_string(job.config())?.lines() {
        println!("  {line}");
    }
    println!();

    let runs = job.runs()?;
    if runs.is_empty() {
        println!("No runs yet.");
        return Ok(());
    }
    println!("Runs:");
    for run in &runs {
        println!(
            "  {}  invalid: {}  failed: {}",
            run.timestamp(),
            run.invalid_items().len(),
            run.failed_items().len()
        );
    }
    Ok(())
}

fn run_options(args: &RunArgs) -> RunOptions {
    RunOptions {
        limit: args.limit,
        percentage: args.percentage,
        validate_only: args.validate_only,
        import_file: args.import_file.clone(),
    }
}

fn repository(config: &Config, dry_run: bool) -> Result<Box<dyn Repository>> {
    if dry_run {
        info!("Dry run: writing to an in-memory repository");
        return Ok(Box::new(MemoryRepository::with_base(&config.repo_url)));
    }
    let repo = HttpRepository::new(&config.repo_url, config.repo_token.clone(), config.timeout())?;
    Ok(Box::new(repo))
}

async fn drive(execution: RunExecution<'_>) -> Result<RunOutcome> {
    let pb = progress::create_run_progress(execution.counts().total_items as u64);
    let result = execution.run_to_completion(|p| progress::update(&pb, p)).await;
    pb.finish_and_clear();

    let (run, summary) = result?;
    info!(run = %run.timestamp(), outcome = %summary.outcome, "Run complete");
    print_summary(&summary)?;
    Ok(summary.outcome)
}

fn print_summary(summary: &RunSummary) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_run_options_from_args() {
        let args = RunArgs {
            import_file: Some(PathBuf::from("batch.csv")),
            limit: Some(10),
            percentage: Some(20),
            validate_only: true,
            dry_run: true,
        };
        let options = run_options(&args);
        assert_eq!(options.limit, Some(10));
        assert_eq!(options.percentage, Some(20));
        assert!(options.validate_only);
        assert_eq!(options.import_file, Some(PathBuf::from("batch.csv")));
    }

    #[test]
    fn test_http_repository_needs_a_valid_url() {
        let config = Config {
            repo_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(repository(&config, false).is_err());
        assert!(repository(&config, true).is_ok());
    }
}
