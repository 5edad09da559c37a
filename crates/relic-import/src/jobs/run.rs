//! Run controller
//!
//! A run moves through fresh, running and finished. While running it is
//! driven one row at a time through [`RunExecution::next_progress`]; the
//! terminal [`RunSummary`] only becomes available once every row has been
//! consumed.

use super::row::{ImportContext, ImportRow, ItemStatus};
use super::ImportJob;
use crate::error::{ImportError, Result};
use crate::ledger::{CompletedItem, DroppedItem, ItemLedger};
use crate::metadata::{InvalidRow, MetadataRows, MetadataSpreadsheet, Row, RowEntry, RowSelection};
use crate::model::ValidationResults;
use crate::repository::Repository;
use relic_common::timestamp::{iso_timestamp_now, run_timestamp_now};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

pub const INVALID_LOG: &str = "dropped-invalid.log.csv";
pub const FAILED_LOG: &str = "dropped-failed.log.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Fresh,
    Running,
    Finished,
}

/// Per-run overrides accepted by both start and resume
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub limit: Option<usize>,
    pub percentage: Option<u32>,
    pub validate_only: bool,
    /// Metadata to store as the job's source before reading any row
    pub import_file: Option<PathBuf>,
}

/// Running counters of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub total_items: usize,
    pub rows: usize,
    pub files: usize,
    pub valid_items: usize,
    pub invalid_items: usize,
    pub created_items: usize,
    pub updated_items: usize,
    pub unchanged_items: usize,
    /// Committed rows that needed no write
    pub skipped_items: usize,
    pub errors: usize,
    /// Completed-ledger size when the run started
    pub initially_completed_items: usize,
    /// Rows passed over because an earlier run completed them
    pub already_completed: usize,
}

/// Snapshot yielded after each row
#[derive(Debug, Clone, PartialEq)]
pub struct RunProgress {
    pub elapsed: Duration,
    pub counts: RunCounts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    ValidateSuccess,
    ValidateFailed,
    ImportComplete,
    ImportIncomplete,
}

impl RunOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            RunOutcome::ValidateSuccess => "validate_success",
            RunOutcome::ValidateFailed => "validate_failed",
            RunOutcome::ImportComplete => "import_complete",
            RunOutcome::ImportIncomplete => "import_incomplete",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, RunOutcome::ValidateSuccess | RunOutcome::ImportComplete)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation results of one row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub line: String,
    pub identifier: String,
    pub passed: bool,
    pub results: ValidationResults,
}

/// Terminal result of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run: String,
    #[serde(rename = "type")]
    pub outcome: RunOutcome,
    pub counts: RunCounts,
    pub validation: Vec<ValidationReport>,
}

/// One execution attempt of a job
#[derive(Debug)]
pub struct ImportRun {
    timestamp: String,
    dir: PathBuf,
    state: RunState,
    invalid: ItemLedger<DroppedItem>,
    failed: ItemLedger<DroppedItem>,
}

impl ImportRun {
    /// A fresh run stamped with the current time; nothing is created on disk
    pub(crate) fn new(job_dir: &Path) -> Result<Self> {
        Self::at(job_dir, &run_timestamp_now(), RunState::Fresh)
    }

    /// A past run, for inspection only
    pub fn load(job_dir: &Path, timestamp: &str) -> Result<Self> {
        let dir = job_dir.join(timestamp);
        if !dir.is_dir() {
            return Err(ImportError::RunNotFound(timestamp.to_string()));
        }
        Self::at(job_dir, timestamp, RunState::Finished)
    }

    fn at(job_dir: &Path, timestamp: &str, state: RunState) -> Result<Self> {
        let dir = job_dir.join(timestamp);
        Ok(Self {
            timestamp: timestamp.to_string(),
            invalid: ItemLedger::open(dir.join(INVALID_LOG))?,
            failed: ItemLedger::open(dir.join(FAILED_LOG))?,
            dir,
            state,
        })
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn invalid_items(&self) -> &ItemLedger<DroppedItem> {
        &self.invalid
    }

    pub fn failed_items(&self) -> &ItemLedger<DroppedItem> {
        &self.failed
    }

    /// Prepare the run and hand back its row-by-row execution.
    ///
    /// Everything that can make the whole run fail is checked here, before
    /// the first row is read.
    pub fn run<'a>(
        mut self,
        job: &'a mut ImportJob,
        repo: &'a dyn Repository,
        options: RunOptions,
    ) -> Result<RunExecution<'a>> {
        if self.state != RunState::Fresh {
            return Err(ImportError::RunAlreadyStarted);
        }

        let config = job.config();
        let model_name = config
            .model
            .clone()
            .ok_or_else(|| ImportError::job_config("No model configured for job"))?;
        if !options.validate_only && config.container.is_none() {
            return Err(ImportError::job_config("Must specify a container for new items"));
        }

        let model = job.models().get(&model_name)?;

        if let Some(import_file) = &options.import_file {
            job.store_metadata_file(import_file)?;
        }

        let spreadsheet = MetadataSpreadsheet::open(job.metadata_path(), model)?;
        if spreadsheet.has_binaries() && job.config().binaries_location.is_none() {
            return Err(ImportError::MissingBinariesLocation);
        }

        std::fs::create_dir(&self.dir)?;
        self.state = RunState::Running;
        info!(job_id = %job.id(), run = %self.timestamp, "Created run directory {}", self.dir.display());

        let rows = spreadsheet.rows(RowSelection {
            limit: options.limit,
            percentage: options.percentage,
        })?;
        let counts = RunCounts {
            total_items: spreadsheet.total(),
            initially_completed_items: job.completed().len(),
            ..Default::default()
        };
        info!(
            job_id = %job.id(),
            total = counts.total_items,
            completed = counts.initially_completed_items,
            "{} of {} items already completed",
            counts.initially_completed_items,
            counts.total_items
        );

        let context = ImportContext::new(job.config(), job.resolver().clone());
        Ok(RunExecution {
            job,
            repo,
            run: self,
            rows,
            context,
            validate_only: options.validate_only,
            counts,
            reports: Vec::new(),
            started: Instant::now(),
            exhausted: false,
        })
    }

    fn drop_invalid(&mut self, item: DroppedItem) -> Result<()> {
        warn!(id = %item.id, reason = %item.reason, "Dropping invalid item");
        self.invalid.append(&item)
    }

    fn drop_failed(&mut self, item: DroppedItem) -> Result<()> {
        warn!(id = %item.id, reason = %item.reason, "Dropping failed item");
        self.failed.append(&item)
    }
}

/// A run in progress.
///
/// Rows are processed strictly in order, one per call to
/// [`next_progress`](Self::next_progress). Dropping the execution early
/// leaves the job resumable.
pub struct RunExecution<'a> {
    job: &'a mut ImportJob,
    repo: &'a dyn Repository,
    run: ImportRun,
    rows: MetadataRows,
    context: ImportContext,
    validate_only: bool,
    counts: RunCounts,
    reports: Vec<ValidationReport>,
    started: Instant,
    exhausted: bool,
}

impl<'a> RunExecution<'a> {
    pub fn run(&self) -> &ImportRun {
        &self.run
    }

    pub fn counts(&self) -> &RunCounts {
        &self.counts
    }

    /// Process the next row and report the counters, or `None` once the
    /// rows are exhausted
    pub async fn next_progress(&mut self) -> Result<Option<RunProgress>> {
        if self.exhausted {
            return Ok(None);
        }

        let completed = self.job.completed();
        let entry = self.rows.next_with(|id| completed.contains(id))?;
        self.counts.already_completed = self.rows.skipped_completed();

        match entry {
            None => {
                self.exhausted = true;
                return Ok(None);
            },
            Some(RowEntry::Invalid(invalid)) => self.record_invalid_row(invalid)?,
            Some(RowEntry::Valid(row)) => self.process(row).await?,
        }

        Ok(Some(RunProgress {
            elapsed: self.started.elapsed(),
            counts: self.counts,
        }))
    }

    fn record_invalid_row(&mut self, invalid: InvalidRow) -> Result<()> {
        self.counts.rows += 1;
        self.counts.invalid_items += 1;
        self.run.drop_invalid(DroppedItem {
            id: invalid.line_reference.to_string(),
            timestamp: iso_timestamp_now(),
            reason: invalid.reason,
            ..Default::default()
        })
    }

    async fn process(&mut self, row: Row) -> Result<()> {
        self.counts.rows += 1;
        self.counts.files += row.filenames.len() + row.item_filenames.len();
        let line = row.line_reference.to_string();
        let identifier = row.identifier();

        let mut import_row = match ImportRow::new(row, &self.context, self.repo, self.validate_only).await {
            Ok(import_row) => import_row,
            Err(e) => {
                error!(%line, %identifier, "{}", e);
                self.counts.errors += 1;
                return self.run.drop_failed(DroppedItem {
                    id: identifier,
                    timestamp: iso_timestamp_now(),
                    reason: e.message,
                    ..Default::default()
                });
            },
        };

        let results = import_row.validate().await?;
        let title = import_row.item().title().unwrap_or_default().to_string();
        let uri = if import_row.item().is_new() {
            String::new()
        } else {
            import_row.item().uri().to_string()
        };

        if !results.ok() {
            let reason = format!("Validation failures: {}", results.failure_summary());
            info!(%line, %identifier, "Item is invalid: {}", reason);
            self.counts.invalid_items += 1;
            self.reports.push(ValidationReport {
                line,
                identifier: identifier.clone(),
                passed: false,
                results,
            });
            return self.run.drop_invalid(DroppedItem {
                id: identifier,
                timestamp: iso_timestamp_now(),
                title,
                uri,
                reason,
            });
        }

        info!(%line, %identifier, "Item is valid");
        self.counts.valid_items += 1;
        if self.validate_only {
            self.reports.push(ValidationReport {
                line,
                identifier,
                passed: true,
                results,
            });
            return Ok(());
        }

        match import_row.commit().await {
            Ok(status) => {
                match status {
                    ItemStatus::Created => self.counts.created_items += 1,
                    ItemStatus::Modified => self.counts.updated_items += 1,
                    ItemStatus::Unchanged => {
                        self.counts.unchanged_items += 1;
                        self.counts.skipped_items += 1;
                    },
                }
                let entry = CompletedItem {
                    id: identifier,
                    timestamp: iso_timestamp_now(),
                    title,
                    uri: import_row.item().uri().to_string(),
                    status: status.to_string(),
                };
                self.job.complete(&entry)
            },
            Err(e) => {
                match &e.cause {
                    Some(cause) => error!(%line, %identifier, cause = %cause, "{}", e),
                    None => error!(%line, %identifier, "{}", e),
                }
                self.counts.errors += 1;
                self.run.drop_failed(DroppedItem {
                    id: identifier,
                    timestamp: iso_timestamp_now(),
                    title,
                    uri,
                    reason: e.message,
                })
            },
        }
    }

    fn outcome(&self) -> RunOutcome {
        if self.validate_only {
            if self.counts.invalid_items == 0 {
                RunOutcome::ValidateSuccess
            } else {
                RunOutcome::ValidateFailed
            }
        } else if self.job.completed().len() == self.counts.total_items {
            RunOutcome::ImportComplete
        } else {
            RunOutcome::ImportIncomplete
        }
    }

    /// Terminal summary; fails until the rows are exhausted
    pub fn summary(&self) -> Result<RunSummary> {
        if !self.exhausted {
            return Err(ImportError::RunNotFinished);
        }
        Ok(RunSummary {
            run: self.run.timestamp.clone(),
            outcome: self.outcome(),
            counts: self.counts,
            validation: self.reports.clone(),
        })
    }

    /// Close the run and return it with its summary
    pub fn finish(mut self) -> Result<(ImportRun, RunSummary)> {
        let summary = self.summary()?;
        self.run.state = RunState::Finished;
        info!(
            job_id = %self.job.id(),
            run = %self.run.timestamp,
            outcome = %summary.outcome,
            "Run finished"
        );
        Ok((self.run, summary))
    }

    /// Drive every row, passing each snapshot to `on_progress`
    pub async fn run_to_completion(
        mut self,
        mut on_progress: impl FnMut(&RunProgress),
    ) -> Result<(ImportRun, RunSummary)> {
        while let Some(progress) = self.next_progress().await? {
            on_progress(&progress);
        }
        self.finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::files::SourceResolver;
    use crate::jobs::JobSettings;
    use crate::model::ModelRegistry;
    use crate::repository::MemoryRepository;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn job(dir: &TempDir) -> ImportJob {
        ImportJob::new(
            "run-tests",
            dir.path(),
            Arc::new(ModelRegistry::with_defaults()),
            SourceResolver::new(),
        )
        .unwrap()
    }

    fn write_csv(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("upload.csv");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn options(import_file: PathBuf) -> RunOptions {
        RunOptions {
            import_file: Some(import_file),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_summary_only_after_exhaustion() {
        let dir = TempDir::new().unwrap();
        let csv = write_csv(&dir, "Identifier,Title\nid-1,One\nid-2,Two\n");
        let repo = MemoryRepository::new();
        let mut job = job(&dir);

        let mut execution = job
            .start(&repo, JobSettings::new("Item").container("/objects"), options(csv))
            .unwrap();
        let first = execution.next_progress().await.unwrap().unwrap();
        assert_eq!(first.counts.rows, 1);
        assert!(matches!(execution.summary(), Err(ImportError::RunNotFinished)));

        let (run, summary) = execution.run_to_completion(|_| {}).await.unwrap();
        assert_eq!(run.state(), RunState::Finished);
        assert_eq!(summary.outcome, RunOutcome::ImportComplete);
        assert_eq!(summary.counts.created_items, 2);
        assert_eq!(job.completed().len(), 2);
    }

    #[tokio::test]
    async fn test_early_finish_is_rejected() {
        let dir = TempDir::new().unwrap();
        let csv = write_csv(&dir, "Identifier,Title\nid-1,One\n");
        let repo = MemoryRepository::new();
        let mut job = job(&dir);

        let execution = job
            .start(&repo, JobSettings::new("Item").container("/objects"), options(csv))
            .unwrap();
        assert!(matches!(execution.finish(), Err(ImportError::RunNotFinished)));
    }

    #[tokio::test]
    async fn test_loaded_run_cannot_run_again() {
        let dir = TempDir::new().unwrap();
        let csv = write_csv(&dir, "Identifier,Title\nid-1,One\n");
        let repo = MemoryRepository::new();
        let mut job = job(&dir);
        let (run, _) = job
            .start(&repo, JobSettings::new("Item").container("/objects"), options(csv))
            .unwrap()
            .run_to_completion(|_| {})
            .await
            .unwrap();

        let err = run.run(&mut job, &repo, RunOptions::default()).err().unwrap();
        assert!(matches!(err, ImportError::RunAlreadyStarted));

        let loaded = job.latest_run().unwrap().unwrap();
        assert_eq!(loaded.state(), RunState::Finished);
        let err = loaded.run(&mut job, &repo, RunOptions::default()).err().unwrap();
        assert!(matches!(err, ImportError::RunAlreadyStarted));
    }

    #[tokio::test]
    async fn test_invalid_rows_skip_validation() {
        let dir = TempDir::new().unwrap();
        let csv = write_csv(&dir, "Identifier,Title\nid-1,One\nid-2,Two,extra\nid-3,\n");
        let repo = MemoryRepository::new();
        let mut job = job(&dir);

        let (run, summary) = job
            .start(&repo, JobSettings::new("Item").container("/objects"), options(csv))
            .unwrap()
            .run_to_completion(|_| {})
            .await
            .unwrap();

        assert_eq!(summary.counts.rows, 3);
        assert_eq!(summary.counts.valid_items, 1);
        assert_eq!(summary.counts.invalid_items, 2);
        assert_eq!(summary.outcome, RunOutcome::ImportIncomplete);

        let reasons: Vec<String> = run
            .invalid_items()
            .entries()
            .unwrap()
            .into_iter()
            .map(|item| item.reason)
            .collect();
        assert!(reasons[0].starts_with("Wrong number of columns"));
        assert_eq!(reasons[1], "Validation failures: title is required");
        assert_eq!(summary.validation.len(), 1);
    }

    #[tokio::test]
    async fn test_binaries_require_location() {
        let dir = TempDir::new().unwrap();
        let csv = write_csv(&dir, "Identifier,Title,FILES\nid-1,One,p1.tif\n");
        let repo = MemoryRepository::new();
        let mut job = job(&dir);

        let err = job
            .start(&repo, JobSettings::new("Item").container("/objects"), options(csv))
            .err()
            .unwrap();
        assert!(matches!(err, ImportError::MissingBinariesLocation));
        assert_eq!(repo.counts().transactions, 0);
        assert!(job.runs().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_model_is_required() {
        let dir = TempDir::new().unwrap();
        let csv = write_csv(&dir, "Identifier,Title\nid-1,One\n");
        let repo = MemoryRepository::new();
        let mut job = job(&dir);

        let err = job.start(&repo, JobSettings::default(), options(csv)).err().unwrap();
        assert!(matches!(err, ImportError::JobConfig(_)));
        assert!(!job.dir().exists());
    }

    #[tokio::test]
    async fn test_container_is_required_before_anything_is_saved() {
        let dir = TempDir::new().unwrap();
        let csv = write_csv(&dir, "Identifier,Title\nid-1,One\n");
        let repo = MemoryRepository::new();
        let mut job = job(&dir);

        let err = job.start(&repo, JobSettings::new("Item"), options(csv.clone())).err().unwrap();
        assert!(matches!(err, ImportError::JobConfig(ref msg) if msg.contains("container")));
        assert!(!job.dir().exists());
        assert!(!job.config_path().is_file());

        // validate-only runs never create items
        let mut execution = job
            .start(
                &repo,
                JobSettings::new("Item"),
                RunOptions {
                    validate_only: true,
                    ..options(csv)
                },
            )
            .unwrap();
        while execution.next_progress().await.unwrap().is_some() {}
        assert!(job.config_path().is_file());
    }

    #[tokio::test]
    async fn test_unknown_model_leaves_no_run_directory() {
        let dir = TempDir::new().unwrap();
        let csv = write_csv(&dir, "Identifier,Title\nid-1,One\n");
        let repo = MemoryRepository::new();
        let mut job = job(&dir);

        let err = job
            .start(&repo, JobSettings::new("Nonesuch").container("/objects"), options(csv))
            .err()
            .unwrap();
        assert!(!matches!(err, ImportError::RunAlreadyStarted));
        assert!(job.runs().unwrap().is_empty());
        assert!(job.latest_run().unwrap().is_none());
    }
}
