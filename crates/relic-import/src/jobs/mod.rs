//! Jobs and runs
//!
//! A job owns a directory under the jobs root:
//!
//! ```text
//! <jobs-root>/<escaped-job-id>/
//!     config.yml
//!     source.csv
//!     completed.log.csv
//!     <run-timestamp>/
//!         dropped-invalid.log.csv
//!         dropped-failed.log.csv
//! ```
//!
//! The completed ledger spans every run of the job, so a resumed run skips
//! items an earlier run already finished.

mod config;
mod row;
mod run;

pub use config::{ImportConfig, JobSettings};
pub use row::{ImportContext, ImportRow, ItemStatus};
pub use run::{
    ImportRun, RunCounts, RunExecution, RunOptions, RunOutcome, RunProgress, RunState, RunSummary,
    ValidationReport, FAILED_LOG, INVALID_LOG,
};

use crate::error::{ImportError, Result};
use crate::files::{RemoteCredentials, SourceResolver};
use crate::ledger::{CompletedItem, ItemLedger};
use crate::model::ModelRegistry;
use crate::repository::Repository;
use relic_common::timestamp::is_run_timestamp;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const CONFIG_FILE: &str = "config.yml";
pub const SOURCE_FILE: &str = "source.csv";
pub const COMPLETED_LOG: &str = "completed.log.csv";

/// Directory name for a job id: every character outside the unreserved
/// set is percent-encoded, so distinct ids never share a directory
pub fn escape_job_id(id: &str) -> Result<String> {
    if id.is_empty() || id == "." || id == ".." {
        return Err(ImportError::job_config(format!("Invalid job id \"{id}\"")));
    }
    Ok(urlencoding::encode(id).into_owned())
}

/// A durable, resumable import task
#[derive(Debug)]
pub struct ImportJob {
    id: String,
    safe_id: String,
    dir: PathBuf,
    config: ImportConfig,
    completed: ItemLedger<CompletedItem>,
    models: Arc<ModelRegistry>,
    resolver: SourceResolver,
}

impl ImportJob {
    /// Handle for a job under `jobs_root`; the directory need not exist yet
    pub fn new(
        id: &str,
        jobs_root: impl AsRef<Path>,
        models: Arc<ModelRegistry>,
        resolver: SourceResolver,
    ) -> Result<Self> {
        let safe_id = escape_job_id(id)?;
        let dir = jobs_root.as_ref().join(&safe_id);
        let completed = ItemLedger::open(dir.join(COMPLETED_LOG))?;
        Ok(Self {
            id: id.to_string(),
            safe_id,
            dir,
            config: ImportConfig {
                job_id: Some(id.to_string()),
                ..Default::default()
            },
            completed,
            models,
            resolver,
        })
    }

    /// Credentials handed to remote binary locations
    pub fn with_credentials(mut self, credentials: RemoteCredentials) -> Self {
        self.resolver = self.resolver.with_credentials(credentials);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn safe_id(&self) -> &str {
        &self.safe_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn completed(&self) -> &ItemLedger<CompletedItem> {
        &self.completed
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn resolver(&self) -> &SourceResolver {
        &self.resolver
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    /// The job's copy of its metadata
    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(SOURCE_FILE)
    }

    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    /// Replace the in-memory config with the persisted one
    pub fn load_config(&mut self) -> Result<()> {
        let mut config = ImportConfig::from_file(self.config_path())?;
        config.job_id.get_or_insert_with(|| self.id.clone());
        self.config = config;
        Ok(())
    }

    pub fn save_config(&self) -> Result<()> {
        self.config.save(self.config_path())
    }

    /// Configure the job, persist the config and run it
    pub fn start<'a>(
        &'a mut self,
        repo: &'a dyn Repository,
        settings: JobSettings,
        options: RunOptions,
    ) -> Result<RunExecution<'a>> {
        if settings.model.is_none() {
            return Err(ImportError::job_config("Missing required parameter: model"));
        }
        if !options.validate_only && settings.container.is_none() {
            return Err(ImportError::job_config("Must specify a container for new items"));
        }
        self.config.apply(settings);
        std::fs::create_dir_all(&self.dir)?;
        self.save_config()?;
        info!(job_id = %self.id, dir = %self.dir.display(), "Starting job");

        let run = ImportRun::new(&self.dir)?;
        run.run(self, repo, options)
    }

    /// Run again with the persisted config; only per-run options may change
    pub fn resume<'a>(&'a mut self, repo: &'a dyn Repository, options: RunOptions) -> Result<RunExecution<'a>> {
        if !self.exists() {
            return Err(ImportError::JobNotFound(self.id.clone()));
        }
        self.load_config()?;
        info!(
            job_id = %self.id,
            completed = self.completed.len(),
            "Resuming job"
        );

        let run = ImportRun::new(&self.dir)?;
        run.run(self, repo, options)
    }

    /// Copy a metadata file into the job directory verbatim
    pub fn store_metadata_file(&self, source: &Path) -> Result<()> {
        let destination = self.metadata_path();
        let same = match (source.canonicalize(), destination.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        };
        if !same {
            std::fs::copy(source, &destination).map_err(|e| {
                ImportError::metadata(format!("Cannot store {}: {}", source.display(), e))
            })?;
            debug!(from = %source.display(), to = %destination.display(), "Stored metadata file");
        }
        Ok(())
    }

    pub(crate) fn complete(&mut self, item: &CompletedItem) -> Result<()> {
        self.completed.append(item)
    }

    /// Run timestamps, newest first
    fn run_timestamps(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut timestamps = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type()?.is_dir() && is_run_timestamp(&name) {
                timestamps.push(name);
            }
        }
        timestamps.sort_unstable_by(|a, b| b.cmp(a));
        Ok(timestamps)
    }

    pub fn runs(&self) -> Result<Vec<ImportRun>> {
        self.run_timestamps()?
            .iter()
            .map(|timestamp| ImportRun::load(&self.dir, timestamp))
            .collect()
    }

    pub fn latest_run(&self) -> Result<Option<ImportRun>> {
        match self.run_timestamps()?.first() {
            Some(timestamp) => Ok(Some(ImportRun::load(&self.dir, timestamp)?)),
            None => Ok(None),
        }
    }

    /// A specific run, or the latest one when no timestamp is given
    pub fn get_run(&self, timestamp: Option<&str>) -> Result<Option<ImportRun>> {
        match timestamp {
            Some(timestamp) => ImportRun::load(&self.dir, timestamp).map(Some),
            None => self.latest_run(),
        }
    }
}

/// All jobs under one root directory
#[derive(Debug, Clone)]
pub struct JobStore {
    root: PathBuf,
    models: Arc<ModelRegistry>,
    resolver: SourceResolver,
}

impl JobStore {
    pub fn new(root: impl Into<PathBuf>, models: Arc<ModelRegistry>, resolver: SourceResolver) -> Self {
        Self {
            root: root.into(),
            models,
            resolver,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Handle for a job, whether or not it exists
    pub fn job(&self, id: &str) -> Result<ImportJob> {
        ImportJob::new(id, &self.root, self.models.clone(), self.resolver.clone())
    }

    /// Create the job directory and persist its config
    pub fn create_job(&self, id: &str, settings: JobSettings) -> Result<ImportJob> {
        let mut job = self.job(id)?;
        job.config.apply(settings);
        std::fs::create_dir_all(job.dir())?;
        job.save_config()?;
        Ok(job)
    }

    /// An existing job with its persisted config loaded
    pub fn get_job(&self, id: &str) -> Result<ImportJob> {
        let mut job = self.job(id)?;
        if !job.exists() {
            return Err(ImportError::JobNotFound(id.to_string()));
        }
        job.load_config()?;
        Ok(job)
    }

    /// Ids of every job that has a config file, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.path().join(CONFIG_FILE).is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Ok(id) = urlencoding::decode(&name) {
                ids.push(id.into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> JobStore {
        JobStore::new(dir.path(), Arc::new(ModelRegistry::with_defaults()), SourceResolver::new())
    }

    #[test]
    fn test_escape_job_id() {
        assert_eq!(escape_job_id("import-20240101000000").unwrap(), "import-20240101000000");
        assert_eq!(escape_job_id("a/b c").unwrap(), "a%2Fb%20c");
        assert_ne!(escape_job_id("a/b").unwrap(), escape_job_id("a%2Fb").unwrap());
        assert!(escape_job_id("..").is_err());
        assert!(escape_job_id("").is_err());
    }

    #[test]
    fn test_create_get_and_list_jobs() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .create_job("batch/1", JobSettings::new("Item").container("/objects"))
            .unwrap();
        store.create_job("batch-2", JobSettings::new("Item")).unwrap();

        let job = store.get_job("batch/1").unwrap();
        assert_eq!(job.safe_id(), "batch%2F1");
        assert_eq!(job.config().container.as_deref(), Some("/objects"));
        assert_eq!(job.config().job_id.as_deref(), Some("batch/1"));
        assert_eq!(store.list().unwrap(), vec!["batch-2".to_string(), "batch/1".to_string()]);
    }

    #[test]
    fn test_get_missing_job() {
        let dir = TempDir::new().unwrap();
        let err = store(&dir).get_job("nope").unwrap_err();
        assert!(matches!(err, ImportError::JobNotFound(id) if id == "nope"));
    }

    #[test]
    fn test_resume_requires_existing_job() {
        let dir = TempDir::new().unwrap();
        let repo = crate::repository::MemoryRepository::new();
        let mut job = store(&dir).job("never-started").unwrap();
        let err = job.resume(&repo, RunOptions::default()).err().unwrap();
        assert!(matches!(err, ImportError::JobNotFound(_)));
    }

    #[test]
    fn test_runs_sorted_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let job = store.create_job("j", JobSettings::new("Item")).unwrap();
        for timestamp in ["20240101000000", "20240301000000", "20240201000000"] {
            std::fs::create_dir(job.dir().join(timestamp)).unwrap();
        }
        std::fs::create_dir(job.dir().join("not-a-run")).unwrap();

        let runs: Vec<String> = job.runs().unwrap().iter().map(|r| r.timestamp().to_string()).collect();
        assert_eq!(runs, vec!["20240301000000", "20240201000000", "20240101000000"]);
        assert_eq!(job.latest_run().unwrap().unwrap().timestamp(), "20240301000000");
        assert!(matches!(
            job.get_run(Some("20230101000000")),
            Err(ImportError::RunNotFound(_))
        ));
    }
}
