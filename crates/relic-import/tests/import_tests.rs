//! End-to-end tests for import jobs
//!
//! Each test drives a whole job against the in-memory repository:
//! - start, resume and resumption filtering
//! - validate-only runs
//! - percentage and limit selection
//! - repository failures and rollback
//! - updates of existing items
//! - binaries from zip archives

use anyhow::Result;
use relic_import::files::SourceResolver;
use relic_import::jobs::{ImportJob, JobSettings, JobStore, RunOptions, RunOutcome};
use relic_import::model::ModelRegistry;
use relic_import::rdf::{vocab, Description, Term};
use relic_import::repository::MemoryRepository;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing::info;

/// Initialize tracing for tests
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,relic_import=debug")),
        )
        .with_test_writer()
        .try_init();
}

struct Fixture {
    dir: TempDir,
    store: JobStore,
}

impl Fixture {
    fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        std::fs::create_dir(dir.path().join("jobs"))?;
        std::fs::create_dir(dir.path().join("binaries"))?;
        let store = JobStore::new(
            dir.path().join("jobs"),
            Arc::new(ModelRegistry::with_defaults()),
            SourceResolver::new(),
        );
        Ok(Self { dir, store })
    }

    fn binaries(&self) -> PathBuf {
        self.dir.path().join("binaries")
    }

    fn add_binary(&self, name: &str, contents: &[u8]) -> Result<()> {
        std::fs::write(self.binaries().join(name), contents)?;
        Ok(())
    }

    fn csv(&self, name: &str, body: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::write(&path, body)?;
        Ok(path)
    }

    fn settings(&self) -> JobSettings {
        JobSettings::new("Item")
            .container("/objects")
            .binaries_location(self.binaries().display().to_string())
    }
}

fn import_file(path: &Path) -> RunOptions {
    RunOptions {
        import_file: Some(path.to_path_buf()),
        ..Default::default()
    }
}

/// Run directories are named to the second
async fn next_second() {
    tokio::time::sleep(Duration::from_millis(1100)).await;
}

fn sequential_csv(count: usize) -> String {
    let mut body = String::from("Identifier,Title\n");
    for i in 0..count {
        body.push_str(&format!("id-{i},Item {i}\n"));
    }
    body
}

#[tokio::test]
async fn test_missing_file_leaves_import_incomplete() -> Result<()> {
    init_tracing();
    let fixture = Fixture::new()?;
    fixture.add_binary("a1.tif", b"II*\x00\x08\x00\x00\x00")?;
    fixture.add_binary("b1.tif", b"II*\x00\x08\x00\x00\x00")?;
    let csv = fixture.csv(
        "metadata.csv",
        "Identifier,Title,FILES\n\
         item-a,First letter,a1.tif\n\
         item-b,Second letter,b1.tif\n\
         item-c,Third letter,c1.tif\n",
    )?;
    let repo = MemoryRepository::new();

    let mut job = fixture.store.job("import-20240101000000")?;
    let (run, summary) = job
        .start(&repo, fixture.settings(), import_file(&csv))?
        .run_to_completion(|progress| info!(rows = progress.counts.rows, "progress"))
        .await?;

    assert_eq!(summary.counts.total_items, 3);
    assert_eq!(summary.counts.valid_items, 2);
    assert_eq!(summary.counts.invalid_items, 1);
    assert_eq!(summary.counts.created_items, 2);
    assert_eq!(summary.counts.files, 3);
    assert_eq!(summary.outcome, RunOutcome::ImportIncomplete);

    assert_eq!(job.completed().len(), 2);
    assert!(job.completed().contains("item-a"));
    assert!(!job.completed().contains("item-c"));

    let invalid = run.invalid_items().entries()?;
    assert_eq!(invalid.len(), 1);
    assert_eq!(invalid[0].id, "item-c");
    assert_eq!(invalid[0].reason, "Validation failures: FILES Missing 1 files: c1.tif");
    assert!(run.failed_items().is_empty());

    assert_eq!(repo.children("/objects").len(), 2);
    assert!(job.metadata_path().is_file());
    assert!(job.config_path().is_file());
    Ok(())
}

#[tokio::test]
async fn test_resume_skips_completed_items() -> Result<()> {
    init_tracing();
    let fixture = Fixture::new()?;
    fixture.add_binary("a1.tif", b"II*\x00\x08\x00\x00\x00")?;
    let csv = fixture.csv(
        "metadata.csv",
        "Identifier,Title,FILES\nitem-a,First letter,a1.tif\nitem-b,Second letter,b1.tif\n",
    )?;
    let repo = MemoryRepository::new();

    let mut job = fixture.store.job("resumable")?;
    let (_, first) = job
        .start(&repo, fixture.settings(), import_file(&csv))?
        .run_to_completion(|_| {})
        .await?;
    assert_eq!(first.outcome, RunOutcome::ImportIncomplete);
    assert_eq!(first.counts.created_items, 1);

    // supply the missing file and resume from the persisted config
    fixture.add_binary("b1.tif", b"II*\x00\x08\x00\x00\x00")?;
    next_second().await;
    let mut job = fixture.store.get_job("resumable")?;
    let (_, second) = job
        .resume(&repo, RunOptions::default())?
        .run_to_completion(|_| {})
        .await?;

    assert_eq!(second.counts.initially_completed_items, 1);
    assert_eq!(second.counts.already_completed, 1);
    assert_eq!(second.counts.rows, 1);
    assert_eq!(second.counts.created_items, 1);
    assert_eq!(second.outcome, RunOutcome::ImportComplete);
    assert_eq!(repo.children("/objects").len(), 2);

    let runs = job.runs()?;
    assert_eq!(runs.len(), 2);
    assert!(runs[0].timestamp() > runs[1].timestamp());
    assert_eq!(runs[1].invalid_items().len(), 1);
    assert!(runs[0].invalid_items().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_resume_after_complete_reprocesses_nothing() -> Result<()> {
    init_tracing();
    let fixture = Fixture::new()?;
    let csv = fixture.csv("metadata.csv", &sequential_csv(3))?;
    let repo = MemoryRepository::new();

    let mut job = fixture.store.job("done")?;
    job.start(&repo, fixture.settings(), import_file(&csv))?
        .run_to_completion(|_| {})
        .await?;
    let created = repo.counts().created_resources;

    next_second().await;
    let (_, summary) = job
        .resume(&repo, RunOptions::default())?
        .run_to_completion(|_| {})
        .await?;

    assert_eq!(summary.counts.rows, 0);
    assert_eq!(summary.counts.already_completed, 3);
    assert_eq!(summary.outcome, RunOutcome::ImportComplete);
    assert_eq!(repo.counts().created_resources, created);
    Ok(())
}

#[tokio::test]
async fn test_validate_only_never_writes() -> Result<()> {
    init_tracing();
    let fixture = Fixture::new()?;
    let csv = fixture.csv("metadata.csv", "Identifier,Title,Date\nid-1,One,1920-04\nid-2,Two,Spring 1920\n")?;
    let repo = MemoryRepository::new();

    let mut job = fixture.store.job("validate")?;
    let options = RunOptions {
        validate_only: true,
        ..import_file(&csv)
    };
    let settings = JobSettings::new("Item");
    let (_, summary) = job.start(&repo, settings, options)?.run_to_completion(|_| {}).await?;

    assert_eq!(summary.outcome, RunOutcome::ValidateFailed);
    assert_eq!(summary.counts.valid_items, 1);
    assert_eq!(summary.counts.invalid_items, 1);
    assert_eq!(summary.validation.len(), 2);
    let failed = summary
        .validation
        .iter()
        .find(|report| !report.passed)
        .map(|report| report.identifier.as_str());
    assert_eq!(failed, Some("id-2"));

    assert_eq!(repo.counts().transactions, 0);
    assert_eq!(repo.counts().reads, 0);
    assert!(job.completed().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_validate_only_success() -> Result<()> {
    let fixture = Fixture::new()?;
    let csv = fixture.csv("metadata.csv", &sequential_csv(2))?;
    let repo = MemoryRepository::new();

    let mut job = fixture.store.job("validate-ok")?;
    let options = RunOptions {
        validate_only: true,
        ..import_file(&csv)
    };
    let (_, summary) = job
        .start(&repo, JobSettings::new("Item"), options)?
        .run_to_completion(|_| {})
        .await?;

    assert_eq!(summary.outcome, RunOutcome::ValidateSuccess);
    assert!(summary.outcome.is_success());
    Ok(())
}

#[tokio::test]
async fn test_percentage_selects_evenly_spaced_rows() -> Result<()> {
    let fixture = Fixture::new()?;
    let csv = fixture.csv("metadata.csv", &sequential_csv(10))?;
    let repo = MemoryRepository::new();

    let mut job = fixture.store.job("sampled")?;
    let options = RunOptions {
        percentage: Some(50),
        ..import_file(&csv)
    };
    let (_, summary) = job.start(&repo, fixture.settings(), options)?.run_to_completion(|_| {}).await?;

    assert_eq!(summary.counts.rows, 5);
    assert_eq!(summary.counts.created_items, 5);
    assert_eq!(summary.outcome, RunOutcome::ImportIncomplete);
    let mut ids: Vec<String> = job.completed().entries()?.into_iter().map(|item| item.id).collect();
    ids.sort();
    assert_eq!(ids, vec!["id-0", "id-2", "id-4", "id-6", "id-8"]);
    Ok(())
}

#[tokio::test]
async fn test_limit_counts_completed_rows() -> Result<()> {
    let fixture = Fixture::new()?;
    let csv = fixture.csv("metadata.csv", &sequential_csv(6))?;
    let repo = MemoryRepository::new();

    let mut job = fixture.store.job("limited")?;
    let options = RunOptions {
        limit: Some(2),
        ..import_file(&csv)
    };
    let (_, first) = job.start(&repo, fixture.settings(), options)?.run_to_completion(|_| {}).await?;
    assert_eq!(first.counts.created_items, 2);

    next_second().await;
    let options = RunOptions {
        limit: Some(4),
        ..Default::default()
    };
    let (_, second) = job.resume(&repo, options)?.run_to_completion(|_| {}).await?;
    assert_eq!(second.counts.already_completed, 2);
    assert_eq!(second.counts.created_items, 2);
    assert_eq!(job.completed().len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_repository_failure_is_recorded_and_retried() -> Result<()> {
    init_tracing();
    let fixture = Fixture::new()?;
    let csv = fixture.csv("metadata.csv", "Identifier,Title\nid-1,Fine\nid-2,Broken\nid-3,Also fine\n")?;
    let failing = MemoryRepository::new();
    failing.fail_on_title("Broken");

    let mut job = fixture.store.job("flaky")?;
    let (run, summary) = job
        .start(&failing, fixture.settings(), import_file(&csv))?
        .run_to_completion(|_| {})
        .await?;

    assert_eq!(summary.counts.created_items, 2);
    assert_eq!(summary.counts.errors, 1);
    assert_eq!(summary.outcome, RunOutcome::ImportIncomplete);
    assert_eq!(failing.counts().rollbacks, 1);
    assert!(!job.completed().contains("id-2"));

    let failed = run.failed_items().entries()?;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, "id-2");
    assert!(failed[0].reason.starts_with("Creating item failed"));

    next_second().await;
    let healthy = MemoryRepository::new();
    let (_, retried) = job
        .resume(&healthy, RunOptions::default())?
        .run_to_completion(|_| {})
        .await?;
    assert_eq!(retried.counts.created_items, 1);
    assert_eq!(retried.outcome, RunOutcome::ImportComplete);
    Ok(())
}

#[tokio::test]
async fn test_existing_items_are_patched_once_or_left_alone() -> Result<()> {
    let fixture = Fixture::new()?;
    let repo = MemoryRepository::new();
    let mut uris = Vec::new();
    for (id, title) in [("id-1", "Same"), ("id-2", "Old")] {
        let uri = repo.container_uri(&format!("/objects/{id}"));
        let mut description = Description::new(uri.clone());
        description
            .add_type(vocab::PCDM_OBJECT)
            .add(vocab::DCTERMS_IDENTIFIER, Term::literal(id))
            .add(vocab::DCTERMS_TITLE, Term::literal(title));
        repo.insert(description);
        uris.push(uri);
    }
    let csv = fixture.csv(
        "metadata.csv",
        &format!("URI,Identifier,Title\n{},id-1,Same\n{},id-2,New\n", uris[0], uris[1]),
    )?;

    let mut job = fixture.store.job("updates")?;
    let (_, summary) = job
        .start(&repo, fixture.settings(), import_file(&csv))?
        .run_to_completion(|_| {})
        .await?;

    assert_eq!(summary.counts.unchanged_items, 1);
    assert_eq!(summary.counts.skipped_items, 1);
    assert_eq!(summary.counts.updated_items, 1);
    assert_eq!(summary.counts.created_items, 0);
    assert_eq!(repo.counts().updates, 1);
    assert_eq!(repo.counts().transactions, 0);

    let statuses: Vec<String> = job.completed().entries()?.into_iter().map(|item| item.status).collect();
    assert_eq!(statuses, vec!["unchanged", "modified"]);
    Ok(())
}

#[tokio::test]
async fn test_missing_existing_item_is_a_failure() -> Result<()> {
    let fixture = Fixture::new()?;
    let repo = MemoryRepository::new();
    let uri = repo.container_uri("/objects/gone");
    let csv = fixture.csv("metadata.csv", &format!("URI,Identifier,Title\n{uri},id-1,Gone\n"))?;

    let mut job = fixture.store.job("gone")?;
    let (run, summary) = job
        .start(&repo, fixture.settings(), import_file(&csv))?
        .run_to_completion(|_| {})
        .await?;

    assert_eq!(summary.counts.errors, 1);
    let failed = run.failed_items().entries()?;
    assert_eq!(failed[0].reason, format!("Item {uri} does not exist in the repository"));
    Ok(())
}

#[tokio::test]
async fn test_binaries_from_zip_archive() -> Result<()> {
    let fixture = Fixture::new()?;
    let archive = fixture.dir.path().join("batch.zip");
    {
        let mut writer = zip::ZipWriter::new(std::fs::File::create(&archive)?);
        writer.start_file("scans/p1.tif", zip::write::FileOptions::default())?;
        writer.write_all(b"II*\x00\x08\x00\x00\x00")?;
        writer.start_file("scans/p2.tif", zip::write::FileOptions::default())?;
        writer.write_all(b"II*\x00\x08\x00\x00\x00")?;
        writer.finish()?;
    }
    let csv = fixture.csv(
        "metadata.csv",
        "Identifier,Title,FILES,ITEM_FILES\nid-1,Zipped,scans/p1.tif;scans/p2.tif,\nid-2,Half zipped,scans/p3.tif,\n",
    )?;
    let repo = MemoryRepository::new();

    let mut job = fixture.store.job("zipped")?;
    let settings = JobSettings::new("Item")
        .container("/objects")
        .binaries_location(format!("zip:{}", archive.display()));
    let (run, summary) = job
        .start(&repo, settings, import_file(&csv))?
        .run_to_completion(|_| {})
        .await?;

    assert_eq!(summary.counts.created_items, 1);
    assert_eq!(summary.counts.invalid_items, 1);
    assert_eq!(
        run.invalid_items().entries()?[0].reason,
        "Validation failures: FILES Missing 1 files: scans/p3.tif"
    );

    let item = repo.get(&job.completed().entries()?[0].uri).expect("created item");
    let pages: Vec<&str> = item.values(vocab::PCDM_HAS_MEMBER).map(Term::value).collect();
    assert_eq!(pages.len(), 2);
    Ok(())
}

#[test]
fn test_job_handles_are_independent_of_disk() -> Result<()> {
    let fixture = Fixture::new()?;
    let job: ImportJob = fixture.store.job("not-yet")?;
    assert!(!job.exists());
    assert!(job.latest_run()?.is_none());
    assert!(fixture.store.list()?.is_empty());
    Ok(())
}
