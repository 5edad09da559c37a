//! Relic import engine
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Batch-imports CSV metadata and the binaries it references into an LDP
//! repository, one item per row, keeping enough state on disk that an
//! interrupted or partially failed import can be resumed.
//!
//! # Overview
//!
//! - [`jobs`]: jobs, runs and the per-row validate-then-commit pipeline
//! - [`ledger`]: append-only CSV logs of completed, invalid and failed items
//! - [`metadata`]: the CSV source and its row selection
//! - [`model`]: model descriptors, items and field validation
//! - [`files`]: binary sources for local, archive, remote and HTTP locations
//! - [`repository`]: the repository interface with HTTP and in-memory backends
//!
//! # Example
//!
//! ```no_run
//! use relic_import::jobs::{JobSettings, JobStore, RunOptions};
//! use relic_import::files::SourceResolver;
//! use relic_import::model::ModelRegistry;
//! use relic_import::repository::MemoryRepository;
//! use std::sync::Arc;
//!
//! # async fn example() -> relic_import::Result<()> {
//! let store = JobStore::new("jobs", Arc::new(ModelRegistry::with_defaults()), SourceResolver::new());
//! let repo = MemoryRepository::new();
//! let mut job = store.job("import-20240101000000")?;
//! let settings = JobSettings::new("Item").container("/objects");
//! let options = RunOptions {
//!     import_file: Some("metadata.csv".into()),
//!     ..Default::default()
//! };
//! let (_, summary) = job
//!     .start(&repo, settings, options)?
//!     .run_to_completion(|progress| tracing::debug!(rows = progress.counts.rows, "progress"))
//!     .await?;
//! println!("{}", summary.outcome);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod files;
pub mod jobs;
pub mod ledger;
pub mod metadata;
pub mod model;
pub mod rdf;
pub mod repository;
pub mod text;

pub use error::{BinarySourceError, ImportError, JobError, RepositoryError, Result};
pub use jobs::{ImportJob, ImportRun, JobStore, RunOutcome, RunSummary};
