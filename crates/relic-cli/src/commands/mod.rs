//! CLI command implementations

pub mod import;
pub mod jobs;

use crate::config::Config;
use crate::error::Result;
use relic_import::files::SourceResolver;
use relic_import::JobStore;
use std::sync::Arc;

/// Job store for the configured jobs directory, models and credentials
pub fn job_store(config: &Config) -> Result<JobStore> {
    let models = Arc::new(config.model_registry()?);
    let client = reqwest::Client::builder().timeout(config.timeout()).build()?;
    let resolver = SourceResolver::new()
        .with_http_client(client)
        .with_credentials(config.credentials());
    Ok(JobStore::new(config.jobs_dir.clone(), models, resolver))
}
