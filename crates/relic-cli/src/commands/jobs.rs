//! `relic jobs` command implementation

use crate::commands::job_store;
use crate::config::Config;
use crate::error::Result;

/// List the jobs under the jobs directory
pub fn run(config: &Config) -> Result<()> {
    let store = job_store(config)?;
    let ids = store.list()?;

    if ids.is_empty() {
        println!("No jobs found in {}", store.root().display());
        return Ok(());
    }
    for id in ids {
        println!("{id}");
    }
    Ok(())
}
