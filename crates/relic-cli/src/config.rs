//! Configuration management for the Relic CLI
//!
//! Settings are layered: built-in defaults, then a YAML file, then
//! `RELIC_*` environment variables (a `.env` file is loaded first).

use crate::error::{CliError, Result};
use relic_import::files::RemoteCredentials;
use relic_import::model::ModelRegistry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// CLI Configuration Constants
// ============================================================================

/// Repository endpoint when none is configured
pub const DEFAULT_REPO_URL: &str = "http://localhost:8080/rest";

pub const DEFAULT_JOBS_DIR: &str = "jobs";

pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Config file read from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "relic.yml";

/// CLI configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Repository endpoint
    pub repo_url: String,

    /// Bearer token for the repository
    pub repo_token: Option<String>,

    /// Directory holding one subdirectory per job
    pub jobs_dir: PathBuf,

    /// SSH private key handed to sftp binary locations
    pub ssh_key: Option<PathBuf>,

    /// YAML file with additional content models
    pub models: Option<PathBuf>,

    /// Repository request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo_url: DEFAULT_REPO_URL.to_string(),
            repo_token: None,
            jobs_dir: PathBuf::from(DEFAULT_JOBS_DIR),
            ssh_key: None,
            models: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load the full configuration.
    ///
    /// An explicit `path` must exist; otherwise `relic.yml` is read only when
    /// present in the working directory.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Self::from_file(DEFAULT_CONFIG_FILE)?,
            None => Self::default(),
        };
        config.merge_env()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CliError::config(format!("cannot read {}: {}", path.display(), e)))?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Apply `RELIC_*` environment overrides
    pub fn merge_env(self) -> Result<Self> {
        self.merge_vars(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable lookup
    pub fn merge_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(url) = var("RELIC_REPO_URL") {
            self.repo_url = url;
        }

        if let Some(token) = var("RELIC_REPO_TOKEN") {
            self.repo_token = Some(token).filter(|t| !t.is_empty());
        }

        if let Some(dir) = var("RELIC_JOBS_DIR") {
            self.jobs_dir = PathBuf::from(dir);
        }

        if let Some(key) = var("RELIC_SSH_KEY") {
            self.ssh_key = Some(PathBuf::from(key));
        }

        if let Some(models) = var("RELIC_MODELS") {
            self.models = Some(PathBuf::from(models));
        }

        if let Some(timeout) = var("RELIC_TIMEOUT_SECS") {
            self.timeout_secs = timeout
                .parse()
                .map_err(|_| CliError::config(format!("RELIC_TIMEOUT_SECS must be a number, got \"{timeout}\"")))?;
        }

        Ok(self)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Built-in models plus any from the models file
    pub fn model_registry(&self) -> Result<ModelRegistry> {
        match &self.models {
            Some(path) => Ok(ModelRegistry::from_yaml_file(path)?),
            None => Ok(ModelRegistry::with_defaults()),
        }
    }

    pub fn credentials(&self) -> RemoteCredentials {
        RemoteCredentials {
            ssh_private_key: self.ssh_key.clone(),
            password: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.repo_url, DEFAULT_REPO_URL);
        assert_eq!(config.jobs_dir, PathBuf::from("jobs"));
        assert_eq!(config.timeout(), Duration::from_secs(300));
        assert!(config.repo_token.is_none());
    }

    #[test]
    fn test_config_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relic.yml");
        std::fs::write(&path, "repo_url: https://repo.example.org/rest\njobs_dir: /var/relic/jobs\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.repo_url, "https://repo.example.org/rest");
        assert_eq!(config.jobs_dir, PathBuf::from("/var/relic/jobs"));
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(Some(&dir.path().join("absent.yml"))).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn test_environment_wins() {
        let vars: HashMap<&str, &str> = [
            ("RELIC_REPO_URL", "http://fcrepo:8080/rest"),
            ("RELIC_REPO_TOKEN", "secret"),
            ("RELIC_SSH_KEY", "/home/relic/.ssh/id_ed25519"),
            ("RELIC_TIMEOUT_SECS", "30"),
        ]
        .into_iter()
        .collect();

        let config = Config::default()
            .merge_vars(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.repo_url, "http://fcrepo:8080/rest");
        assert_eq!(config.repo_token.as_deref(), Some("secret"));
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(
            config.credentials().ssh_private_key,
            Some(PathBuf::from("/home/relic/.ssh/id_ed25519"))
        );
    }

    #[test]
    fn test_bad_timeout() {
        let result = Config::default().merge_vars(|name| (name == "RELIC_TIMEOUT_SECS").then(|| "soon".to_string()));
        assert!(matches!(result, Err(CliError::Config(_))));
    }
}
