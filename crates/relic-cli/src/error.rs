//! Error types for the Relic CLI
//!
//! Messages are user-facing and say what to check next.

use relic_import::{ImportError, RepositoryError};
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    /// The engine refused or aborted the operation
    #[error("{0}")]
    Import(#[from] ImportError),

    /// The repository could not be reached or configured
    #[error("Repository error: {0}. Check the repository URL and token in your configuration.")]
    Repository(#[from] RepositoryError),

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check your environment variables or config file.")]
    Config(String),

    /// File system operation failed
    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    /// HTTP client setup failed
    #[error("Network client error: {0}")]
    Http(#[from] reqwest::Error),

    /// YAML parsing failed
    #[error("Failed to parse YAML: {0}. Check the file syntax at the indicated line/column.")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON rendering failed
    #[error("Failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic anyhow error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_errors_pass_through() {
        let err = CliError::from(ImportError::JobNotFound("batch-1".to_string()));
        assert_eq!(err.to_string(), "Job not found: batch-1");
    }

    #[test]
    fn test_config_error_message() {
        let err = CliError::config("RELIC_TIMEOUT_SECS must be a number");
        assert!(err.to_string().starts_with("Configuration error: RELIC_TIMEOUT_SECS"));
    }
}
