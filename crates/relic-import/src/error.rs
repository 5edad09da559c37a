//! Error types for the import engine
//!
//! Three layers of failure are kept apart:
//!
//! - [`ImportError`] aborts a job operation or a whole run.
//! - [`JobError`] is a single row's commit failure; the run records it and
//!   moves on.
//! - [`RepositoryError`] and [`BinarySourceError`] come from collaborators
//!   and are converted into one of the above by the caller.

use thiserror::Error;

/// Result type alias for import operations
pub type Result<T> = std::result::Result<T, ImportError>;

/// Fatal errors for a job operation or a run
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Job configuration error: {0}")]
    JobConfig(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Model {0} not found")]
    ModelNotFound(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Must specify --binaries-location if the metadata has a FILES and/or ITEM_FILES column")]
    MissingBinariesLocation,

    #[error("Run already started, cannot start again")]
    RunAlreadyStarted,

    #[error("Import run {0} not found")]
    RunNotFound(String),

    #[error("Run has not finished; consume all progress updates first")]
    RunNotFinished,

    #[error("Unable to run validation: {0}")]
    Validation(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] csv::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ImportError {
    pub fn job_config(msg: impl Into<String>) -> Self {
        Self::JobConfig(msg.into())
    }

    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// A row whose repository write failed.
///
/// The message is what lands in the run's failed-item ledger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct JobError {
    pub message: String,
    /// Underlying cause, such as a response body from the repository
    pub cause: Option<String>,
}

impl JobError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(message: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    /// `"{action} failed: {err}"`, keeping any response body as the cause
    pub fn repository(action: &str, err: &RepositoryError) -> Self {
        let message = format!("{action} failed: {err}");
        match err.detail() {
            Some(detail) => Self::with_cause(message, detail),
            None => Self::new(message),
        }
    }
}

/// Failures reported by a repository collaborator
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Repository returned {status} for {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    #[error("Repository request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Cannot parse repository response: {0}")]
    Parse(String),

    #[error("Binary source error: {0}")]
    Source(#[from] BinarySourceError),
}

impl RepositoryError {
    /// Response body or other detail for failed-item logs
    pub fn detail(&self) -> Option<&str> {
        match self {
            RepositoryError::Http { body, .. } if !body.is_empty() => Some(body),
            _ => None,
        }
    }
}

/// Failures opening or inspecting a binary
#[derive(Error, Debug)]
pub enum BinarySourceError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error fetching {url}: {message}")]
    Http { url: String, message: String },

    #[error("Archive error in {archive}: {message}")]
    Archive { archive: String, message: String },

    #[error("Remote file server error: {0}")]
    Remote(String),

    #[error("No connector registered for {scheme}: locations")]
    NoConnector { scheme: String },

    #[error("Checksum error: {0}")]
    Checksum(#[from] relic_common::CommonError),
}

impl BinarySourceError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn archive(archive: impl Into<String>, message: impl ToString) -> Self {
        Self::Archive {
            archive: archive.into(),
            message: message.to_string(),
        }
    }

    pub fn http(url: impl Into<String>, message: impl ToString) -> Self {
        Self::Http {
            url: url.into(),
            message: message.to_string(),
        }
    }
}
