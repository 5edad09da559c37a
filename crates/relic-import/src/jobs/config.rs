//! Persisted job configuration (`config.yml`)

use crate::error::{ImportError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use tracing::debug;

/// Structural configuration of a job, fixed once the job has started
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportConfig {
    #[serde(default, deserialize_with = "optional_value")]
    pub job_id: Option<String>,
    #[serde(default, deserialize_with = "optional_value")]
    pub model: Option<String>,
    /// Access class IRI applied to new items
    #[serde(default, deserialize_with = "optional_value")]
    pub access: Option<String>,
    /// Collection IRI new items become members of
    #[serde(default, deserialize_with = "optional_value")]
    pub member_of: Option<String>,
    /// Container path or URI new items are created in
    #[serde(default, deserialize_with = "optional_value")]
    pub container: Option<String>,
    #[serde(default, deserialize_with = "optional_value")]
    pub binaries_location: Option<String>,
    /// Comma-separated MIME types to extract full text from
    #[serde(default, deserialize_with = "optional_value")]
    pub extract_text_types: Option<String>,
}

/// `null`, empty strings and the string `None` all read as absent;
/// scalars of other types are kept in their string form
fn optional_value<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    let text = match value {
        serde_yaml::Value::Null => return Ok(None),
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        other => {
            return Err(serde::de::Error::custom(format!(
                "expected a scalar value, found {other:?}"
            )))
        },
    };
    let text = text.trim();
    if text.is_empty() || text == "None" {
        Ok(None)
    } else {
        Ok(Some(text.to_string()))
    }
}

impl ImportConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ImportError::job_config(format!(
                "Config file {} is missing",
                path.display()
            )));
        }
        let contents = std::fs::read_to_string(path)?;
        if contents.trim().is_empty() {
            return Err(ImportError::job_config(format!(
                "Config file {} is empty",
                path.display()
            )));
        }
        serde_yaml::from_str(&contents).map_err(|e| {
            ImportError::job_config(format!("Config file {} is invalid: {}", path.display(), e))
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        debug!(path = %path.display(), "Saved job config");
        Ok(())
    }

    /// Replace every structural setting, keeping the job id
    pub fn apply(&mut self, settings: JobSettings) {
        self.model = settings.model;
        self.access = settings.access;
        self.member_of = settings.member_of;
        self.container = settings.container;
        self.binaries_location = settings.binaries_location;
        self.extract_text_types = settings.extract_text_types;
    }
}

/// Settings supplied when a job is started
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSettings {
    pub model: Option<String>,
    pub access: Option<String>,
    pub member_of: Option<String>,
    pub container: Option<String>,
    pub binaries_location: Option<String>,
    pub extract_text_types: Option<String>,
}

impl JobSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Default::default()
        }
    }

    pub fn container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    pub fn binaries_location(mut self, location: impl Into<String>) -> Self {
        self.binaries_location = Some(location.into());
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_none_values_read_as_absent() {
        let yaml = r#"
job_id: import-20240101000000
model: Item
access: None
member_of: ""
container: /objects
binaries_location: null
"#;
        let config: ImportConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.job_id.as_deref(), Some("import-20240101000000"));
        assert_eq!(config.model.as_deref(), Some("Item"));
        assert_eq!(config.access, None);
        assert_eq!(config.member_of, None);
        assert_eq!(config.container.as_deref(), Some("/objects"));
        assert_eq!(config.binaries_location, None);
        assert_eq!(config.extract_text_types, None);
    }

    #[test]
    fn test_numeric_job_id() {
        let config: ImportConfig = serde_yaml::from_str("job_id: 20240101\nmodel: Item\n").unwrap();
        assert_eq!(config.job_id.as_deref(), Some("20240101"));
    }

    #[test]
    fn test_save_writes_null_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        let config = ImportConfig {
            job_id: Some("j1".to_string()),
            model: Some("Item".to_string()),
            container: Some("/objects".to_string()),
            ..Default::default()
        };
        config.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("access: null"));
        assert_eq!(ImportConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_and_empty_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        let err = ImportConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("is missing"));

        std::fs::write(&path, "  \n").unwrap();
        let err = ImportConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ImportError::JobConfig(ref msg) if msg.contains("is empty")));
    }
}
