//! Model descriptors and the registry that resolves them by name
//!
//! A descriptor says which spreadsheet headers map to which predicates, which
//! field holds the item identifier and title, and how each field is
//! validated. Registries are built explicitly and handed to jobs; there is no
//! process-wide lookup table.

mod item;
mod validation;

pub use item::{Item, ItemUri};
pub use validation::{ValidationResult, ValidationResults};

use crate::error::{ImportError, Result};
use crate::rdf::vocab;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Whether a field's values are literals or IRIs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Literal,
    Reference,
}

/// One mapped column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name used in validation results
    pub name: String,
    /// Spreadsheet column header
    pub header: String,
    pub predicate: String,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub datatype: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "default_repeatable")]
    pub repeatable: bool,
    /// Anchored regular expression every literal value must match
    #[serde(default)]
    pub pattern: Option<String>,
}

fn default_repeatable() -> bool {
    true
}

impl FieldSpec {
    pub fn literal(name: &str, header: &str, predicate: &str) -> Self {
        Self {
            name: name.to_string(),
            header: header.to_string(),
            predicate: predicate.to_string(),
            kind: FieldKind::Literal,
            datatype: None,
            required: false,
            repeatable: true,
            pattern: None,
        }
    }

    pub fn reference(name: &str, header: &str, predicate: &str) -> Self {
        Self {
            kind: FieldKind::Reference,
            ..Self::literal(name, header, predicate)
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn single(mut self) -> Self {
        self.repeatable = false;
        self
    }

    pub fn pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(pattern.to_string());
        self
    }
}

/// Everything the engine needs to know about one content model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    /// Name of the field whose first value identifies an item across runs
    pub identifier_field: String,
    pub title_field: String,
    /// RDF types every item of this model carries
    #[serde(default)]
    pub types: Vec<String>,
    pub fields: Vec<FieldSpec>,
}

impl ModelDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_by_header(&self, header: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.header == header)
    }

    pub fn identifier_spec(&self) -> Option<&FieldSpec> {
        self.field(&self.identifier_field)
    }

    /// Check that the identifier and title fields exist
    pub fn check(&self) -> Result<()> {
        for (role, name) in [("identifier", &self.identifier_field), ("title", &self.title_field)] {
            if self.field(name).is_none() {
                return Err(ImportError::job_config(format!(
                    "Model {} names {} field \"{}\" but does not define it",
                    self.name, role, name
                )));
            }
        }
        Ok(())
    }

    /// Generic descriptive model, available in every default registry
    pub fn item() -> Self {
        Self {
            name: "Item".to_string(),
            identifier_field: "identifier".to_string(),
            title_field: "title".to_string(),
            types: vec![vocab::PCDM_OBJECT.to_string()],
            fields: vec![
                FieldSpec::literal("identifier", "Identifier", vocab::DCTERMS_IDENTIFIER).required(),
                FieldSpec::literal("title", "Title", vocab::DCTERMS_TITLE).required().single(),
                FieldSpec::literal("date", "Date", "http://purl.org/dc/elements/1.1/date")
                    .single()
                    .pattern(r"\d{4}(-\d{2}(-\d{2})?)?(/\d{4}(-\d{2}(-\d{2})?)?)?"),
                FieldSpec::literal("creator", "Creator", "http://purl.org/dc/terms/creator"),
                FieldSpec::literal("description", "Description", "http://purl.org/dc/terms/description"),
                FieldSpec::literal("subject", "Subject", "http://purl.org/dc/terms/subject"),
                FieldSpec::reference("rights", "Rights Statement", "http://purl.org/dc/terms/rights").single(),
            ],
        }
    }
}

/// Explicit name-to-descriptor mapping
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, Arc<ModelDescriptor>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry containing the built-in `Item` model
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.models.insert("Item".to_string(), Arc::new(ModelDescriptor::item()));
        registry
    }

    pub fn insert(&mut self, descriptor: ModelDescriptor) -> Result<()> {
        descriptor.check()?;
        self.models.insert(descriptor.name.clone(), Arc::new(descriptor));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<ModelDescriptor>> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| ImportError::ModelNotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Add every descriptor from a YAML list
    pub fn load_yaml(&mut self, yaml: &str) -> Result<()> {
        let descriptors: Vec<ModelDescriptor> = serde_yaml::from_str(yaml)?;
        for descriptor in descriptors {
            self.insert(descriptor)?;
        }
        Ok(())
    }

    /// Default registry extended with the descriptors in a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut registry = Self::with_defaults();
        registry.load_yaml(&std::fs::read_to_string(path)?)?;
        Ok(registry)
    }
}
