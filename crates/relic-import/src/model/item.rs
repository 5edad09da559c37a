use super::validation::{ValidationResult, ValidationResults};
use super::{FieldKind, FieldSpec, ModelDescriptor};
use crate::error::{ImportError, Result};
use crate::rdf::{vocab, Changeset, Description, Term, Triple};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;

const PLACEHOLDER_PREFIX: &str = "urn:uuid:";

/// Identity of an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemUri {
    /// Locally generated; the item does not exist in the repository yet
    Placeholder(String),
    /// Assigned by the repository
    Assigned(String),
}

impl ItemUri {
    pub fn placeholder() -> Self {
        ItemUri::Placeholder(format!("{}{}", PLACEHOLDER_PREFIX, uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            ItemUri::Placeholder(uri) | ItemUri::Assigned(uri) => uri,
        }
    }
}

/// Domain object built from a metadata row, optionally merged with the
/// state already in the repository
#[derive(Debug, Clone)]
pub struct Item {
    model: Arc<ModelDescriptor>,
    uri: ItemUri,
    values: BTreeMap<String, Vec<Term>>,
    /// Field values as last read from the repository
    original: Option<BTreeMap<String, Vec<Term>>>,
    types: Vec<String>,
    member_of: Option<String>,
}

impl Item {
    /// A new item with a placeholder identity
    pub fn new(model: Arc<ModelDescriptor>) -> Self {
        Self::with_identity(model, ItemUri::placeholder())
    }

    /// An item known to exist at `uri`, without its repository state
    pub fn with_uri(model: Arc<ModelDescriptor>, uri: impl Into<String>) -> Self {
        Self::with_identity(model, ItemUri::Assigned(uri.into()))
    }

    fn with_identity(model: Arc<ModelDescriptor>, uri: ItemUri) -> Self {
        let types = model.types.clone();
        Self {
            model,
            uri,
            values: BTreeMap::new(),
            original: None,
            types,
            member_of: None,
        }
    }

    /// Load an existing item from its repository description
    pub fn from_description(model: Arc<ModelDescriptor>, description: &Description) -> Self {
        let mut item = Self::with_uri(model.clone(), description.subject.clone());
        for field in &model.fields {
            let values: Vec<Term> = description.values(&field.predicate).cloned().collect();
            if !values.is_empty() {
                item.values.insert(field.name.clone(), values);
            }
        }
        for rdf_type in description.values(vocab::RDF_TYPE) {
            item.add_type(rdf_type.value());
        }
        item.member_of = description
            .values(vocab::PCDM_MEMBER_OF)
            .next()
            .map(|t| t.value().to_string());
        item.original = Some(item.values.clone());
        item
    }

    pub fn model(&self) -> &ModelDescriptor {
        &self.model
    }

    pub fn uri(&self) -> &str {
        self.uri.as_str()
    }

    /// Whether the item still carries a placeholder identity
    pub fn is_new(&self) -> bool {
        matches!(self.uri, ItemUri::Placeholder(_))
    }

    pub fn assign_uri(&mut self, uri: impl Into<String>) {
        self.uri = ItemUri::Assigned(uri.into());
    }

    pub fn values(&self, field: &str) -> &[Term] {
        self.values.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    /// Replace all values of a field
    pub fn set_values(&mut self, field: &str, values: Vec<Term>) {
        if values.is_empty() {
            self.values.remove(field);
        } else {
            self.values.insert(field.to_string(), values);
        }
    }

    fn first_value(&self, field: &str) -> Option<&str> {
        self.values(field).first().map(Term::value)
    }

    pub fn identifier(&self) -> Option<&str> {
        self.first_value(&self.model.identifier_field)
    }

    pub fn title(&self) -> Option<&str> {
        self.first_value(&self.model.title_field)
    }

    pub fn types(&self) -> &[String] {
        &self.types
    }

    pub fn add_type(&mut self, iri: impl Into<String>) {
        let iri = iri.into();
        if !self.types.contains(&iri) {
            self.types.push(iri);
        }
    }

    pub fn member_of(&self) -> Option<&str> {
        self.member_of.as_deref()
    }

    pub fn set_member_of(&mut self, iri: impl Into<String>) {
        self.member_of = Some(iri.into());
    }

    /// Run every field rule of the model.
    ///
    /// Fails only when a rule cannot be executed, such as an unparsable
    /// pattern; ordinary rule violations are reported in the results.
    pub fn validate(&self) -> Result<ValidationResults> {
        let mut results = ValidationResults::new();
        for field in &self.model.fields {
            results.insert(field.name.clone(), self.validate_field(field)?);
        }
        Ok(results)
    }

    fn validate_field(&self, field: &FieldSpec) -> Result<ValidationResult> {
        let values = self.values(&field.name);

        if values.is_empty() {
            return Ok(if field.required {
                ValidationResult::failure("is required")
            } else {
                ValidationResult::success("is valid")
            });
        }

        if !field.repeatable && values.len() > 1 {
            return Ok(ValidationResult::failure(format!(
                "must have at most one value, found {}",
                values.len()
            )));
        }

        if field.kind == FieldKind::Reference {
            for value in values {
                let is_iri = matches!(value, Term::Iri(iri) if url::Url::parse(iri).is_ok());
                if !is_iri {
                    return Ok(ValidationResult::failure(format!(
                        "is not a valid IRI: \"{}\"",
                        value.value()
                    )));
                }
            }
        }

        if let Some(pattern) = &field.pattern {
            let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
                ImportError::validation(format!("invalid pattern for {}: {}", field.name, e))
            })?;
            if let Some(bad) = values.iter().find(|v| !regex.is_match(v.value())) {
                return Ok(ValidationResult::failure(format!(
                    "has a value that does not match the required format: \"{}\"",
                    bad.value()
                )));
            }
        }

        Ok(ValidationResult::success("is valid"))
    }

    /// Deletions and insertions needed to bring the repository in line with
    /// this item. Empty for items that were never read from the repository.
    pub fn changeset(&self) -> Changeset {
        let mut changeset = Changeset::default();
        let Some(original) = &self.original else {
            return changeset;
        };
        let uri = self.uri();

        for field in &self.model.fields {
            let before = original.get(&field.name).map(Vec::as_slice).unwrap_or_default();
            let after = self.values(&field.name);
            for value in before.iter().filter(|v| !after.contains(v)) {
                changeset
                    .deletes
                    .push(Triple::new(uri, field.predicate.clone(), value.clone()));
            }
            for value in after.iter().filter(|v| !before.contains(v)) {
                changeset.insert(Triple::new(uri, field.predicate.clone(), value.clone()));
            }
        }
        changeset
    }

    /// Full description for creating this item; new items use an empty
    /// subject so the repository assigns the URI
    pub fn describe(&self) -> Description {
        let subject = if self.is_new() { "" } else { self.uri() };
        let mut description = Description::new(subject);
        for rdf_type in &self.types {
            description.add_type(rdf_type.clone());
        }
        if let Some(member_of) = &self.member_of {
            description.add(vocab::PCDM_MEMBER_OF, Term::iri(member_of.clone()));
        }
        for field in &self.model.fields {
            for value in self.values(&field.name) {
                description.add(field.predicate.clone(), value.clone());
            }
        }
        description
    }
}
