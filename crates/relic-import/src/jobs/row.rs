//! Per-row validation and commit

use super::config::ImportConfig;
use crate::error::{BinarySourceError, JobError, RepositoryError, Result};
use crate::files::{BinariesLocation, BinarySource, FileKind, SourceResolver};
use crate::metadata::{Row, FILES_COLUMN, ITEM_FILES_COLUMN};
use crate::model::{Item, ValidationResult, ValidationResults};
use crate::rdf::{vocab, Changeset, Description, Term, Triple};
use crate::repository::{NewBinary, Repository, Transaction};
use crate::text::TextExtractor;
use serde::Serialize;
use std::fmt;
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info, warn};

/// Result of committing one row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Created,
    Modified,
    Unchanged,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Created => "created",
            ItemStatus::Modified => "modified",
            ItemStatus::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job-level settings every row of a run shares
#[derive(Debug, Clone)]
pub struct ImportContext {
    pub container: Option<String>,
    pub access: Option<String>,
    pub member_of: Option<String>,
    pub location: Option<BinariesLocation>,
    pub resolver: SourceResolver,
    pub extractor: TextExtractor,
}

impl ImportContext {
    pub fn new(config: &ImportConfig, resolver: SourceResolver) -> Self {
        Self {
            container: config.container.clone(),
            access: config.access.clone(),
            member_of: config.member_of.clone(),
            location: config.binaries_location.as_deref().map(BinariesLocation::parse),
            resolver,
            extractor: TextExtractor::from_list(config.extract_text_types.as_deref()),
        }
    }

    fn source(&self, filename: &str) -> Option<Box<dyn BinarySource>> {
        self.location
            .as_ref()
            .map(|location| self.resolver.resolve_in(location, filename))
    }
}

/// One metadata row being validated and committed
pub struct ImportRow<'a> {
    row: Row,
    item: Item,
    context: &'a ImportContext,
    repo: Option<&'a dyn Repository>,
}

impl<'a> ImportRow<'a> {
    /// Materialize the row's item. In validate-only mode the repository is
    /// never contacted; otherwise a row with a URI is merged over the
    /// stored item.
    pub async fn new(
        row: Row,
        context: &'a ImportContext,
        repo: &'a dyn Repository,
        validate_only: bool,
    ) -> std::result::Result<Self, JobError> {
        let repo = (!validate_only).then_some(repo);
        let item = row.materialize(repo).await?;
        Ok(Self {
            row,
            item,
            context,
            repo,
        })
    }

    pub fn row(&self) -> &Row {
        &self.row
    }

    pub fn item(&self) -> &Item {
        &self.item
    }

    /// Field rules of the item plus `FILES` and `ITEM_FILES` existence checks
    pub async fn validate(&self) -> Result<ValidationResults> {
        let mut results = self.item.validate()?;
        results.insert(FILES_COLUMN, self.check_files(&self.row.filenames).await);
        results.insert(ITEM_FILES_COLUMN, self.check_files(&self.row.item_filenames).await);
        Ok(results)
    }

    async fn check_files(&self, filenames: &[String]) -> ValidationResult {
        let mut missing = Vec::new();
        for filename in filenames {
            let Some(source) = self.context.source(filename) else {
                missing.push(filename.as_str());
                continue;
            };
            match source.exists().await {
                Ok(true) => {},
                Ok(false) => missing.push(filename.as_str()),
                Err(e) => {
                    warn!(file = %source.location(), error = %e, "Existence check failed");
                    missing.push(filename.as_str());
                },
            }
        }
        if missing.is_empty() {
            ValidationResult::success("All files present")
        } else {
            ValidationResult::failure(format!("Missing {} files: {}", missing.len(), missing.join(";")))
        }
    }

    /// Create, update or leave the item as it is
    pub async fn commit(&mut self) -> std::result::Result<ItemStatus, JobError> {
        let repo = self
            .repo
            .ok_or_else(|| JobError::new("Cannot commit a row loaded for validation only"))?;

        if self.item.is_new() {
            self.create(repo).await?;
            info!(uri = %self.item.uri(), line = %self.row.line_reference, "Created item");
            return Ok(ItemStatus::Created);
        }

        let changes = self.item.changeset();
        if changes.is_empty() {
            info!(uri = %self.item.uri(), "No changes for item");
            return Ok(ItemStatus::Unchanged);
        }
        repo.update(self.item.uri(), &changes)
            .await
            .map_err(|e| JobError::repository("Updating item", &e))?;
        info!(uri = %self.item.uri(), "Updated item");
        Ok(ItemStatus::Modified)
    }

    async fn create(&mut self, repo: &dyn Repository) -> std::result::Result<(), JobError> {
        let container = self
            .context
            .container
            .clone()
            .ok_or_else(|| JobError::new("No container configured for new items"))?;

        if let Some(access) = &self.context.access {
            self.item.add_type(access.clone());
        }
        if let Some(member_of) = &self.context.member_of {
            self.item.set_member_of(member_of.clone());
        }
        if self.row.publish {
            self.item.add_type(vocab::UMDACCESS_PUBLISHED);
        }
        if self.row.hidden {
            self.item.add_type(vocab::UMDACCESS_HIDDEN);
        }

        let mut transaction = repo
            .begin()
            .await
            .map_err(|e| JobError::repository("Creating item", &e))?;
        let created = self.create_graph(transaction.as_mut(), &container).await;
        match created {
            Ok(uri) => {
                transaction
                    .commit()
                    .await
                    .map_err(|e| JobError::repository("Creating item", &e))?;
                self.item.assign_uri(uri);
                Ok(())
            },
            Err(e) => {
                if let Err(rollback) = transaction.rollback().await {
                    error!(error = %rollback, "Rollback failed");
                }
                Err(JobError::repository("Creating item", &e))
            },
        }
    }

    /// Item, pages, files and annotations; returns the item URI
    async fn create_graph(
        &self,
        transaction: &mut dyn Transaction,
        container: &str,
    ) -> std::result::Result<String, RepositoryError> {
        let uri = transaction.create_child(container, &self.item.describe()).await?;
        debug!(uri = %uri, "Created item resource");

        for (index, group) in self.row.file_groups.iter().enumerate() {
            let number = index + 1;
            let title = group.label.clone().unwrap_or_else(|| format!("Page {number}"));
            let mut page = Description::new("");
            page.add_type(vocab::PCDM_OBJECT)
                .add_type(vocab::FABIO_PAGE)
                .add(vocab::DCTERMS_TITLE, Term::literal(title))
                .add(vocab::PCDM_MEMBER_OF, Term::iri(uri.clone()))
                .add(vocab::FABIO_SEQUENCE_NUMBER, Term::literal(number.to_string()));
            let page_uri = transaction.create_child(&uri, &page).await?;
            transaction
                .update(&uri, &link(&uri, vocab::PCDM_HAS_MEMBER, &page_uri))
                .await?;

            for filename in &group.files {
                self.create_file(transaction, &page_uri, filename, true).await?;
            }
        }

        for filename in &self.row.item_filenames {
            self.create_file(transaction, &uri, filename, false).await?;
        }
        Ok(uri)
    }

    async fn create_file(
        &self,
        transaction: &mut dyn Transaction,
        parent: &str,
        filename: &str,
        extract_text: bool,
    ) -> std::result::Result<String, RepositoryError> {
        let source = self
            .context
            .source(filename)
            .ok_or_else(|| BinarySourceError::NotFound(format!("{filename} (no binaries location)")))?;
        let mimetype = source.mimetype().await?;
        let digest = source.digest().await?;
        let kind = FileKind::classify(&mimetype);
        let title = filename.rsplit('/').next().unwrap_or(filename).to_string();

        let mut description = Description::new("");
        for rdf_type in kind.rdf_types() {
            description.add_type(*rdf_type);
        }
        description
            .add(vocab::DCTERMS_TITLE, Term::literal(title.clone()))
            .add(vocab::DCTERMS_FORMAT, Term::literal(mimetype.clone()))
            .add(vocab::PCDM_FILE_OF, Term::iri(parent));

        let file_uri = transaction
            .create_binary(
                parent,
                NewBinary {
                    filename: title,
                    mimetype: mimetype.clone(),
                    digest,
                    data: source.open().await?,
                    description,
                },
            )
            .await?;
        transaction
            .update(parent, &link(parent, vocab::PCDM_HAS_FILE, &file_uri))
            .await?;
        debug!(file = %source.location(), uri = %file_uri, ?kind, "Created file");

        if extract_text && self.context.extractor.applies_to(&mimetype) {
            self.annotate(transaction, parent, source.as_ref(), &mimetype).await?;
        }
        Ok(file_uri)
    }

    /// Full-text annotation on a page, from one of its files
    async fn annotate(
        &self,
        transaction: &mut dyn Transaction,
        page_uri: &str,
        source: &dyn BinarySource,
        mimetype: &str,
    ) -> std::result::Result<(), RepositoryError> {
        let mut data = Vec::new();
        source
            .open()
            .await?
            .read_to_end(&mut data)
            .await
            .map_err(|e| BinarySourceError::io(source.location(), e))?;
        let Some(text) = self.context.extractor.extract(mimetype, &data) else {
            return Ok(());
        };

        let mut annotation = Description::new("");
        annotation
            .add_type(vocab::OA_ANNOTATION)
            .add_type(vocab::UMD_FULL_TEXT_ANNOTATION)
            .add(vocab::OA_HAS_TARGET, Term::iri(page_uri))
            .add(vocab::OA_MOTIVATED_BY, Term::iri(vocab::OA_TRANSCRIBING))
            .add(vocab::DCTERMS_FORMAT, Term::literal("text/plain"))
            .add(vocab::OA_BODY_VALUE, Term::literal(text));
        let uri = transaction.create_child(page_uri, &annotation).await?;
        debug!(uri = %uri, page = %page_uri, "Created text annotation");
        Ok(())
    }
}

fn link(subject: &str, predicate: &str, object: &str) -> Changeset {
    let mut changes = Changeset::default();
    changes.insert(Triple::new(subject, predicate, Term::iri(object)));
    changes
}
