use super::{NewBinary, Repository, RepositoryResult, Transaction};
use crate::error::RepositoryError;
use crate::rdf::{vocab, Changeset, Description, Term};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::AsyncReadExt;
use tracing::debug;

pub const DEFAULT_BASE_URI: &str = "http://localhost:8080/rest";

/// A binary held by a [`MemoryRepository`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBinary {
    pub filename: String,
    pub mimetype: String,
    pub digest: String,
    pub data: Vec<u8>,
}

/// Number of calls of each kind a [`MemoryRepository`] has served
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub reads: usize,
    /// Partial updates outside a transaction
    pub updates: usize,
    pub transactions: usize,
    pub created_resources: usize,
    pub created_binaries: usize,
    pub commits: usize,
    pub rollbacks: usize,
}

#[derive(Debug, Default)]
struct State {
    resources: BTreeMap<String, Description>,
    binaries: BTreeMap<String, StoredBinary>,
    children: BTreeMap<String, Vec<String>>,
    fail_titles: HashSet<String>,
    fail_updates: HashSet<String>,
    counts: CallCounts,
}

impl State {
    fn apply(&mut self, uri: &str, changes: &Changeset) -> RepositoryResult<()> {
        let description = self
            .resources
            .get_mut(uri)
            .ok_or_else(|| RepositoryError::NotFound(uri.to_string()))?;
        apply_changeset(description, changes);
        Ok(())
    }
}

fn apply_changeset(description: &mut Description, changes: &Changeset) {
    for delete in &changes.deletes {
        description
            .statements
            .retain(|(p, o)| !(*p == delete.predicate && *o == delete.object));
    }
    for insert in &changes.inserts {
        description.add(insert.predicate.clone(), insert.object.clone());
    }
}

/// In-process repository with transactional staging.
///
/// Nothing created in a transaction is visible until it commits. Failures
/// can be injected per title (creation) or per URI (updates).
#[derive(Debug, Clone)]
pub struct MemoryRepository {
    base: String,
    state: Arc<Mutex<State>>,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::with_base(DEFAULT_BASE_URI)
    }

    pub fn with_base(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Canonical URI for a container given as a path or a full URI
    pub fn container_uri(&self, container: &str) -> String {
        container_uri(&self.base, container)
    }

    /// Store a resource directly, as if created earlier
    pub fn insert(&self, description: Description) {
        self.state().resources.insert(description.subject.clone(), description);
    }

    pub fn get(&self, uri: &str) -> Option<Description> {
        self.state().resources.get(uri).cloned()
    }

    pub fn binary(&self, uri: &str) -> Option<StoredBinary> {
        self.state().binaries.get(uri).cloned()
    }

    /// Committed children of a container, in creation order
    pub fn children(&self, container: &str) -> Vec<String> {
        let container = self.container_uri(container);
        self.state().children.get(&container).cloned().unwrap_or_default()
    }

    pub fn resource_count(&self) -> usize {
        self.state().resources.len()
    }

    /// Make any creation of a resource with this `dcterms:title` fail
    pub fn fail_on_title(&self, title: &str) {
        self.state().fail_titles.insert(title.to_string());
    }

    /// Make updates to this resource fail
    pub fn fail_updates_to(&self, uri: &str) {
        self.state().fail_updates.insert(uri.to_string());
    }

    pub fn counts(&self) -> CallCounts {
        self.state().counts
    }
}

fn container_uri(base: &str, container: &str) -> String {
    if container.starts_with("http://") || container.starts_with("https://") {
        container.trim_end_matches('/').to_string()
    } else {
        format!("{}/{}", base, container.trim_matches('/'))
    }
}

fn injected_failure(uri: &str) -> RepositoryError {
    RepositoryError::Http {
        status: 500,
        url: uri.to_string(),
        body: "Injected failure".to_string(),
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn read(&self, uri: &str) -> RepositoryResult<Option<Description>> {
        let mut state = self.state();
        state.counts.reads += 1;
        Ok(state.resources.get(uri).cloned())
    }

    async fn begin(&self) -> RepositoryResult<Box<dyn Transaction>> {
        self.state().counts.transactions += 1;
        Ok(Box::new(MemoryTransaction {
            base: self.base.clone(),
            state: self.state.clone(),
            resources: Vec::new(),
            binaries: Vec::new(),
            updates: Vec::new(),
        }))
    }

    async fn update(&self, uri: &str, changes: &Changeset) -> RepositoryResult<()> {
        let mut state = self.state();
        state.counts.updates += 1;
        if state.fail_updates.contains(uri) {
            return Err(injected_failure(uri));
        }
        state.apply(uri, changes)
    }
}

struct MemoryTransaction {
    base: String,
    state: Arc<Mutex<State>>,
    /// (container, description) in creation order
    resources: Vec<(String, Description)>,
    binaries: Vec<(String, String, StoredBinary)>,
    updates: Vec<(String, Changeset)>,
}

impl MemoryTransaction {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mint(&self, container: &str) -> (String, String) {
        let container = container_uri(&self.base, container);
        let uri = format!("{}/{}", container, uuid::Uuid::new_v4());
        (container, uri)
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn create_child(&mut self, container: &str, description: &Description) -> RepositoryResult<String> {
        let (container, uri) = self.mint(container);
        {
            let mut state = self.state();
            state.counts.created_resources += 1;
            let title = description.values(vocab::DCTERMS_TITLE).next().map(Term::value);
            if title.is_some_and(|title| state.fail_titles.contains(title)) {
                return Err(injected_failure(&container));
            }
        }
        let mut stored = Description::new(uri.clone());
        for (predicate, object) in &description.statements {
            stored.add(predicate.clone(), object.clone());
        }
        debug!(uri = %uri, "Staged resource");
        self.resources.push((container, stored));
        Ok(uri)
    }

    async fn create_binary(&mut self, container: &str, mut binary: NewBinary) -> RepositoryResult<String> {
        let (container, uri) = self.mint(container);
        self.state().counts.created_binaries += 1;
        let mut data = Vec::new();
        binary
            .data
            .read_to_end(&mut data)
            .await
            .map_err(|e| RepositoryError::Transaction(format!("Reading {} failed: {e}", binary.filename)))?;

        let mut description = Description::new(uri.clone());
        for (predicate, object) in &binary.description.statements {
            description.add(predicate.clone(), object.clone());
        }
        self.resources.push((container.clone(), description));
        self.binaries.push((
            container,
            uri.clone(),
            StoredBinary {
                filename: binary.filename,
                mimetype: binary.mimetype,
                digest: binary.digest,
                data,
            },
        ));
        Ok(uri)
    }

    async fn update(&mut self, uri: &str, changes: &Changeset) -> RepositoryResult<()> {
        if let Some((_, description)) = self.resources.iter_mut().find(|(_, d)| d.subject == uri) {
            apply_changeset(description, changes);
            return Ok(());
        }
        if !self.state().resources.contains_key(uri) {
            return Err(RepositoryError::NotFound(uri.to_string()));
        }
        self.updates.push((uri.to_string(), changes.clone()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> RepositoryResult<()> {
        let this = *self;
        let mut state = this.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.counts.commits += 1;
        for (container, description) in this.resources {
            let is_binary = this.binaries.iter().any(|(_, uri, _)| *uri == description.subject);
            if !is_binary {
                state
                    .children
                    .entry(container)
                    .or_default()
                    .push(description.subject.clone());
            }
            state.resources.insert(description.subject.clone(), description);
        }
        for (_, uri, binary) in this.binaries {
            state.binaries.insert(uri, binary);
        }
        for (uri, changes) in &this.updates {
            state.apply(uri, changes)?;
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> RepositoryResult<()> {
        self.state().counts.rollbacks += 1;
        debug!(staged = self.resources.len(), "Discarded staged resources");
        Ok(())
    }
}
