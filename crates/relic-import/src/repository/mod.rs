//! Repository collaborators
//!
//! The engine reads existing items, patches them, and creates new item
//! graphs inside a transaction. [`HttpRepository`] talks to an LDP server;
//! [`MemoryRepository`] keeps everything in process.

mod http;
mod memory;

pub use http::HttpRepository;
pub use memory::{MemoryRepository, StoredBinary};

use crate::error::RepositoryError;
use crate::files::ByteStream;
use crate::rdf::{Changeset, Description};
use async_trait::async_trait;

pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// A networked object repository
#[async_trait]
pub trait Repository: Send + Sync {
    /// Current description of a resource, or `None` if it does not exist
    async fn read(&self, uri: &str) -> RepositoryResult<Option<Description>>;

    /// Open a transaction scoped to one item's creation
    async fn begin(&self) -> RepositoryResult<Box<dyn Transaction>>;

    /// Apply a partial update outside any transaction
    async fn update(&self, uri: &str, changes: &Changeset) -> RepositoryResult<()>;
}

/// Writes staged until [`commit`](Transaction::commit).
///
/// URIs passed in and returned are always the canonical ones, never
/// transaction-scoped forms.
#[async_trait]
pub trait Transaction: Send {
    /// Create a resource under `container`, described by `description`
    /// (whose subject is ignored); returns the new URI
    async fn create_child(&mut self, container: &str, description: &Description) -> RepositoryResult<String>;

    /// Create a binary resource under `container`; returns the new URI
    async fn create_binary(&mut self, container: &str, binary: NewBinary) -> RepositoryResult<String>;

    async fn update(&mut self, uri: &str, changes: &Changeset) -> RepositoryResult<()>;

    async fn commit(self: Box<Self>) -> RepositoryResult<()>;

    async fn rollback(self: Box<Self>) -> RepositoryResult<()>;
}

/// Content and description of a binary being created
pub struct NewBinary {
    pub filename: String,
    pub mimetype: String,
    /// Hex SHA-256 of `data`
    pub digest: String,
    pub data: ByteStream,
    /// Statements about the binary itself (types, title, `pcdm:fileOf`)
    pub description: Description,
}

impl std::fmt::Debug for NewBinary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewBinary")
            .field("filename", &self.filename)
            .field("mimetype", &self.mimetype)
            .field("digest", &self.digest)
            .finish_non_exhaustive()
    }
}
