//! Binary sources
//!
//! Metadata rows name files relative to a job's binaries location. A
//! [`SourceResolver`] turns a location and a relative path into a
//! [`BinarySource`] without doing any I/O; existence checks, MIME detection
//! and reads happen later through the handle.

mod archive;
mod ftp;
mod http;
mod local;
mod location;
pub mod mimetype;
mod remote;
mod resolver;

pub use archive::{ArchiveLocation, RemoteArchive, ZipFileSource};
pub use ftp::FtpConnector;
pub use http::HttpFileSource;
pub use local::LocalFileSource;
pub use location::BinariesLocation;
pub use remote::{RemoteConnector, RemoteCredentials, RemoteFileSource, RemoteLocation};
pub use resolver::SourceResolver;

use crate::error::BinarySourceError;
use crate::rdf::vocab;
use async_trait::async_trait;
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Readable byte stream of a binary
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Bytes read from the start of a binary for magic-number detection
const SNIFF_LEN: u64 = 8192;

/// A resolved, openable reference to one binary
#[async_trait]
pub trait BinarySource: Send + Sync + fmt::Debug {
    /// Path of the binary relative to its location
    fn filename(&self) -> &str;

    /// Where the bytes live, for logs and diagnostics
    fn location(&self) -> String;

    async fn exists(&self) -> Result<bool, BinarySourceError>;

    async fn open(&self) -> Result<ByteStream, BinarySourceError>;

    /// Detected MIME type: magic bytes first, then the file extension
    async fn mimetype(&self) -> Result<String, BinarySourceError> {
        let mut head = Vec::new();
        self.open()
            .await?
            .take(SNIFF_LEN)
            .read_to_end(&mut head)
            .await
            .map_err(|e| BinarySourceError::io(self.location(), e))?;
        Ok(mimetype::detect(self.filename(), &head))
    }

    /// Hex SHA-256 of the full content
    async fn digest(&self) -> Result<String, BinarySourceError> {
        let mut stream = self.open().await?;
        Ok(relic_common::checksum::sha256_async(&mut stream).await?)
    }
}

/// MIME type treated as a preservation master image
pub const PRESERVATION_MASTER_MIMETYPE: &str = "image/tiff";

/// Kind of file object a binary becomes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    PlainFile,
    PreservationMasterFile,
}

impl FileKind {
    pub fn classify(mimetype: &str) -> Self {
        if mimetype.eq_ignore_ascii_case(PRESERVATION_MASTER_MIMETYPE) {
            FileKind::PreservationMasterFile
        } else {
            FileKind::PlainFile
        }
    }

    /// RDF types of a file resource of this kind
    pub fn rdf_types(self) -> &'static [&'static str] {
        match self {
            FileKind::PlainFile => &[vocab::PCDM_FILE],
            FileKind::PreservationMasterFile => &[vocab::PCDM_FILE, vocab::PCDM_USE_PRESERVATION_MASTER],
        }
    }
}

/// Stand-in for a location whose transport is not available.
///
/// Every operation fails, so the problem surfaces as a failed existence
/// check instead of at resolution time.
#[derive(Debug)]
pub(crate) struct UnavailableSource {
    filename: String,
    location: String,
    scheme: String,
}

#[async_trait]
impl BinarySource for UnavailableSource {
    fn filename(&self) -> &str {
        &self.filename
    }

    fn location(&self) -> String {
        self.location.clone()
    }

    async fn exists(&self) -> Result<bool, BinarySourceError> {
        Err(BinarySourceError::NoConnector {
            scheme: self.scheme.clone(),
        })
    }

    async fn open(&self) -> Result<ByteStream, BinarySourceError> {
        Err(BinarySourceError::NoConnector {
            scheme: self.scheme.clone(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_file_kind() {
        assert_eq!(FileKind::classify("image/tiff"), FileKind::PreservationMasterFile);
        assert_eq!(FileKind::classify("IMAGE/TIFF"), FileKind::PreservationMasterFile);
        assert_eq!(FileKind::classify("image/jpeg"), FileKind::PlainFile);
        assert_eq!(FileKind::classify("text/html"), FileKind::PlainFile);
        assert!(FileKind::PreservationMasterFile
            .rdf_types()
            .contains(&vocab::PCDM_USE_PRESERVATION_MASTER));
    }
}
