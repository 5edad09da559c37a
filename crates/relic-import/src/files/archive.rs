//! Files inside zip archives, stored locally or on a remote file server

use super::remote::{RemoteConnector, RemoteCredentials, RemoteLocation};
use super::{BinarySource, ByteStream};
use crate::error::BinarySourceError;
use async_trait::async_trait;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;
use tokio::sync::OnceCell;
use tracing::info;
use zip::result::ZipError;
use zip::ZipArchive;

/// A zip archive on a remote server, downloaded once on first use and
/// shared by every source that points into it
#[derive(Debug)]
pub struct RemoteArchive {
    connector: Arc<dyn RemoteConnector>,
    location: RemoteLocation,
    credentials: RemoteCredentials,
    local: OnceCell<TempPath>,
}

impl RemoteArchive {
    pub fn new(
        connector: Arc<dyn RemoteConnector>,
        location: RemoteLocation,
        credentials: RemoteCredentials,
    ) -> Self {
        Self {
            connector,
            location,
            credentials,
            local: OnceCell::new(),
        }
    }

    async fn local_path(&self) -> Result<PathBuf, BinarySourceError> {
        let path = self
            .local
            .get_or_try_init(|| async {
                let data = self
                    .connector
                    .fetch(&self.location, &self.credentials, &self.location.path)
                    .await?;
                info!(archive = %self.location, bytes = data.len(), "Fetched remote archive");
                tokio::task::spawn_blocking(move || {
                    let mut file = tempfile::NamedTempFile::new()?;
                    file.write_all(&data)?;
                    file.flush()?;
                    Ok::<_, std::io::Error>(file.into_temp_path())
                })
                .await
                .map_err(|e| BinarySourceError::archive(self.location.to_string(), e))?
                .map_err(|e| BinarySourceError::io(self.location.to_string(), e))
            })
            .await?;
        Ok(path.to_path_buf())
    }
}

/// Where an archive lives
#[derive(Debug, Clone)]
pub enum ArchiveLocation {
    Local(PathBuf),
    Remote(Arc<RemoteArchive>),
}

impl ArchiveLocation {
    async fn local_path(&self) -> Result<PathBuf, BinarySourceError> {
        match self {
            ArchiveLocation::Local(path) => Ok(path.clone()),
            ArchiveLocation::Remote(remote) => remote.local_path().await,
        }
    }

    fn describe(&self) -> String {
        match self {
            ArchiveLocation::Local(path) => format!("zip:{}", path.display()),
            ArchiveLocation::Remote(remote) => format!("zip+{}", remote.location),
        }
    }
}

/// One member of a zip archive
#[derive(Debug, Clone)]
pub struct ZipFileSource {
    archive: ArchiveLocation,
    member: String,
}

impl ZipFileSource {
    pub fn new(archive: ArchiveLocation, member: &str) -> Self {
        Self {
            archive,
            member: member.to_string(),
        }
    }

    async fn with_archive<T, F>(&self, op: F) -> Result<T, BinarySourceError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ZipArchive<std::fs::File>, &str) -> Result<T, ZipError> + Send + 'static,
    {
        let path = self.archive.local_path().await?;
        let member = self.member.clone();
        let label = self.archive.describe();
        tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&path).map_err(|e| BinarySourceError::io(label.clone(), e))?;
            let mut archive = ZipArchive::new(file).map_err(|e| BinarySourceError::archive(label.clone(), e))?;
            op(&mut archive, &member).map_err(|e| match e {
                ZipError::FileNotFound => BinarySourceError::NotFound(format!("{label}!{member}")),
                other => BinarySourceError::archive(label, other),
            })
        })
        .await
        .map_err(|e| BinarySourceError::archive(self.archive.describe(), e))?
    }
}

fn read_member(archive: &mut ZipArchive<std::fs::File>, member: &str) -> Result<Vec<u8>, ZipError> {
    let mut entry = archive.by_name(member)?;
    let mut data = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut data)?;
    Ok(data)
}

#[async_trait]
impl BinarySource for ZipFileSource {
    fn filename(&self) -> &str {
        &self.member
    }

    fn location(&self) -> String {
        format!("{}!{}", self.archive.describe(), self.member)
    }

    async fn exists(&self) -> Result<bool, BinarySourceError> {
        if let ArchiveLocation::Local(path) = &self.archive {
            if !Path::new(path).is_file() {
                return Ok(false);
            }
        }
        self.with_archive(|archive, member| Ok(archive.file_names().any(|name| name == member)))
            .await
    }

    async fn open(&self) -> Result<ByteStream, BinarySourceError> {
        let data = self.with_archive(read_member).await?;
        Ok(Box::new(Cursor::new(data)))
    }
}
