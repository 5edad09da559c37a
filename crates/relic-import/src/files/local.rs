use super::{BinarySource, ByteStream};
use crate::error::BinarySourceError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;

/// A file on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalFileSource {
    path: PathBuf,
    filename: String,
}

impl LocalFileSource {
    pub fn new(base: impl Into<PathBuf>, filename: &str) -> Self {
        Self {
            path: base.into().join(filename),
            filename: filename.to_string(),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl BinarySource for LocalFileSource {
    fn filename(&self) -> &str {
        &self.filename
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    async fn exists(&self) -> Result<bool, BinarySourceError> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BinarySourceError::io(self.location(), e)),
        }
    }

    async fn open(&self) -> Result<ByteStream, BinarySourceError> {
        match tokio::fs::File::open(&self.path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BinarySourceError::NotFound(self.location())),
            Err(e) => Err(BinarySourceError::io(self.location(), e)),
        }
    }
}
