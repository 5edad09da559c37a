use super::{BinarySource, ByteStream};
use crate::error::BinarySourceError;
use async_trait::async_trait;
use std::fmt;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

/// A directory or archive on a remote file server,
/// written `scheme:[//][user@]host[:port]/path`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocation {
    pub scheme: String,
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    /// Absolute path on the server
    pub path: String,
}

impl RemoteLocation {
    /// Parse the part after `scheme:`. Never fails; a malformed location
    /// produces a connection error when it is first used.
    pub fn parse(scheme: &str, rest: &str) -> Self {
        let rest = rest.strip_prefix("//").unwrap_or(rest);
        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], rest[i..].to_string()),
            None => (rest, "/".to_string()),
        };
        let (user, host_port) = match authority.rsplit_once('@') {
            Some((user, host)) => (Some(user.to_string()), host),
            None => (None, authority),
        };
        let (host, port) = match host_port.rsplit_once(':') {
            Some((host, port)) => match port.parse() {
                Ok(port) => (host.to_string(), Some(port)),
                Err(_) => (host_port.to_string(), None),
            },
            None => (host_port.to_string(), None),
        };

        Self {
            scheme: scheme.to_string(),
            user,
            host,
            port,
            path,
        }
    }

    /// Server path of a file relative to this location
    pub fn join(&self, relative: &str) -> String {
        format!(
            "{}/{}",
            self.path.trim_end_matches('/'),
            relative.trim_start_matches('/')
        )
    }
}

impl fmt::Display for RemoteLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if let Some(user) = &self.user {
            write!(f, "{user}@")?;
        }
        f.write_str(&self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        f.write_str(&self.path)
    }
}

/// Secrets a job supplies to remote transports
#[derive(Debug, Clone, Default)]
pub struct RemoteCredentials {
    pub ssh_private_key: Option<PathBuf>,
    pub password: Option<String>,
}

/// Transport for one remote scheme such as `ftp` or `sftp`.
///
/// The built-in [`FtpConnector`](super::FtpConnector) covers `ftp:`;
/// applications register their own connector for `sftp:`.
#[async_trait]
pub trait RemoteConnector: Send + Sync + fmt::Debug {
    fn scheme(&self) -> &str;

    async fn exists(
        &self,
        location: &RemoteLocation,
        credentials: &RemoteCredentials,
        path: &str,
    ) -> Result<bool, BinarySourceError>;

    async fn fetch(
        &self,
        location: &RemoteLocation,
        credentials: &RemoteCredentials,
        path: &str,
    ) -> Result<Vec<u8>, BinarySourceError>;
}

/// A file in a directory on a remote file server
#[derive(Debug, Clone)]
pub struct RemoteFileSource {
    connector: Arc<dyn RemoteConnector>,
    location: RemoteLocation,
    credentials: RemoteCredentials,
    filename: String,
}

impl RemoteFileSource {
    pub fn new(
        connector: Arc<dyn RemoteConnector>,
        location: RemoteLocation,
        credentials: RemoteCredentials,
        filename: &str,
    ) -> Self {
        Self {
            connector,
            location,
            credentials,
            filename: filename.to_string(),
        }
    }

    fn remote_path(&self) -> String {
        self.location.join(&self.filename)
    }
}

#[async_trait]
impl BinarySource for RemoteFileSource {
    fn filename(&self) -> &str {
        &self.filename
    }

    fn location(&self) -> String {
        let mut location = self.location.clone();
        location.path = self.remote_path();
        location.to_string()
    }

    async fn exists(&self) -> Result<bool, BinarySourceError> {
        self.connector
            .exists(&self.location, &self.credentials, &self.remote_path())
            .await
    }

    async fn open(&self) -> Result<ByteStream, BinarySourceError> {
        let data = self
            .connector
            .fetch(&self.location, &self.credentials, &self.remote_path())
            .await?;
        Ok(Box::new(Cursor::new(data)))
    }
}
